use super::*;
use crate::dispatch::Assignment;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::web;
use flate2::read::ZlibDecoder;
use std::io::Read;

/// verify worker credentials against the user store
async fn authenticate(state: &AppState, username: &str, password: &str) -> Result<(), ApiError> {
    state
        .users
        .authenticate(username, password)
        .await
        .map(|_| ())
        .map_err(|e| ApiError::Auth(e.to_string()))
}

pub async fn request_version(
    state: web::Data<AppState>,
    body: web::Json<WorkerRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.worker_info.username, &body.password).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "version": crate::WORKER_VERSION })))
}

pub async fn request_task(
    state: web::Data<AppState>,
    body: web::Json<WorkerRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.worker_info.username, &body.password).await?;
    let mut worker = body.worker_info;
    worker.remote_addr = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default();
    match state.dispatcher.request(worker).await? {
        Assignment::Busy | Assignment::Waiting => {
            Ok(HttpResponse::Ok().json(serde_json::json!({ "task_waiting": false })))
        }
        Assignment::MachineLimit => Ok(HttpResponse::Ok().json(serde_json::json!({
            "task_waiting": false,
            "hit_machine_limit": true,
        }))),
        Assignment::Task { run, task_id, .. } => {
            let doc = {
                let run = run.lock().unwrap();
                min_run(&run, task_id)
            };
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "run": doc,
                "task_id": task_id,
            })))
        }
    }
}

pub async fn update_task(
    state: web::Data<AppState>,
    body: web::Json<TaskReport>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    let alive = state
        .registry
        .update_task(
            body.run_id,
            body.task_id,
            body.stats,
            body.nps,
            body.spsa,
            &body.username,
        )
        .await
        .unwrap_or_else(|e| {
            log::warn!("update for run {} refused: {}", body.run_id, e);
            false
        });
    Ok(HttpResponse::Ok().json(serde_json::json!({ "task_alive": alive })))
}

pub async fn failed_task(
    state: web::Data<AppState>,
    body: web::Json<TaskRef>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    if let Err(e) = state.registry.failed_task(body.run_id, body.task_id).await {
        log::warn!("failed_task for run {} refused: {}", body.run_id, e);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

pub async fn stop_run(
    state: web::Data<AppState>,
    body: web::Json<StopRun>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    // stopping other people's runs takes a track record
    if state.users.cpu_hours(&body.username).await < crate::STOP_RUN_CPU_HOURS {
        return Ok(HttpResponse::Ok().json(serde_json::json!({})));
    }
    let lock = state.registry.run_lock(body.run_id);
    let _guard = lock.lock().await;
    let line = state.registry.get(body.run_id).await?;
    {
        let mut run = line.lock().unwrap();
        run.stop_reason = Some(if body.message.is_empty() {
            "API request".to_string()
        } else {
            body.message.clone()
        });
    }
    let _ = state
        .actions
        .record(
            &body.username,
            crate::store::Verb::StopRun,
            serde_json::json!({ "run_id": body.run_id, "message": body.message }),
        )
        .await;
    state.registry.stop(body.run_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

pub async fn request_spsa(
    state: web::Data<AppState>,
    body: web::Json<TaskRef>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    match state.registry.request_spsa(body.run_id, body.task_id).await {
        Ok(Some(issued)) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "task_alive": true,
            "w_params": issued.w_params,
            "b_params": issued.b_params,
        }))),
        Ok(None) => Ok(HttpResponse::Ok().json(serde_json::json!({ "task_alive": false }))),
        Err(e) => {
            log::warn!("request_spsa for run {} refused: {}", body.run_id, e);
            Ok(HttpResponse::Ok().json(serde_json::json!({ "task_alive": false })))
        }
    }
}

pub async fn upload_pgn(
    state: web::Data<AppState>,
    body: web::Json<PgnUpload>,
) -> Result<HttpResponse, ApiError> {
    use base64::Engine;
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    let blob = base64::engine::general_purpose::STANDARD
        .decode(&body.pgn)
        .map_err(|e| ApiError::Validation(format!("bad pgn encoding: {}", e)))?;
    let id = format!("{}-{}", body.run_id, body.task_id);
    state
        .store
        .insert_pgn(&id, &blob)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

pub async fn active_runs(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut active = serde_json::Map::new();
    for id in state.registry.unfinished_runs().await? {
        if let Ok(line) = state.registry.get(id).await {
            let run = line.lock().unwrap();
            active.insert(id.to_string(), strip_run(&run));
        }
    }
    Ok(HttpResponse::Ok().json(active))
}

pub async fn get_run(
    state: web::Data<AppState>,
    path: web::Path<crate::RunId>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let line = state
        .registry
        .get(id)
        .await
        .map_err(|_| ApiError::NotFound(format!("unknown run {}", id)))?;
    let run = line.lock().unwrap();
    Ok(HttpResponse::Ok().json(strip_run(&run)))
}

#[derive(serde::Deserialize)]
pub struct FinishedQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub green_only: bool,
    #[serde(default)]
    pub yellow_only: bool,
    #[serde(default)]
    pub ltc_only: bool,
}

pub async fn finished_runs(
    state: web::Data<AppState>,
    query: web::Query<FinishedQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let runs = state
        .store
        .finished_runs(
            query.skip.max(0),
            query.limit.clamp(1, 500),
            query.username.as_deref(),
            query.green_only,
            query.yellow_only,
            query.ltc_only,
        )
        .await?;
    Ok(HttpResponse::Ok().json(runs.iter().map(strip_run).collect::<Vec<_>>()))
}

#[derive(serde::Deserialize)]
pub struct ActionQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub username: Option<String>,
}

fn default_limit() -> i64 {
    100
}

pub async fn actions(
    state: web::Data<AppState>,
    query: web::Query<ActionQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let entries = state
        .actions
        .recent(query.limit.clamp(1, 1000), None, query.username.as_deref())
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn get_pgn(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let id = id.strip_suffix(".pgn").unwrap_or(&id);
    let blob = state
        .store
        .load_pgn(id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or_else(|| ApiError::NotFound(format!("no pgn under {}", id)))?;
    let mut pgn = String::new();
    ZlibDecoder::new(blob.as_slice())
        .read_to_string(&mut pgn)
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(HttpResponse::Ok()
        .content_type("application/x-chess-pgn")
        .body(pgn))
}
