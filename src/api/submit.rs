use super::*;
use crate::store::Verb;
use actix_web::HttpResponse;
use actix_web::web;

async fn authenticate(state: &AppState, username: &str, password: &str) -> Result<(), ApiError> {
    state
        .users
        .authenticate(username, password)
        .await
        .map(|_| ())
        .map_err(|e| ApiError::Auth(e.to_string()))
}

/// the submitter or the approver may manage a run; nobody else
async fn authorize(state: &AppState, run_id: crate::RunId, username: &str) -> Result<(), ApiError> {
    let line = state.registry.get(run_id).await?;
    let run = line.lock().unwrap();
    if run.args.username != username && run.approver != username {
        return Err(ApiError::Validation(format!(
            "run {} does not belong to {}",
            run_id, username
        )));
    }
    Ok(())
}

pub async fn new_run(
    state: web::Data<AppState>,
    body: web::Json<NewRun>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    let username = body.username.clone();
    let args = body.into_args()?;
    let run_id = state.registry.create(args).await?;
    let _ = state
        .actions
        .record(&username, Verb::NewRun, serde_json::json!({ "run_id": run_id }))
        .await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "run_id": run_id })))
}

pub async fn modify_run(
    state: web::Data<AppState>,
    body: web::Json<ModifyRun>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    authorize(&state, body.run_id, &body.username).await?;
    let before = {
        let line = state.registry.get(body.run_id).await?;
        let run = line.lock().unwrap();
        serde_json::json!({
            "num_games": run.args.num_games,
            "priority": run.args.priority,
            "throughput": run.args.throughput,
        })
    };
    state
        .registry
        .modify(body.run_id, body.num_games, body.priority, body.throughput)
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let _ = state
        .actions
        .record(
            &body.username,
            Verb::ModifyRun,
            serde_json::json!({
                "run_id": body.run_id,
                "before": before,
                "after": {
                    "num_games": body.num_games,
                    "priority": body.priority,
                    "throughput": body.throughput,
                },
            }),
        )
        .await;
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

pub async fn approve_run(
    state: web::Data<AppState>,
    body: web::Json<RunRef>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    state
        .registry
        .approve(body.run_id, &body.username)
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let _ = state
        .actions
        .record(
            &body.username,
            Verb::ApproveRun,
            serde_json::json!({ "run_id": body.run_id }),
        )
        .await;
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

pub async fn stop_run(
    state: web::Data<AppState>,
    body: web::Json<StopRun>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    authorize(&state, body.run_id, &body.username).await?;
    {
        let line = state.registry.get(body.run_id).await?;
        line.lock().unwrap().stop_reason = Some(if body.message.is_empty() {
            "stopped by submitter".to_string()
        } else {
            body.message.clone()
        });
    }
    let _ = state
        .actions
        .record(
            &body.username,
            Verb::StopRun,
            serde_json::json!({ "run_id": body.run_id, "message": body.message }),
        )
        .await;
    state.registry.stop(body.run_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

pub async fn delete_run(
    state: web::Data<AppState>,
    body: web::Json<RunRef>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    authorize(&state, body.run_id, &body.username).await?;
    let _ = state
        .actions
        .record(
            &body.username,
            Verb::DeleteRun,
            serde_json::json!({ "run_id": body.run_id }),
        )
        .await;
    state.registry.delete(body.run_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

#[derive(serde::Deserialize)]
pub struct BlockUser {
    pub username: String,
    pub password: String,
    pub target: String,
    pub blocked: bool,
}

pub async fn block_user(
    state: web::Data<AppState>,
    body: web::Json<BlockUser>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let caller = state
        .users
        .authenticate(&body.username, &body.password)
        .await
        .map_err(|e| ApiError::Auth(e.to_string()))?;
    if !caller.is_admin() {
        return Err(ApiError::Validation("admins only".to_string()));
    }
    let known = state
        .users
        .block(&body.target, body.blocked)
        .await
        .map_err(ApiError::Internal)?;
    if !known {
        return Err(ApiError::NotFound(format!("unknown user {}", body.target)));
    }
    let _ = state
        .actions
        .record(
            &body.username,
            Verb::BlockUser,
            serde_json::json!({ "target": body.target, "blocked": body.blocked }),
        )
        .await;
    Ok(HttpResponse::Ok().json(serde_json::json!({})))
}

pub async fn purge_run(
    state: web::Data<AppState>,
    body: web::Json<RunRef>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    authenticate(&state, &body.username, &body.password).await?;
    authorize(&state, body.run_id, &body.username).await?;
    {
        let line = state.registry.get(body.run_id).await?;
        if !line.lock().unwrap().finished {
            return Err(ApiError::Validation(
                "only finished runs can be purged".to_string(),
            ));
        }
    }
    let purged = state.registry.purge(body.run_id).await?;
    let _ = state
        .actions
        .record(
            &body.username,
            Verb::PurgeRun,
            serde_json::json!({ "run_id": body.run_id, "purged": purged }),
        )
        .await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "purged": purged })))
}
