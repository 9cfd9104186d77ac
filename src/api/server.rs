use super::submit;
use super::workers;
use crate::dispatch::Dispatcher;
use crate::registry::RunRegistry;
use crate::store::Actions;
use crate::store::Store;
use crate::store::Users;
use actix_web::App;
use actix_web::HttpServer;
use actix_web::middleware::Logger;
use actix_web::web;
use std::sync::Arc;

/// everything a request handler can reach
pub struct AppState {
    pub registry: Arc<RunRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub users: Arc<Users>,
    pub actions: Actions,
    pub store: Store,
}

pub struct Server;

impl Server {
    pub async fn run(state: AppState, bind: &str) -> Result<(), std::io::Error> {
        let state = web::Data::new(state);
        log::info!("starting orchestration server on {}", bind);
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::new("%r %s %Ts"))
                .app_data(state.clone())
                .route("/api/request_version", web::post().to(workers::request_version))
                .route("/api/request_task", web::post().to(workers::request_task))
                .route("/api/update_task", web::post().to(workers::update_task))
                .route("/api/failed_task", web::post().to(workers::failed_task))
                .route("/api/stop_run", web::post().to(workers::stop_run))
                .route("/api/request_spsa", web::post().to(workers::request_spsa))
                .route("/api/upload_pgn", web::post().to(workers::upload_pgn))
                .route("/api/active_runs", web::get().to(workers::active_runs))
                .route("/api/run/{id}", web::get().to(workers::get_run))
                .route("/api/pgn/{id}", web::get().to(workers::get_pgn))
                .route("/api/actions", web::get().to(workers::actions))
                .route("/api/finished_runs", web::get().to(workers::finished_runs))
                .route("/users/block", web::post().to(submit::block_user))
                .route("/runs/new", web::post().to(submit::new_run))
                .route("/runs/modify", web::post().to(submit::modify_run))
                .route("/runs/approve", web::post().to(submit::approve_run))
                .route("/runs/stop", web::post().to(submit::stop_run))
                .route("/runs/delete", web::post().to(submit::delete_run))
                .route("/runs/purge", web::post().to(submit::purge_run))
        })
        .workers(4)
        .bind(bind)?
        .run()
        .await
    }
}
