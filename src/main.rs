use clap::Parser;
use gauntlet::api::AppState;
use gauntlet::api::Server;
use gauntlet::dispatch::Dispatcher;
use gauntlet::notify::Courier;
use gauntlet::registry::RunRegistry;
use gauntlet::store::Actions;
use gauntlet::store::Store;
use gauntlet::store::Users;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// engine test orchestration server
#[derive(Parser)]
struct Args {
    /// listen address, falls back to BIND_ADDR
    #[arg(long)]
    bind: Option<String>,
    /// postgres connection string, falls back to DB_URL
    #[arg(long)]
    db_url: Option<String>,
}

#[tokio::main]
async fn main() {
    gauntlet::log();
    let args = Args::parse();
    let url = args
        .db_url
        .or_else(|| std::env::var("DB_URL").ok())
        .expect("DB_URL must be set");
    let bind = args
        .bind
        .or_else(|| std::env::var("BIND_ADDR").ok())
        .expect("BIND_ADDR must be set");
    let client = gauntlet::db(&url).await;
    let store = Store::from(client.clone());
    store.prepare().await.expect("schema preparation failed");
    let epoch = Arc::new(AtomicU64::new(0));
    let registry = RunRegistry::new(store.clone(), Arc::new(Courier), epoch.clone());
    registry.start();
    let users = Arc::new(Users::from(client.clone()));
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), users.clone(), epoch));
    let actions = Actions::from(client.clone());
    flush_on_exit(registry.clone());
    let state = AppState {
        registry,
        dispatcher,
        users,
        actions,
        store,
    };
    Server::run(state, &bind).await.expect("server failed");
}

/// best-effort flush of dirty runs on SIGINT/SIGTERM, then exit
fn flush_on_exit(registry: Arc<RunRegistry>) {
    tokio::spawn(async move {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install signal handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
        println!();
        log::warn!("interrupt received, flushing dirty runs");
        registry.flush_all().await;
        std::process::exit(0);
    });
}
