pub mod api;
pub mod dispatch;
pub mod notify;
pub mod registry;
pub mod run;
pub mod stats;
pub mod store;

/// dimensional analysis types
type Elo = f64;
type Llr = f64;
type Score = f64;
type Probability = f64;
type Seconds = f64;
pub type RunId = i64;
pub type TaskId = usize;

// run orchestration parameters
const CHUNK_SIZE: u64 = 200;
const MAX_CHUNKS: u64 = 4000;
const SPRT_CHUNKS: u64 = 2000;
const SPRT_BATCH_SIZE_GAMES: u64 = 8;
const DEFAULT_MACHINE_LIMIT: i64 = 16;
const STOP_RUN_CPU_HOURS: i64 = 1000;
const WORKER_VERSION: u32 = 21;

// scheduler parameters
const DISPATCH_SLOTS: usize = 4;
const CANDIDATE_TTL: Seconds = 60.0;
const SPSA_CORE_BUDGET: f64 = 40_000.0;
const SPRT_CORE_LIMIT: f64 = 1e6;

// cache and flush parameters
const FLUSH_INTERVAL: Seconds = 1.0;
const CACHE_IDLE_EVICT: Seconds = 60.0;
const SCAVENGE_HORIZON: Seconds = 1800.0;
const SCAVENGE_PERIOD: u64 = 60;
const LOCK_GC_COUNT: usize = 100_000;
const LOCK_GC_AGE: Seconds = 10_000.0;

// statistics parameters
const REGULARIZER: f64 = 1e-3;
const SCORE_EPSILON: f64 = 1e-3;
const CHI2_BAD_P: f64 = 0.001;
const CHI2_BAD_RESIDUAL: f64 = 7.0;
const RESIDUAL_GREEN: f64 = 2.0;
const RESIDUAL_YELLOW: f64 = 2.7;
const CRASH_LIMIT: u64 = 3;
const CRASH_RESIDUAL: f64 = 8.0;

// game duration model (long-time-control fleet measurements)
const GAME_MOVES: f64 = 68.0;
const GAME_SCALE: f64 = 2.0 * 0.92;
const REFERENCE_TC: &str = "10+0.1";

// spsa history sampling
const SPSA_HISTORY_BUDGET: f64 = 250_000.0;
const SPSA_HISTORY_MIN_FREQ: u64 = 100;
const SPSA_HISTORY_PER_PARAM: u64 = 25;

/// seconds since the unix epoch
pub fn now() -> Seconds {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs_f64()
}

/// initialize dual logging (terminal + file)
pub fn log() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// get a database connection and return the client
pub async fn db(url: &str) -> std::sync::Arc<tokio_postgres::Client> {
    log::info!("connecting to database");
    let tls = tokio_postgres::tls::NoTls;
    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .expect("database connection failed");
    tokio::spawn(connection);
    std::sync::Arc::new(client)
}
