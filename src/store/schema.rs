use std::sync::Arc;
use tokio_postgres::Client;
use tokio_postgres::Error as E;

/// One table per collection. Run documents live in JSONB with the indexed
/// predicates mirrored into scalar columns so the partial indexes below
/// can serve the hot queries without touching the document.
const CREATES: &str = r#"
    CREATE TABLE IF NOT EXISTS runs (
        id           BIGSERIAL PRIMARY KEY,
        doc          JSONB NOT NULL,
        finished     BOOLEAN NOT NULL DEFAULT FALSE,
        deleted      BOOLEAN NOT NULL DEFAULT FALSE,
        is_green     BOOLEAN NOT NULL DEFAULT FALSE,
        is_yellow    BOOLEAN NOT NULL DEFAULT FALSE,
        tc_base      DOUBLE PRECISION,
        username     TEXT NOT NULL,
        last_updated DOUBLE PRECISION NOT NULL
    );
    CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY,
        doc      JSONB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS user_cache (
        username TEXT PRIMARY KEY,
        doc      JSONB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS pgns (
        id      TEXT PRIMARY KEY,
        pgn_zip BYTEA NOT NULL
    );
    CREATE TABLE IF NOT EXISTS actions (
        id       BIGSERIAL PRIMARY KEY,
        time     DOUBLE PRECISION NOT NULL,
        username TEXT NOT NULL,
        action   TEXT NOT NULL,
        data     JSONB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS flag_cache (
        ip           TEXT PRIMARY KEY,
        country_code TEXT NOT NULL,
        checked_at   DOUBLE PRECISION NOT NULL
    );
    CREATE TABLE IF NOT EXISTS deltas (
        id   BIGSERIAL PRIMARY KEY,
        time DOUBLE PRECISION NOT NULL,
        doc  JSONB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS top_month (
        username TEXT PRIMARY KEY,
        doc      JSONB NOT NULL
    );
"#;

const INDICES: &str = r#"
    CREATE INDEX IF NOT EXISTS unfinished_runs
        ON runs (last_updated DESC) WHERE NOT finished;
    CREATE INDEX IF NOT EXISTS finished_runs
        ON runs (last_updated DESC) WHERE finished;
    CREATE INDEX IF NOT EXISTS finished_green_runs
        ON runs (last_updated DESC) WHERE finished AND is_green;
    CREATE INDEX IF NOT EXISTS finished_yellow_runs
        ON runs (last_updated DESC) WHERE finished AND is_yellow;
    CREATE INDEX IF NOT EXISTS finished_ltc_runs
        ON runs (last_updated DESC) WHERE finished AND tc_base >= 40;
    CREATE INDEX IF NOT EXISTS user_runs
        ON runs (username, last_updated DESC);
    CREATE INDEX IF NOT EXISTS recent_actions
        ON actions (id DESC);
"#;

/// create all collections and indexes, idempotently
pub async fn prepare(client: &Arc<Client>) -> Result<(), E> {
    log::info!("preparing schema");
    client.batch_execute(CREATES).await?;
    client.batch_execute(INDICES).await?;
    Ok(())
}
