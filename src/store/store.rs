use crate::RunId;
use crate::run::Run;
use std::sync::Arc;
use tokio_postgres::Client;
use tokio_postgres::Error as E;

/// Persistent document store for runs and PGN blobs. Documents travel as
/// JSON text and are cast into JSONB at the server; the mirrored scalar
/// columns keep the indexed predicates queryable.
#[derive(Clone)]
pub struct Store(Arc<Client>);

impl From<Arc<Client>> for Store {
    fn from(client: Arc<Client>) -> Self {
        Self(client)
    }
}

impl Store {
    pub async fn prepare(&self) -> Result<(), E> {
        super::prepare(&self.0).await
    }

    /// materialize a new run document and return its id
    pub async fn insert_run(&self, run: &mut Run) -> anyhow::Result<RunId> {
        const SQL: &'static str = r#"
            INSERT INTO runs (doc, finished, deleted, is_green, is_yellow, tc_base, username, last_updated)
            VALUES ($1::jsonb, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id;
        "#;
        let doc = serde_json::to_string(run)?;
        let row = self
            .0
            .query_one(
                SQL,
                &[
                    &doc,
                    &run.finished,
                    &run.deleted,
                    &run.is_green,
                    &run.is_yellow,
                    &run.tc_base,
                    &run.args.username,
                    &run.last_updated,
                ],
            )
            .await?;
        run.id = row.get::<_, i64>(0);
        self.replace_run(run).await?;
        Ok(run.id)
    }

    /// overwrite a run document and its mirrored columns
    pub async fn replace_run(&self, run: &Run) -> anyhow::Result<()> {
        const SQL: &'static str = r#"
            UPDATE runs
            SET doc = $2::jsonb, finished = $3, deleted = $4, is_green = $5,
                is_yellow = $6, tc_base = $7, username = $8, last_updated = $9
            WHERE id = $1;
        "#;
        let doc = serde_json::to_string(run)?;
        self.0
            .execute(
                SQL,
                &[
                    &run.id,
                    &doc,
                    &run.finished,
                    &run.deleted,
                    &run.is_green,
                    &run.is_yellow,
                    &run.tc_base,
                    &run.args.username,
                    &run.last_updated,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn load_run(&self, id: RunId) -> anyhow::Result<Option<Run>> {
        const SQL: &'static str = "SELECT doc::text FROM runs WHERE id = $1";
        match self.0.query_opt(SQL, &[&id]).await? {
            Some(row) => Ok(Some(serde_json::from_str(row.get::<_, &str>(0))?)),
            None => Ok(None),
        }
    }

    /// ids of unfinished runs, most recently updated first
    pub async fn unfinished_runs(&self) -> Result<Vec<RunId>, E> {
        const SQL: &'static str = r#"
            SELECT id FROM runs
            WHERE NOT finished
            ORDER BY last_updated DESC;
        "#;
        Ok(self
            .0
            .query(SQL, &[])
            .await?
            .iter()
            .map(|row| row.get::<_, i64>(0))
            .collect())
    }

    /// finished runs by the indexed predicates, deleted runs filtered out
    pub async fn finished_runs(
        &self,
        skip: i64,
        limit: i64,
        username: Option<&str>,
        green_only: bool,
        yellow_only: bool,
        ltc_only: bool,
    ) -> anyhow::Result<Vec<Run>> {
        let mut sql = String::from("SELECT doc::text FROM runs WHERE finished AND NOT deleted");
        if username.is_some() {
            sql.push_str(" AND username = $3");
        }
        if green_only {
            sql.push_str(" AND is_green");
        }
        if yellow_only {
            sql.push_str(" AND is_yellow");
        }
        if ltc_only {
            sql.push_str(" AND tc_base >= 40");
        }
        sql.push_str(" ORDER BY last_updated DESC OFFSET $1 LIMIT $2");
        let rows = match username {
            Some(ref name) => self.0.query(&sql, &[&skip, &limit, name]).await?,
            None => self.0.query(&sql, &[&skip, &limit]).await?,
        };
        rows.iter()
            .map(|row| Ok(serde_json::from_str(row.get::<_, &str>(0))?))
            .collect()
    }

    /// store a worker's deflate-compressed game archive under run-task
    pub async fn insert_pgn(&self, id: &str, pgn_zip: &[u8]) -> Result<(), E> {
        const SQL: &'static str = r#"
            INSERT INTO pgns (id, pgn_zip) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET pgn_zip = EXCLUDED.pgn_zip;
        "#;
        self.0.execute(SQL, &[&id, &pgn_zip]).await?;
        Ok(())
    }

    pub async fn load_pgn(&self, id: &str) -> Result<Option<Vec<u8>>, E> {
        const SQL: &'static str = "SELECT pgn_zip FROM pgns WHERE id = $1";
        Ok(self
            .0
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| row.get::<_, Vec<u8>>(0)))
    }
}
