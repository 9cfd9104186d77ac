use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use tokio_postgres::Client;
use tokio_postgres::Error as E;

/// every administrative event on a run or user leaves a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    NewRun,
    ModifyRun,
    StopRun,
    DeleteRun,
    ApproveRun,
    PurgeRun,
    BlockUser,
    UpdateStats,
}

impl Verb {
    fn name(&self) -> &'static str {
        match self {
            Verb::NewRun => "new_run",
            Verb::ModifyRun => "modify_run",
            Verb::StopRun => "stop_run",
            Verb::DeleteRun => "delete_run",
            Verb::ApproveRun => "approve_run",
            Verb::PurgeRun => "purge_run",
            Verb::BlockUser => "block_user",
            Verb::UpdateStats => "update_stats",
        }
    }
}

/// append-only log of administrative actions
#[derive(Clone)]
pub struct Actions(Arc<Client>);

impl From<Arc<Client>> for Actions {
    fn from(client: Arc<Client>) -> Self {
        Self(client)
    }
}

impl Actions {
    pub async fn record(
        &self,
        username: &str,
        verb: Verb,
        data: serde_json::Value,
    ) -> Result<(), E> {
        const SQL: &'static str = r#"
            INSERT INTO actions (time, username, action, data)
            VALUES ($1, $2, $3, $4::jsonb);
        "#;
        self.0
            .execute(
                SQL,
                &[&crate::now(), &username, &verb.name(), &data.to_string()],
            )
            .await?;
        Ok(())
    }

    /// recent entries, optionally narrowed by verb or username; stats
    /// refreshes are noise and are excluded unless asked for
    pub async fn recent(
        &self,
        limit: i64,
        verb: Option<Verb>,
        username: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, E> {
        let mut sql = String::from("SELECT data::text, username, action, time FROM actions");
        let verb_name = verb.map(|v| v.name());
        match verb_name {
            Some(_) => sql.push_str(" WHERE action = $2"),
            None => sql.push_str(" WHERE action != 'update_stats'"),
        }
        if username.is_some() {
            sql.push_str(match verb_name {
                Some(_) => " AND username = $3",
                None => " AND username = $2",
            });
        }
        sql.push_str(" ORDER BY id DESC LIMIT $1");
        let rows = match (verb_name, username) {
            (Some(ref v), Some(ref u)) => self.0.query(&sql, &[&limit, v, u]).await?,
            (Some(ref v), None) => self.0.query(&sql, &[&limit, v]).await?,
            (None, Some(ref u)) => self.0.query(&sql, &[&limit, u]).await?,
            (None, None) => self.0.query(&sql, &[&limit]).await?,
        };
        Ok(rows
            .iter()
            .map(|row| {
                serde_json::json!({
                    "time": row.get::<_, f64>(3),
                    "username": row.get::<_, &str>(1),
                    "action": row.get::<_, &str>(2),
                    "data": serde_json::from_str::<serde_json::Value>(row.get::<_, &str>(0))
                        .unwrap_or(serde_json::Value::Null),
                })
            })
            .collect())
    }
}
