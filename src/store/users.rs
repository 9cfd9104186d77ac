use crate::Seconds;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio_postgres::Client;

/// contributor account document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_limit: Option<i64>,
    #[serde(default)]
    pub registration_time: Seconds,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(|g| g == "admins")
    }
}

/// user lookups with a short-lived cache in front of the store
pub struct Users {
    client: Arc<Client>,
    cache: Mutex<HashMap<String, (User, Seconds)>>,
}

const USER_CACHE_TTL: Seconds = 60.0;

impl From<Arc<Client>> for Users {
    fn from(client: Arc<Client>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Users {
    pub async fn find(&self, username: &str) -> anyhow::Result<Option<User>> {
        let now = crate::now();
        if let Some((user, time)) = self.cache.lock().unwrap().get(username) {
            if *time > now - USER_CACHE_TTL {
                return Ok(Some(user.clone()));
            }
        }
        const SQL: &'static str = "SELECT doc::text FROM users WHERE username = $1";
        let Some(row) = self.client.query_opt(SQL, &[&username]).await? else {
            return Ok(None);
        };
        let user: User = serde_json::from_str(row.get::<_, &str>(0))?;
        self.cache
            .lock()
            .unwrap()
            .insert(username.to_string(), (user.clone(), now));
        Ok(Some(user))
    }

    /// verify worker credentials; blocked accounts are refused
    pub async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<User> {
        let user = self
            .find(username)
            .await?
            .ok_or_else(|| anyhow::anyhow!("invalid password"))?;
        if user.password != password {
            log::warn!("invalid login for {}", username);
            anyhow::bail!("invalid password");
        }
        if user.blocked {
            log::warn!("blocked login for {}", username);
            anyhow::bail!("blocked");
        }
        Ok(user)
    }

    /// concurrent machines one account may run from a single address
    pub async fn machine_limit(&self, username: &str) -> i64 {
        match self.find(username).await {
            Ok(Some(user)) => user.machine_limit.unwrap_or(crate::DEFAULT_MACHINE_LIMIT),
            _ => crate::DEFAULT_MACHINE_LIMIT,
        }
    }

    /// lifetime contribution from the leaderboard cache document
    pub async fn cpu_hours(&self, username: &str) -> i64 {
        const SQL: &'static str = "SELECT doc::text FROM user_cache WHERE username = $1";
        let Ok(Some(row)) = self.client.query_opt(SQL, &[&username]).await else {
            return 0;
        };
        serde_json::from_str::<serde_json::Value>(row.get::<_, &str>(0))
            .ok()
            .and_then(|doc| doc.get("cpu_hours").and_then(|h| h.as_i64()))
            .unwrap_or(0)
    }

    pub async fn save(&self, user: &User) -> anyhow::Result<()> {
        const SQL: &'static str = r#"
            INSERT INTO users (username, doc) VALUES ($1, $2::jsonb)
            ON CONFLICT (username) DO UPDATE SET doc = EXCLUDED.doc;
        "#;
        let doc = serde_json::to_string(user)?;
        self.client.execute(SQL, &[&user.username, &doc]).await?;
        self.cache.lock().unwrap().remove(&user.username);
        Ok(())
    }

    /// block or unblock an account and drop it from the cache
    pub async fn block(&self, username: &str, blocked: bool) -> anyhow::Result<bool> {
        let Some(mut user) = self.find(username).await? else {
            return Ok(false);
        };
        user.blocked = blocked;
        self.save(&user).await?;
        Ok(true)
    }

}
