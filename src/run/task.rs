use super::*;
use crate::Seconds;
use serde::Deserialize;
use serde::Serialize;

/// remaining GitHub API budget a worker reports with each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub remaining: u64,
    pub limit: u64,
}

/// worker identity and capabilities, captured at assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub username: String,
    pub unique_key: String,
    pub version: u32,
    pub concurrency: u64,
    #[serde(default = "default_min_threads")]
    pub min_threads: u64,
    #[serde(default)]
    pub max_memory: u64,
    #[serde(default)]
    pub remote_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

fn default_min_threads() -> u64 {
    1
}

impl WorkerInfo {
    /// true when the worker is short on GitHub API calls and should only
    /// be handed runs it has already compiled
    pub fn throttled(&self) -> bool {
        match self.rate {
            Some(rate) => (rate.remaining as f64) <= 2.0 * (rate.limit as f64).sqrt(),
            None => false,
        }
    }

    /// display key aggregating this machine's tasks in the residual audit
    pub fn key(&self) -> String {
        let tag = &self.unique_key[..self.unique_key.len().min(8)];
        format!("{}-{}cores-{}", self.username, self.concurrency, tag)
    }
}

/// A fixed-size slice of a run's games, claimed by one worker at a time.
///
/// State space: unclaimed (pending, not active), assigned (pending and
/// active), finished (neither). A chunk may lose its worker without
/// finishing and be handed out again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub num_games: u64,
    pub pending: bool,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_info: Option<WorkerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default)]
    pub nps: f64,
    #[serde(default)]
    pub last_updated: Seconds,
    #[serde(default)]
    pub residual: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residual_color: Option<Color>,
    #[serde(default)]
    pub bad: bool,
}

impl Task {
    pub fn new(num_games: u64) -> Self {
        Self {
            num_games,
            pending: true,
            active: false,
            worker_info: None,
            stats: None,
            nps: 0.0,
            last_updated: 0.0,
            residual: 0.0,
            residual_color: None,
            bad: false,
        }
    }

    pub fn unclaimed(&self) -> bool {
        self.pending && !self.active
    }

    pub fn assigned(&self) -> bool {
        self.pending && self.active
    }

    pub fn claim(&mut self, worker: WorkerInfo, now: Seconds) {
        self.worker_info = Some(worker);
        self.last_updated = now;
        self.active = true;
    }

    /// pending drops before active so a racing dispatcher can only ever
    /// claim a chunk that is still genuinely pending
    pub fn finish(&mut self) {
        self.pending = false;
        self.active = false;
    }

    pub fn games(&self) -> u64 {
        self.stats.as_ref().map(Stats::games).unwrap_or(0)
    }

    pub fn key(&self) -> Option<String> {
        self.worker_info.as_ref().map(WorkerInfo::key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(name: &str) -> WorkerInfo {
        WorkerInfo {
            username: name.to_string(),
            unique_key: "aaaabbbbcccc".to_string(),
            version: crate::WORKER_VERSION,
            concurrency: 8,
            min_threads: 1,
            max_memory: 4096,
            remote_addr: "10.0.0.1".to_string(),
            rate: None,
            country_code: None,
        }
    }

    #[test]
    fn lifecycle_states_are_exclusive() {
        let mut task = Task::new(200);
        assert!(task.unclaimed() && !task.assigned());
        task.claim(worker("alice"), 1.0);
        assert!(task.assigned() && !task.unclaimed());
        task.finish();
        assert!(!task.pending && !task.active);
    }

    #[test]
    fn scavenged_task_is_reassignable() {
        let mut task = Task::new(200);
        task.claim(worker("alice"), 1.0);
        task.active = false;
        assert!(task.unclaimed());
    }

    #[test]
    fn throttled_workers_are_detected() {
        let mut w = worker("alice");
        assert!(!w.throttled());
        w.rate = Some(Rate {
            remaining: 500,
            limit: 5000,
        });
        assert!(!w.throttled());
        w.rate = Some(Rate {
            remaining: 100,
            limit: 5000,
        });
        assert!(w.throttled());
    }

    #[test]
    fn worker_key_blends_identity_and_size() {
        assert_eq!(worker("alice").key(), "alice-8cores-aaaabbbb");
    }
}
