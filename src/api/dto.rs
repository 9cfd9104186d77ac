use crate::RunId;
use crate::TaskId;
use crate::registry::SpsaReport;
use crate::run::Run;
use crate::run::RunArgs;
use crate::run::Stats;
use crate::run::StopRule;
use crate::run::WorkerInfo;
use crate::stats::Clipping;
use crate::stats::EloModel;
use crate::stats::Rounding;
use crate::stats::Spsa;
use crate::stats::Sprt;
use serde::Deserialize;

use super::ApiError;

/// worker RPC envelope: credentials ride in the worker_info
#[derive(Deserialize)]
pub struct WorkerRequest {
    pub password: String,
    pub worker_info: WorkerInfo,
}

#[derive(Deserialize)]
pub struct TaskReport {
    pub username: String,
    pub password: String,
    pub run_id: RunId,
    pub task_id: TaskId,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub nps: f64,
    #[serde(default)]
    pub spsa: Option<SpsaReport>,
}

#[derive(Deserialize)]
pub struct TaskRef {
    pub username: String,
    pub password: String,
    pub run_id: RunId,
    pub task_id: TaskId,
}

#[derive(Deserialize)]
pub struct StopRun {
    pub username: String,
    pub password: String,
    pub run_id: RunId,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
pub struct PgnUpload {
    pub username: String,
    pub password: String,
    pub run_id: RunId,
    pub task_id: TaskId,
    /// base64 of the deflate-compressed archive
    pub pgn: String,
}

/// submitter surface: create a run
#[derive(Deserialize)]
pub struct NewRun {
    pub username: String,
    pub password: String,
    pub base_tag: String,
    pub new_tag: String,
    pub tc: String,
    pub book: String,
    pub book_depth: u32,
    #[serde(default = "one")]
    pub threads: u64,
    #[serde(default)]
    pub base_options: String,
    #[serde(default)]
    pub new_options: String,
    pub base_signature: String,
    pub new_signature: String,
    #[serde(default)]
    pub info: String,
    #[serde(default = "yes")]
    pub auto_purge: bool,
    #[serde(default = "hundred")]
    pub throughput: u64,
    #[serde(default)]
    pub priority: i64,
    pub stop_rule: String,
    #[serde(default)]
    pub num_games: u64,
    #[serde(default)]
    pub sprt_elo0: Option<f64>,
    #[serde(default)]
    pub sprt_elo1: Option<f64>,
    #[serde(default)]
    pub sprt_elo_model: Option<EloModel>,
    #[serde(default, rename = "spsa_A")]
    pub spsa_a: Option<f64>,
    #[serde(default)]
    pub spsa_alpha: Option<f64>,
    #[serde(default)]
    pub spsa_gamma: Option<f64>,
    #[serde(default)]
    pub spsa_raw_params: Option<String>,
    #[serde(default)]
    pub spsa_clipping: Option<Clipping>,
    #[serde(default)]
    pub spsa_rounding: Option<Rounding>,
}

fn one() -> u64 {
    1
}

fn yes() -> bool {
    true
}

fn hundred() -> u64 {
    100
}

impl NewRun {
    /// resolve the stopping rule and assemble validated run arguments
    pub fn into_args(self) -> Result<RunArgs, ApiError> {
        let (stop_rule, num_games) = match self.stop_rule.as_str() {
            "sprt" => {
                let elo0 = self
                    .sprt_elo0
                    .ok_or_else(|| ApiError::Validation("sprt_elo0 is required".to_string()))?;
                let elo1 = self
                    .sprt_elo1
                    .ok_or_else(|| ApiError::Validation("sprt_elo1 is required".to_string()))?;
                let model = self.sprt_elo_model.unwrap_or(EloModel::Logistic);
                let batch = crate::SPRT_BATCH_SIZE_GAMES / 2;
                let sprt = Sprt::new(0.05, 0.05, elo0, elo1, model, batch);
                // open-ended in practice; bounded so the server stays sane
                (StopRule::Sprt(sprt), crate::SPRT_CHUNKS * crate::CHUNK_SIZE)
            }
            "spsa" => {
                if self.num_games == 0 {
                    return Err(ApiError::Validation("number of games must be > 0".to_string()));
                }
                let num_iter = self.num_games / 2;
                let raw = self.spsa_raw_params.as_deref().ok_or_else(|| {
                    ApiError::Validation("spsa_raw_params is required".to_string())
                })?;
                let spsa = Spsa::parse(
                    raw,
                    self.spsa_a.unwrap_or(num_iter as f64 / 10.0),
                    self.spsa_alpha.unwrap_or(0.602),
                    self.spsa_gamma.unwrap_or(0.101),
                    num_iter,
                    self.spsa_clipping.unwrap_or(Clipping::Old),
                    self.spsa_rounding.unwrap_or(Rounding::Deterministic),
                )
                .map_err(|e| ApiError::Validation(e.to_string()))?;
                (StopRule::Spsa(spsa), self.num_games)
            }
            "games" => {
                if self.num_games == 0 {
                    return Err(ApiError::Validation("number of games must be > 0".to_string()));
                }
                (StopRule::Games, self.num_games)
            }
            other => {
                return Err(ApiError::Validation(format!("unknown stop rule: {}", other)));
            }
        };
        let args = RunArgs {
            base_tag: self.base_tag,
            new_tag: self.new_tag,
            num_games,
            tc: self.tc,
            book: self.book,
            book_depth: self.book_depth,
            threads: self.threads,
            base_options: self.base_options,
            new_options: self.new_options,
            base_signature: self.base_signature,
            new_signature: self.new_signature,
            username: self.username,
            info: self.info,
            auto_purge: self.auto_purge,
            throughput: self.throughput,
            priority: self.priority,
            itp: 100.0,
            stop_rule,
        };
        args.validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        Ok(args)
    }
}

#[derive(Deserialize)]
pub struct ModifyRun {
    pub username: String,
    pub password: String,
    pub run_id: RunId,
    pub num_games: u64,
    pub priority: i64,
    pub throughput: u64,
}

#[derive(Deserialize)]
pub struct RunRef {
    pub username: String,
    pub password: String,
    pub run_id: RunId,
}

/// Slim a run document for the wire: workers never need the task list,
/// the bad pile, or a tuning trajectory that grows without bound.
pub fn strip_run(run: &Run) -> serde_json::Value {
    let mut doc = serde_json::to_value(run).unwrap_or(serde_json::Value::Null);
    if let Some(doc) = doc.as_object_mut() {
        doc.remove("tasks");
        doc.remove("bad_tasks");
        if let Some(spsa) = doc
            .get_mut("args")
            .and_then(|a| a.get_mut("stop_rule"))
            .and_then(|s| s.get_mut("spsa"))
            .and_then(|s| s.as_object_mut())
        {
            spsa.remove("param_history");
        }
    }
    doc
}

/// the assignment payload: id, args and the worker's own chunk only
pub fn min_run(run: &Run, task_id: TaskId) -> serde_json::Value {
    let mut doc = serde_json::json!({ "_id": run.id });
    let stripped = strip_run(run);
    doc["args"] = stripped.get("args").cloned().unwrap_or(serde_json::Value::Null);
    let task = &run.tasks[task_id];
    let mut my_task = serde_json::json!({ "num_games": task.num_games });
    if let Some(ref stats) = task.stats {
        my_task["stats"] = serde_json::to_value(stats).unwrap_or(serde_json::Value::Null);
    }
    doc["my_task"] = my_task;
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::fixtures;

    #[test]
    fn strip_removes_the_heavy_fields() {
        let mut run = fixtures::spsa_run("P,100,0,200,4,0.002", 2000);
        run.args.spsa_mut().unwrap().param_history.push(Vec::new());
        let doc = strip_run(&run);
        assert!(doc.get("tasks").is_none());
        assert!(doc.get("bad_tasks").is_none());
        assert!(
            doc["args"]["stop_rule"]["spsa"].get("param_history").is_none()
        );
        assert!(doc["args"]["stop_rule"]["spsa"].get("iter").is_some());
    }

    #[test]
    fn min_run_carries_only_my_task() {
        let mut run = fixtures::sprt_run(4);
        run.id = 42;
        run.tasks[0].stats = Some(Stats {
            wins: 3,
            losses: 1,
            draws: 4,
            ..Default::default()
        });
        let doc = min_run(&run, 0);
        assert_eq!(doc["_id"], 42);
        assert_eq!(doc["my_task"]["num_games"], crate::CHUNK_SIZE);
        assert_eq!(doc["my_task"]["stats"]["wins"], 3);
        assert!(doc.get("tasks").is_none());
        let doc = min_run(&run, 1);
        assert!(doc["my_task"].get("stats").is_none());
    }

    #[test]
    fn new_run_requires_rule_specific_fields() {
        let base = serde_json::json!({
            "username": "u", "password": "p",
            "base_tag": "master", "new_tag": "patch",
            "tc": "10+0.1", "book": "book.epd", "book_depth": 8,
            "base_signature": "1234567", "new_signature": "7654321",
            "stop_rule": "sprt",
        });
        let req: NewRun = serde_json::from_value(base.clone()).unwrap();
        assert!(req.into_args().is_err());
        let mut with_elo = base.clone();
        with_elo["sprt_elo0"] = serde_json::json!(0.0);
        with_elo["sprt_elo1"] = serde_json::json!(5.0);
        let req: NewRun = serde_json::from_value(with_elo).unwrap();
        let args = req.into_args().unwrap();
        assert_eq!(args.num_games, crate::SPRT_CHUNKS * crate::CHUNK_SIZE);
        assert_eq!(args.sprt().unwrap().batch_size, 4);
    }

    #[test]
    fn spsa_defaults_follow_the_iteration_count() {
        let req = serde_json::json!({
            "username": "u", "password": "p",
            "base_tag": "master", "new_tag": "patch",
            "tc": "10+0.1", "book": "book.epd", "book_depth": 8,
            "base_signature": "1234567", "new_signature": "7654321",
            "stop_rule": "spsa", "num_games": 20000,
            "spsa_raw_params": "P,100,0,200,4,0.002",
        });
        let req: NewRun = serde_json::from_value(req).unwrap();
        let args = req.into_args().unwrap();
        let spsa = args.spsa().unwrap();
        assert_eq!(spsa.num_iter, 10000);
        assert!((spsa.a_cap - 1000.0).abs() < 1e-9);
        assert_eq!(spsa.clipping, Clipping::Old);
    }
}
