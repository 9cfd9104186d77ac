use super::*;
use crate::RunId;
use crate::Seconds;
use serde::Deserialize;
use serde::Serialize;

/// One A/B experiment of a candidate engine against its baseline, owned by
/// the registry and projected into the store as a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub args: RunArgs,
    pub start_time: Seconds,
    pub last_updated: Seconds,
    pub tc_base: Option<f64>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub bad_tasks: Vec<Task>,
    pub results: Stats,
    pub results_stale: bool,
    pub finished: bool,
    #[serde(default)]
    pub deleted: bool,
    pub approved: bool,
    #[serde(default)]
    pub approver: String,
    #[serde(default)]
    pub is_green: bool,
    #[serde(default)]
    pub is_yellow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_info: Option<ResultsInfo>,
    #[serde(default)]
    pub cores: u64,
}

impl Run {
    pub fn new(args: RunArgs, now: Seconds) -> Self {
        let tc_base = TimeControl::base(&args.tc);
        let tasks = Self::generate_tasks(args.num_games);
        Self {
            id: 0,
            args,
            start_time: now,
            last_updated: now,
            tc_base,
            tasks,
            bad_tasks: Vec::new(),
            results: Stats::default(),
            results_stale: false,
            finished: false,
            deleted: false,
            approved: false,
            approver: String::new(),
            is_green: false,
            is_yellow: false,
            stop_reason: None,
            results_info: None,
            cores: 0,
        }
    }

    /// slice a game count into chunks of at most the standard size
    pub fn generate_tasks(num_games: u64) -> Vec<Task> {
        let mut tasks = Vec::new();
        let mut remaining = num_games;
        while remaining > 0 {
            let size = remaining.min(crate::CHUNK_SIZE);
            tasks.push(Task::new(size));
            remaining -= size;
        }
        tasks
    }

    /// Sum task stats into the aggregate. The pentanomial only survives
    /// when every task that carries stats carries one; a single trinomial
    /// straggler drops it from the aggregate.
    pub fn aggregate(&mut self) {
        let mut results = Stats::default();
        let mut pentanomial = Some([0u64; 5]);
        for stats in self.tasks.iter().filter_map(|t| t.stats.as_ref()) {
            results.wins += stats.wins;
            results.losses += stats.losses;
            results.draws += stats.draws;
            results.crashes += stats.crashes;
            results.time_losses += stats.time_losses;
            pentanomial = match (pentanomial, stats.pentanomial) {
                (Some(sum), Some(p)) => {
                    Some(std::array::from_fn(|i| sum[i] + p[i]))
                }
                _ => None,
            };
        }
        results.pentanomial = pentanomial;
        self.results = results;
        self.results_stale = false;
    }

    pub fn games_played(&self) -> u64 {
        self.results.games()
    }

    /// total concurrency of the workers currently on this run
    pub fn sum_cores(&mut self) {
        self.cores = self
            .tasks
            .iter()
            .filter(|t| t.active)
            .filter_map(|t| t.worker_info.as_ref())
            .map(|w| w.concurrency)
            .sum();
    }

    /// Internal throughput: the scheduler weight of this run. Scales the
    /// submitted throughput by time control and thread hunger, halves
    /// fixed-length runs, and lets an SPRT run's weight track its LLR
    /// progress toward the accept bound.
    pub fn calc_itp(&mut self) {
        let mut itp = (self.args.throughput as f64).clamp(1.0, 500.0);
        let here = self.args.tc.parse::<TimeControl>();
        let there = crate::REFERENCE_TC.parse::<TimeControl>();
        if let (Ok(here), Ok(there)) = (here, there) {
            itp *= (here.duration() / there.duration()).sqrt();
        }
        itp *= (self.args.threads as f64).sqrt();
        itp *= match self.args.sprt() {
            None => 0.5,
            Some(sprt) => (5.0 + sprt.llr) / 5.0,
        };
        self.args.itp = itp;
    }

    /// any chunk still waiting or in flight
    pub fn open(&self) -> bool {
        self.tasks.iter().any(|t| t.pending || t.active)
    }

    /// stop path: drop chunks that never produced stats, close out the rest
    pub fn close_tasks(&mut self) {
        self.tasks.retain(|task| task.stats.is_some());
        for task in self.tasks.iter_mut() {
            task.finish();
        }
    }

    /// set stale task activations aside for re-dispatch
    pub fn scavenge(&mut self, now: Seconds) -> usize {
        let horizon = now - crate::SCAVENGE_HORIZON;
        let mut evicted = 0;
        for task in self.tasks.iter_mut() {
            if task.active && task.last_updated < horizon {
                task.active = false;
                evicted += 1;
            }
        }
        evicted
    }
}
