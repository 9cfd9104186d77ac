use super::RunRegistry;
use super::sessions;
use super::sessions::Sessions;
use crate::RunId;
use crate::TaskId;
use crate::run::Run;
use crate::run::Stats;
use crate::stats::Status;
use serde::Deserialize;
use serde::Serialize;

/// worker-side tally of an SPSA sub-task, counted from the perturbed side
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpsaReport {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub num_games: u64,
}

impl SpsaReport {
    pub fn games(&self) -> u64 {
        self.wins + self.losses + self.draws
    }
}

/// how one progress report was received
enum Applied {
    /// unknown task, dead task or impostor: silently refused
    Stale,
    /// the report broke monotonicity, parity or batch alignment
    Contract { persist: bool },
    /// committed
    Committed {
        task_alive: bool,
        all_done: bool,
        decided: bool,
    },
}

impl RunRegistry {
    /// Apply a per-chunk progress report. Serialized per run; reports for
    /// other runs proceed in parallel. Any refusal answers task_alive =
    /// false so a misbehaving worker abandons its chunk without corrupting
    /// the run.
    pub async fn update_task(
        &self,
        run_id: RunId,
        task_id: TaskId,
        stats: Stats,
        nps: f64,
        spsa: Option<SpsaReport>,
        username: &str,
    ) -> anyhow::Result<bool> {
        let lock = self.run_lock(run_id);
        let guard = lock.lock().await;
        let line = self.get(run_id).await?;
        let applied = {
            let mut run = line.lock().unwrap();
            apply(&self.sessions, &mut run, task_id, stats, nps, spsa, username)
        };
        match applied {
            Applied::Stale => Ok(false),
            Applied::Contract { persist } => {
                if persist {
                    self.buffer(&line, true).await;
                }
                Ok(false)
            }
            Applied::Committed {
                task_alive,
                all_done,
                decided,
            } => {
                if decided || all_done {
                    self.buffer(&line, true).await;
                    drop(guard);
                    self.stop(run_id).await?;
                    Ok(if decided { false } else { task_alive })
                } else {
                    self.buffer(&line, false).await;
                    Ok(task_alive)
                }
            }
        }
    }

    /// A worker gave up on its chunk: release it for re-dispatch.
    pub async fn failed_task(&self, run_id: RunId, task_id: TaskId) -> anyhow::Result<bool> {
        let line = self.get(run_id).await?;
        {
            let mut run = line.lock().unwrap();
            if task_id >= run.tasks.len() || !run.tasks[task_id].assigned() {
                return Ok(false);
            }
            run.tasks[task_id].active = false;
        }
        self.buffer(&line, true).await;
        Ok(true)
    }
}

/// validate and commit one report under the run's document lock
fn apply(
    sessions: &Sessions,
    run: &mut Run,
    task_id: TaskId,
    stats: Stats,
    nps: f64,
    spsa: Option<SpsaReport>,
    username: &str,
) -> Applied {
    if task_id >= run.tasks.len() {
        return Applied::Stale;
    }
    if !run.tasks[task_id].assigned() {
        return Applied::Stale;
    }
    let worker = run.tasks[task_id]
        .worker_info
        .clone()
        .expect("assigned tasks carry a worker");
    if worker.username != username {
        log::warn!("update for task {}:{} from impostor {}", run.id, task_id, username);
        return Applied::Stale;
    }
    let num_games = stats.games();
    let old_games = run.tasks[task_id].games();
    let spsa_games = match (run.args.spsa(), spsa) {
        (Some(_), Some(report)) => report.games(),
        _ => 0,
    };
    if num_games < old_games
        || (spsa_games > 0 && num_games == 0)
        || (spsa_games > 0 && run.tasks[task_id].stats.is_some() && num_games <= old_games)
    {
        return Applied::Contract { persist: false };
    }
    // the worker plays whole game pairs
    if (num_games - old_games) % 2 != 0 {
        return Applied::Contract { persist: false };
    }
    if !stats.coherent() {
        return Applied::Contract { persist: false };
    }
    if let Some(sprt) = run.args.sprt() {
        let grid = 2 * sprt.batch_size;
        if (num_games - old_games) % grid != 0 {
            // the llr walk loses its footing: drop the overshoot record
            run.args.sprt_mut().expect("just matched").invalidate_overshoot();
            return Applied::Contract { persist: true };
        }
    }
    let now = crate::now();
    let task = &mut run.tasks[task_id];
    task.stats = Some(stats);
    task.nps = nps;
    task.last_updated = now;
    if num_games >= task.num_games {
        task.finish();
        run.cores = run.cores.saturating_sub(worker.concurrency);
    }
    run.last_updated = now;
    run.results_stale = true;
    let all_done = !run.open();
    if let Some(report) = spsa {
        if run.args.spsa().is_some() && spsa_games == report.num_games {
            sessions::fold(sessions, run, &worker.unique_key, report);
        }
    }
    let mut decided = false;
    if run.args.sprt().is_some() {
        run.aggregate();
        let results = run.results.clone();
        let sprt = run.args.sprt_mut().expect("just matched");
        sprt.update(
            results.wins,
            results.losses,
            results.draws,
            results.pentanomial.as_ref(),
        );
        decided = sprt.state != Status::Open;
        if decided {
            log::info!("run {} sprt {:?} at llr {:.3}", run.id, sprt.state, sprt.llr);
        }
    }
    Applied::Committed {
        task_alive: run.tasks[task_id].active,
        all_done,
        decided,
    }
}
