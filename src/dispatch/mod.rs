use crate::RunId;
use crate::Seconds;
use crate::TaskId;
use crate::registry::RunRegistry;
use crate::run::EngineOptions;
use crate::run::Run;
use crate::run::WorkerInfo;
use crate::store::Users;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// what a polling worker gets back
pub enum Assignment {
    /// all dispatch slots taken; try again shortly
    Busy,
    /// this address already runs the account's machine allowance
    MachineLimit,
    /// nothing matches the worker's capabilities right now
    Waiting,
    Task {
        run: Arc<Mutex<Run>>,
        task_id: TaskId,
    },
}

/// the priority-sorted candidate view, rebuilt at most once a minute
struct State {
    refreshed: Seconds,
    seen: u64,
    candidates: Vec<(RunId, Arc<Mutex<Run>>)>,
    compiled: HashMap<String, HashSet<RunId>>,
}

/// Matches worker capabilities to pending chunks. At most four requests
/// compute at once; they serialize on the state lock, and over-quota
/// callers bounce immediately rather than queue up.
pub struct Dispatcher {
    registry: Arc<RunRegistry>,
    users: Arc<Users>,
    semaphore: tokio::sync::Semaphore,
    state: tokio::sync::Mutex<State>,
    epoch: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RunRegistry>, users: Arc<Users>, epoch: Arc<AtomicU64>) -> Self {
        Self {
            registry,
            users,
            semaphore: tokio::sync::Semaphore::new(crate::DISPATCH_SLOTS),
            state: tokio::sync::Mutex::new(State {
                refreshed: 0.0,
                seen: 0,
                candidates: Vec::new(),
                compiled: HashMap::new(),
            }),
            epoch,
        }
    }

    pub async fn request(&self, worker: WorkerInfo) -> anyhow::Result<Assignment> {
        let Ok(_permit) = self.semaphore.try_acquire() else {
            log::debug!("dispatch too busy for {}", worker.username);
            return Ok(Assignment::Busy);
        };
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        let limit = self.users.machine_limit(&worker.username).await;
        if connections(&state.candidates, &worker.remote_addr) >= limit.max(0) as usize {
            return Ok(Assignment::MachineLimit);
        }
        let throttled = worker.throttled();
        let now = crate::now();
        let mut found = None;
        for (id, run) in state.candidates.iter() {
            if throttled
                && !state
                    .compiled
                    .get(&worker.unique_key)
                    .is_some_and(|s| s.contains(id))
            {
                continue;
            }
            let mut run = run.lock().unwrap();
            if !eligible(&run, &worker) {
                continue;
            }
            if let Some(task_id) = claim(&mut run, &worker, now) {
                run.sum_cores();
                found = Some((*id, task_id));
                break;
            }
        }
        let Some((run_id, task_id)) = found else {
            return Ok(Assignment::Waiting);
        };
        sort(&mut state.candidates);
        state
            .compiled
            .entry(worker.unique_key.clone())
            .or_default()
            .insert(run_id);
        let run = state
            .candidates
            .iter()
            .find(|(id, _)| *id == run_id)
            .map(|(_, run)| run.clone())
            .expect("claimed run stays in the candidate list");
        self.registry.buffer(&run, false).await;
        log::info!(
            "assigned task {}:{} to {} ({} cores)",
            run_id,
            task_id,
            worker.username,
            worker.concurrency
        );
        Ok(Assignment::Task { run, task_id })
    }

    /// rebuild the candidate list when it ages out or the registry says so
    async fn refresh(&self, state: &mut State) -> anyhow::Result<()> {
        let now = crate::now();
        let epoch = self.epoch.load(Ordering::Relaxed);
        if now <= state.refreshed + crate::CANDIDATE_TTL && epoch == state.seen {
            return Ok(());
        }
        let mut candidates = Vec::new();
        for id in self.registry.unfinished_runs().await? {
            match self.registry.get(id).await {
                Ok(line) => {
                    {
                        let mut run = line.lock().unwrap();
                        run.sum_cores();
                        run.calc_itp();
                    }
                    candidates.push((id, line));
                }
                Err(e) => log::warn!("candidate run {} unavailable: {}", id, e),
            }
        }
        sort(&mut candidates);
        state.candidates = candidates;
        state.refreshed = now;
        state.seen = epoch;
        log::debug!("rebuilt {} dispatch candidates", state.candidates.len());
        Ok(())
    }
}

/// highest priority first, then most under-served relative to weight
fn sort(candidates: &mut [(RunId, Arc<Mutex<Run>>)]) {
    candidates.sort_by(|(a_id, a), (b_id, b)| {
        let (a, b) = (a.lock().unwrap(), b.lock().unwrap());
        let a_key = (-a.args.priority, a.cores as f64 / a.args.itp * 100.0, -a.args.itp);
        let b_key = (-b.args.priority, b.cores as f64 / b.args.itp * 100.0, -b.args.itp);
        a_key.0.cmp(&b_key.0)
            .then(a_key.1.total_cmp(&b_key.1))
            .then(a_key.2.total_cmp(&b_key.2))
            .then(a_id.cmp(b_id))
    });
}

/// active tasks across the candidate runs held from one address
fn connections(candidates: &[(RunId, Arc<Mutex<Run>>)], remote_addr: &str) -> usize {
    candidates
        .iter()
        .map(|(_, run)| {
            let run = run.lock().unwrap();
            run.tasks
                .iter()
                .filter(|t| t.active)
                .filter_map(|t| t.worker_info.as_ref())
                .filter(|w| w.remote_addr == remote_addr)
                .count()
        })
        .sum()
}

/// transposition-table memory the run demands from this worker
fn tt_demand(run: &Run, worker: &WorkerInfo) -> u64 {
    let new = EngineOptions::from(run.args.new_options.as_str()).hash;
    let base = EngineOptions::from(run.args.base_options.as_str()).hash;
    (new + base) * (worker.concurrency / run.args.threads)
}

/// capability admission: approval, thread bounds and memory demand
fn eligible(run: &Run, worker: &WorkerInfo) -> bool {
    run.approved
        && run.args.threads <= worker.concurrency
        && run.args.threads >= worker.min_threads
        && (worker.max_memory == 0 || tt_demand(run, worker) <= worker.max_memory)
}

/// tuning runs cap their fleet so the parameter noise stays bounded
fn limit_cores(run: &Run) -> f64 {
    match run.args.spsa() {
        Some(spsa) => crate::SPSA_CORE_BUDGET / (spsa.params.len() as f64).sqrt(),
        None => crate::SPRT_CORE_LIMIT,
    }
}

/// Claim the first unclaimed chunk, walking the tasks in order and giving
/// up once the run's active cores exceed its cap.
fn claim(run: &mut Run, worker: &WorkerInfo, now: Seconds) -> Option<TaskId> {
    let cap = limit_cores(run);
    let mut cores = 0u64;
    let mut claimed = None;
    for (task_id, task) in run.tasks.iter_mut().enumerate() {
        if task.active {
            cores += task.worker_info.as_ref().map_or(0, |w| w.concurrency);
            if cores as f64 > cap {
                break;
            }
        }
        if task.unclaimed() {
            task.claim(worker.clone(), now);
            claimed = Some(task_id);
            break;
        }
    }
    claimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::StopRule;
    use crate::run::fixtures;

    #[test]
    fn claim_takes_the_first_unclaimed_chunk() {
        let mut run = fixtures::sprt_run(4);
        let now = crate::now();
        run.tasks[0].claim(fixtures::worker("bob", "10.0.0.2"), now);
        let claimed = claim(&mut run, &fixtures::worker("alice", "10.0.0.1"), now);
        assert_eq!(claimed, Some(1));
        assert!(run.tasks[1].assigned());
        assert_eq!(
            run.tasks[1].worker_info.as_ref().unwrap().username,
            "alice"
        );
    }

    #[test]
    fn scavenged_chunks_are_claimed_again() {
        let mut run = fixtures::sprt_run(4);
        let now = crate::now();
        run.tasks[0].claim(fixtures::worker("bob", "10.0.0.2"), now);
        run.tasks[0].active = false;
        let claimed = claim(&mut run, &fixtures::worker("alice", "10.0.0.1"), now);
        assert_eq!(claimed, Some(0));
    }

    #[test]
    fn spsa_core_budget_caps_the_claim() {
        // one param: cap = 40000 cores; a 6000-core fleet of workers
        let mut run = fixtures::spsa_run("P,100,0,200,4,0.002", 2_000_000);
        let mut giant = fixtures::worker("giant", "10.0.0.9");
        giant.concurrency = 6000;
        for i in 0..7 {
            run.tasks[i].claim(giant.clone(), 0.0);
        }
        // 7 * 6000 = 42000 > 40000: the scan stops before any free chunk
        let claimed = claim(&mut run, &fixtures::worker("alice", "10.0.0.1"), 0.0);
        assert_eq!(claimed, None);
    }

    #[test]
    fn one_address_counts_across_runs() {
        let mut one = fixtures::sprt_run(4);
        one.id = 1;
        let mut two = fixtures::sprt_run(4);
        two.id = 2;
        one.tasks[0].claim(fixtures::worker("alice", "10.0.0.1"), 0.0);
        one.tasks[1].claim(fixtures::worker("alice", "10.0.0.1"), 0.0);
        two.tasks[0].claim(fixtures::worker("alice", "10.0.0.1"), 0.0);
        two.tasks[1].claim(fixtures::worker("bob", "10.0.0.2"), 0.0);
        // scavenged activations no longer count
        two.tasks[0].active = false;
        let candidates = [one, two]
            .into_iter()
            .map(|r| (r.id, Arc::new(Mutex::new(r))))
            .collect::<Vec<_>>();
        assert_eq!(connections(&candidates, "10.0.0.1"), 2);
        assert_eq!(connections(&candidates, "10.0.0.2"), 1);
        // a machine limit of 2 refuses a third machine on the address
        assert!(connections(&candidates, "10.0.0.1") >= 2);
    }

    #[test]
    fn eligibility_checks_threads_and_memory() {
        let mut run = fixtures::sprt_run(4);
        let mut worker = fixtures::worker("alice", "10.0.0.1");
        assert!(eligible(&run, &worker));
        run.approved = false;
        assert!(!eligible(&run, &worker));
        run.approved = true;
        run.args.threads = 16;
        assert!(!eligible(&run, &worker));
        run.args.threads = 1;
        worker.min_threads = 2;
        assert!(!eligible(&run, &worker));
    }

    #[test]
    fn memory_demand_scales_with_engine_pairs() {
        let mut run = fixtures::sprt_run(4);
        run.args.new_options = "Hash=64".to_string();
        run.args.base_options = "Hash=64".to_string();
        let mut worker = fixtures::worker("alice", "10.0.0.1");
        worker.concurrency = 8;
        // eight single-threaded pairs at 128 MiB each
        assert_eq!(tt_demand(&run, &worker), 1024);
        worker.max_memory = 512;
        assert!(!eligible(&run, &worker));
        worker.max_memory = 2048;
        assert!(eligible(&run, &worker));
        // workers that do not announce memory skip the check
        worker.max_memory = 0;
        assert!(eligible(&run, &worker));
    }

    #[test]
    fn sort_prefers_priority_then_starvation() {
        let mut starved = fixtures::run(StopRule::Games, 400);
        starved.id = 1;
        starved.calc_itp();
        let mut served = fixtures::run(StopRule::Games, 400);
        served.id = 2;
        served.calc_itp();
        served.cores = 64;
        let mut urgent = fixtures::run(StopRule::Games, 400);
        urgent.id = 3;
        urgent.args.priority = 10;
        urgent.calc_itp();
        urgent.cores = 512;
        let mut candidates = [served, starved, urgent]
            .into_iter()
            .map(|r| (r.id, Arc::new(Mutex::new(r))))
            .collect::<Vec<_>>();
        sort(&mut candidates);
        let order = candidates.iter().map(|(id, _)| *id).collect::<Vec<_>>();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn equal_runs_sort_by_id() {
        let mut a = fixtures::run(StopRule::Games, 400);
        a.id = 9;
        a.calc_itp();
        let mut b = fixtures::run(StopRule::Games, 400);
        b.id = 4;
        b.calc_itp();
        let mut candidates = [a, b]
            .into_iter()
            .map(|r| (r.id, Arc::new(Mutex::new(r))))
            .collect::<Vec<_>>();
        sort(&mut candidates);
        assert_eq!(candidates[0].0, 4);
    }
}
