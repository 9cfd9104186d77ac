mod lifecycle;
mod sessions;
mod update;

pub use sessions::Sessions;
pub use update::SpsaReport;

use crate::RunId;
use crate::Seconds;
use crate::notify::Notify;
use crate::run::Run;
use crate::run::RunArgs;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// one cached run with its read/flush bookkeeping
#[derive(Clone)]
struct CacheLine {
    run: Arc<Mutex<Run>>,
    rtime: Seconds,
    ftime: Seconds,
    dirty: bool,
}

/// lazily created per-run update locks, garbage collected once the book
/// grows past the churn threshold
struct LockBook {
    map: HashMap<RunId, (Arc<tokio::sync::Mutex<()>>, Seconds)>,
    churn: usize,
}

/// Owner of all run documents: a write-through cache over the store with
/// a coalescing flush, plus the run lifecycle operations built on it.
///
/// The cache map lock and the per-run document locks are held only across
/// CPU-bound sections; persistence clones the document under its lock and
/// writes the snapshot without it, serialized against batch reads by the
/// write lock.
pub struct RunRegistry {
    store: Store,
    notify: Arc<dyn Notify>,
    cache: Mutex<HashMap<RunId, CacheLine>>,
    write_lock: tokio::sync::Mutex<()>,
    locks: Mutex<LockBook>,
    sessions: Sessions,
    epoch: Arc<AtomicU64>,
}

impl RunRegistry {
    pub fn new(store: Store, notify: Arc<dyn Notify>, epoch: Arc<AtomicU64>) -> Arc<Self> {
        Arc::new(Self {
            store,
            notify,
            cache: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
            locks: Mutex::new(LockBook {
                map: HashMap::new(),
                churn: 0,
            }),
            sessions: Sessions::default(),
            epoch,
        })
    }

    /// invalidate the dispatcher's candidate cache
    pub fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::Relaxed);
    }

    /// spawn the coalescing flush timer and the background scavenger
    pub fn start(self: &Arc<Self>) {
        let registry = self.clone();
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs_f64(crate::FLUSH_INTERVAL);
            let mut clock = tokio::time::interval(period);
            clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                clock.tick().await;
                registry.flush_tick().await;
            }
        });
        let registry = self.clone();
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(crate::SCAVENGE_PERIOD);
            let mut clock = tokio::time::interval(period);
            clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                clock.tick().await;
                registry.scavenge_all();
            }
        });
    }

    /// validate, materialize and cache a new run
    pub async fn create(&self, args: RunArgs) -> anyhow::Result<RunId> {
        args.validate()?;
        let mut run = Run::new(args, crate::now());
        let id = self.store.insert_run(&mut run).await?;
        let line = CacheLine {
            run: Arc::new(Mutex::new(run)),
            rtime: crate::now(),
            ftime: crate::now(),
            dirty: false,
        };
        self.cache.lock().unwrap().insert(id, line);
        log::info!("created run {}", id);
        Ok(id)
    }

    /// write-through cached lookup
    pub async fn get(&self, id: RunId) -> anyhow::Result<Arc<Mutex<Run>>> {
        if let Some(line) = self.cache.lock().unwrap().get_mut(&id) {
            line.rtime = crate::now();
            return Ok(line.run.clone());
        }
        let run = {
            let _write = self.write_lock.lock().await;
            self.store
                .load_run(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown run {}", id))?
        };
        let mut cache = self.cache.lock().unwrap();
        let line = cache.entry(id).or_insert_with(|| CacheLine {
            run: Arc::new(Mutex::new(run)),
            rtime: crate::now(),
            ftime: crate::now(),
            dirty: false,
        });
        line.rtime = crate::now();
        Ok(line.run.clone())
    }

    /// unfinished run ids, serialized against persistence writes so the
    /// scan cannot tear
    pub async fn unfinished_runs(&self) -> anyhow::Result<Vec<RunId>> {
        let _write = self.write_lock.lock().await;
        Ok(self.store.unfinished_runs().await?)
    }

    /// Mark a run dirty, or persist it synchronously. Synchronous writes
    /// are durable before returning; deferred ones ride the 1s flush.
    pub async fn buffer(&self, run: &Arc<Mutex<Run>>, flush: bool) {
        let id = run.lock().unwrap().id;
        {
            let mut cache = self.cache.lock().unwrap();
            let line = cache.entry(id).or_insert_with(|| CacheLine {
                run: run.clone(),
                rtime: crate::now(),
                ftime: crate::now(),
                dirty: false,
            });
            line.rtime = crate::now();
            if flush {
                line.dirty = false;
                line.ftime = crate::now();
            } else {
                line.dirty = true;
            }
        }
        if flush {
            let snapshot = run.lock().unwrap().clone();
            self.persist(snapshot).await;
        }
    }

    /// write one snapshot, re-marking it dirty on a transient store error
    async fn persist(&self, snapshot: Run) {
        let _write = self.write_lock.lock().await;
        if let Err(e) = self.store.replace_run(&snapshot).await {
            log::error!("persisting run {} failed: {}", snapshot.id, e);
            if let Some(line) = self.cache.lock().unwrap().get_mut(&snapshot.id) {
                line.dirty = true;
            }
        }
    }

    /// One flush cycle: evict idle clean entries, persist the oldest dirty
    /// run, and scavenge it when the minute boundary comes around.
    async fn flush_tick(&self) {
        let now = crate::now();
        let oldest = {
            let mut cache = self.cache.lock().unwrap();
            cache.retain(|_, line| line.dirty || line.rtime >= now - crate::CACHE_IDLE_EVICT);
            let oldest = cache
                .iter()
                .filter(|(_, line)| line.dirty)
                .min_by(|(_, a), (_, b)| a.ftime.total_cmp(&b.ftime))
                .map(|(&id, line)| (id, line.run.clone()));
            if let Some((id, _)) = &oldest {
                let line = cache.get_mut(id).expect("entry just found");
                line.dirty = false;
                line.ftime = now;
            }
            oldest
        };
        let Some((_, run)) = oldest else {
            return;
        };
        if now as u64 % crate::SCAVENGE_PERIOD == 0 {
            let evicted = run.lock().unwrap().scavenge(now);
            if evicted > 0 {
                log::info!("scavenged {} stale tasks", evicted);
                self.bump();
            }
        }
        let snapshot = run.lock().unwrap().clone();
        self.persist(snapshot).await;
    }

    /// best-effort flush of every dirty run, for shutdown
    pub async fn flush_all(&self) {
        log::info!("flushing all dirty runs");
        let dirty = {
            let mut cache = self.cache.lock().unwrap();
            cache
                .values_mut()
                .filter(|line| line.dirty)
                .map(|line| {
                    line.dirty = false;
                    line.run.clone()
                })
                .collect::<Vec<_>>()
        };
        for run in dirty {
            let snapshot = run.lock().unwrap().clone();
            self.persist(snapshot).await;
        }
    }

    /// stale-activation sweep over every cached run
    pub fn scavenge_all(&self) {
        let now = crate::now();
        let runs = self
            .cache
            .lock()
            .unwrap()
            .values()
            .map(|line| line.run.clone())
            .collect::<Vec<_>>();
        let evicted = runs
            .iter()
            .map(|run| run.lock().unwrap().scavenge(now))
            .sum::<usize>();
        if evicted > 0 {
            log::info!("scavenged {} stale tasks", evicted);
            self.bump();
        }
    }

    /// per-run update lock, garbage collecting the book as it churns
    pub fn run_lock(&self, id: RunId) -> Arc<tokio::sync::Mutex<()>> {
        let now = crate::now();
        let mut book = self.locks.lock().unwrap();
        book.churn += 1;
        if book.churn > crate::LOCK_GC_COUNT {
            let horizon = now - crate::LOCK_GC_AGE;
            book.map.retain(|_, (_, time)| *time >= horizon);
            book.churn = 0;
        }
        let (lock, time) = book
            .map
            .entry(id)
            .or_insert_with(|| (Arc::new(tokio::sync::Mutex::new(())), now));
        *time = now;
        lock.clone()
    }
}
