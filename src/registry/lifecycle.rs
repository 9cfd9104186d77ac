use super::RunRegistry;
use crate::RunId;
use crate::run::Run;
use crate::run::audit;
use crate::run::format_results;

impl RunRegistry {
    /// Stop a run: tasks that never produced stats are dropped, the rest
    /// are closed out, and the run either finishes (with styling and a
    /// notification) or re-enters scheduling through the purger.
    pub async fn stop(&self, run_id: RunId) -> anyhow::Result<()> {
        self.clear_params(run_id);
        let line = self.get(run_id).await?;
        {
            let mut run = line.lock().unwrap();
            run.close_tasks();
            run.last_updated = crate::now();
        }
        self.buffer(&line, true).await;
        self.bump();
        let auto_purge = {
            let run = line.lock().unwrap();
            run.args.auto_purge && run.args.spsa().is_none()
        };
        let purged = auto_purge && self.purge(run_id).await?;
        if purged {
            {
                let mut run = line.lock().unwrap();
                let info = format_results(&run.results, &run);
                run.results_info = Some(info);
            }
            self.buffer(&line, true).await;
            log::info!("run {} re-entered scheduling after purge", run_id);
        } else {
            let announce = {
                let mut run = line.lock().unwrap();
                run.finished = true;
                run.aggregate();
                let info = format_results(&run.results, &run);
                run.is_green = info.style == Some(crate::run::Color::Green);
                run.is_yellow = info.style == Some(crate::run::Color::Yellow);
                run.results_info = Some(info.clone());
                (run.clone(), info)
            };
            self.buffer(&line, true).await;
            self.notify.finished(&announce.0, &announce.1);
            log::info!("run {} finished", run_id);
        }
        Ok(())
    }

    /// second sign-off before a run reaches the fleet; never by its author
    pub async fn approve(&self, run_id: RunId, approver: &str) -> anyhow::Result<()> {
        let line = self.get(run_id).await?;
        approve_run(&mut line.lock().unwrap(), approver)?;
        self.buffer(&line, true).await;
        self.bump();
        log::info!("run {} approved by {}", run_id, approver);
        Ok(())
    }

    /// deleted runs stop immediately and vanish from finished queries
    pub async fn delete(&self, run_id: RunId) -> anyhow::Result<()> {
        let line = self.get(run_id).await?;
        line.lock().unwrap().deleted = true;
        self.buffer(&line, true).await;
        self.stop(run_id).await
    }

    /// adjust game count, priority and throughput of a live run
    pub async fn modify(
        &self,
        run_id: RunId,
        num_games: u64,
        priority: i64,
        throughput: u64,
    ) -> anyhow::Result<()> {
        let line = self.get(run_id).await?;
        modify_run(&mut line.lock().unwrap(), num_games, priority, throughput)?;
        self.buffer(&line, true).await;
        self.bump();
        Ok(())
    }

    /// Chi-square purge: move every task of a statistically inconsistent
    /// worker into the bad pile, regenerate the lost coverage, reset the
    /// sequential state and put the run back into scheduling. Returns
    /// whether anything was purged; the caller consults it once.
    pub async fn purge(&self, run_id: RunId) -> anyhow::Result<bool> {
        let line = self.get(run_id).await?;
        let purged = purge_run(&mut line.lock().unwrap());
        if purged {
            self.buffer(&line, true).await;
            self.bump();
        }
        Ok(purged)
    }
}

/// the sign-off itself, on the run document alone
fn approve_run(run: &mut Run, approver: &str) -> anyhow::Result<()> {
    if run.args.username == approver {
        anyhow::bail!("can't approve own run");
    }
    run.approved = true;
    run.approver = approver.to_string();
    Ok(())
}

/// the adjustment itself, on the run document alone
fn modify_run(run: &mut Run, num_games: u64, priority: i64, throughput: u64) -> anyhow::Result<()> {
    if num_games > crate::MAX_CHUNKS * crate::CHUNK_SIZE {
        anyhow::bail!(
            "number of games must be <= {}",
            crate::MAX_CHUNKS * crate::CHUNK_SIZE
        );
    }
    if !(1..=500).contains(&throughput) {
        anyhow::bail!("throughput must lie in 1..=500");
    }
    if run.finished {
        anyhow::bail!("run {} is already finished", run.id);
    }
    let existing = run.tasks.iter().map(|t| t.num_games).sum::<u64>();
    if num_games < existing {
        anyhow::bail!("cannot shrink below the {} scheduled games", existing);
    }
    if num_games > existing {
        let fresh = Run::generate_tasks(num_games - existing);
        run.tasks.extend(fresh);
    }
    run.args.num_games = num_games;
    run.args.priority = priority;
    run.args.throughput = throughput;
    Ok(())
}

/// the purge itself, on the run document alone
fn purge_run(run: &mut Run) -> bool {
    let verdict = audit(&mut run.tasks);
    let (bad, kept): (Vec<_>, Vec<_>) = run
        .tasks
        .drain(..)
        .partition(|task| task.key().is_some_and(|key| verdict.bad_workers.contains(&key)));
    run.tasks = kept;
    let purged = !bad.is_empty();
    for mut task in bad {
        task.bad = true;
        run.bad_tasks.push(task);
    }
    if purged {
        log::info!(
            "purged {} worker(s) from run {}",
            verdict.bad_workers.len(),
            run.id
        );
        run.results_stale = true;
        run.aggregate();
        let played = run.games_played();
        if played < run.args.num_games {
            let fresh = Run::generate_tasks(run.args.num_games - played);
            run.tasks.extend(fresh);
        }
        run.finished = false;
        let results = run.results.clone();
        if let Some(sprt) = run.args.sprt_mut() {
            sprt.update(
                results.wins,
                results.losses,
                results.draws,
                results.pentanomial.as_ref(),
            );
            sprt.state = crate::stats::Status::Open;
        }
    }
    purged
}
