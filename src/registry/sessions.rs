use super::RunRegistry;
use super::update::SpsaReport;
use crate::RunId;
use crate::TaskId;
use crate::run::Run;
use crate::stats::Issued;
use crate::stats::Perturbed;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-worker SPSA perturbations, keyed by (run, worker unique key).
///
/// Each entry is written only by its owning worker's requests, and a
/// missing entry is regenerated, so readers get by without coordination
/// beyond the map lock. At most one feedback is lost across a restart.
#[derive(Default)]
pub struct Sessions {
    map: Mutex<HashMap<(RunId, String), Vec<Perturbed>>>,
}

impl Sessions {
    /// generate a fresh antithetic pair and remember the perturbed side
    pub fn issue(&self, run: &Run, worker_key: &str) -> Issued {
        let spsa = run.args.spsa().expect("spsa runs only");
        let issued = spsa.issue(&mut rand::rng());
        self.map.lock().unwrap().insert(
            (run.id, worker_key.to_string()),
            issued.w_params.clone(),
        );
        issued
    }

    /// the stored perturbation, or a fresh one after a restart
    pub fn consume(&self, run: &Run, worker_key: &str) -> Vec<Perturbed> {
        if let Some(params) = self
            .map
            .lock()
            .unwrap()
            .get(&(run.id, worker_key.to_string()))
        {
            return params.clone();
        }
        log::warn!("no stored spsa session for run {} worker {}", run.id, worker_key);
        match run.args.spsa() {
            Some(spsa) => spsa.issue(&mut rand::rng()).w_params,
            None => Vec::new(),
        }
    }

    /// drop every session of a stopping run
    pub fn clear(&self, run_id: RunId) {
        self.map.lock().unwrap().retain(|(id, _), _| *id != run_id);
    }
}

/// fold a worker's pair results into the run's parameter vector
pub(crate) fn fold(sessions: &Sessions, run: &mut Run, worker_key: &str, report: SpsaReport) {
    let issued = sessions.consume(run, worker_key);
    let Some(spsa) = run.args.spsa_mut() else {
        return;
    };
    if issued.len() != spsa.params.len() {
        log::warn!("spsa session shape mismatch for run {}", run.id);
        return;
    }
    spsa.absorb(&issued, report.wins, report.losses, report.num_games);
}

impl RunRegistry {
    /// hand a worker the two sides of its next tuning pair
    pub async fn request_spsa(&self, run_id: RunId, task_id: TaskId) -> anyhow::Result<Option<Issued>> {
        let line = self.get(run_id).await?;
        let run = line.lock().unwrap();
        if task_id >= run.tasks.len() || !run.tasks[task_id].assigned() {
            return Ok(None);
        }
        if run.args.spsa().is_none() {
            return Ok(None);
        }
        let key = run.tasks[task_id]
            .worker_info
            .as_ref()
            .expect("assigned tasks carry a worker")
            .unique_key
            .clone();
        Ok(Some(self.sessions.issue(&run, &key)))
    }

    /// forget every SPSA session of a run (stop path)
    pub fn clear_params(&self, run_id: RunId) {
        self.sessions.clear(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::fixtures;

    #[test]
    fn sessions_round_trip() {
        let sessions = Sessions::default();
        let mut run = fixtures::spsa_run("P,100,0,200,4,0.002", 2000);
        run.id = 7;
        let issued = sessions.issue(&run, "key-1");
        let stored = sessions.consume(&run, "key-1");
        assert_eq!(stored, issued.w_params);
        sessions.clear(7);
        // regenerated, not resurrected
        let fresh = sessions.consume(&run, "key-1");
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn clearing_one_run_spares_the_others() {
        let sessions = Sessions::default();
        let mut one = fixtures::spsa_run("P,100,0,200,4,0.002", 2000);
        one.id = 1;
        let mut two = fixtures::spsa_run("P,100,0,200,4,0.002", 2000);
        two.id = 2;
        let issued = sessions.issue(&two, "key");
        sessions.issue(&one, "key");
        sessions.clear(1);
        assert_eq!(sessions.consume(&two, "key"), issued.w_params);
    }
}
