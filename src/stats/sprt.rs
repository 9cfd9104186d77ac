use super::llr;
use crate::Elo;
use crate::Llr;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EloModel {
    BayesElo,
    #[serde(rename = "logistic")]
    Logistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[serde(rename = "")]
    Open,
    Accepted,
    Rejected,
}

/// Dynamic overshoot bookkeeping (Siegmund, Sequential Analysis, Cor. 8.33).
/// Tracks downward and upward excursions of the LLR walk so the discrete
/// jump past each barrier can be estimated and compensated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Overshoot {
    pub last_update: u64,
    pub skipped_updates: u64,
    pub ref0: Llr,
    pub m0: f64,
    pub sq0: f64,
    pub ref1: Llr,
    pub m1: f64,
    pub sq1: f64,
}

/// Sequential probability ratio test state for one run.
///
/// H0: elo = elo0, H1: elo = elo1. alpha is the max type-I error (reached
/// at elo0), beta the max type-II error (reached at elo1). batch_size is
/// counted in game pairs; updates arrive on batch boundaries only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprt {
    pub alpha: f64,
    pub beta: f64,
    pub elo0: Elo,
    pub elo1: Elo,
    pub elo_model: EloModel,
    pub batch_size: u64,
    pub llr: Llr,
    pub state: Status,
    #[serde(default)]
    pub overshoot: Option<Overshoot>,
}

impl Sprt {
    pub fn new(alpha: f64, beta: f64, elo0: Elo, elo1: Elo, model: EloModel, batch: u64) -> Self {
        Self {
            alpha,
            beta,
            elo0,
            elo1,
            elo_model: model,
            batch_size: batch,
            llr: 0.0,
            state: Status::Open,
            overshoot: Some(Overshoot::default()),
        }
    }

    pub fn lower_bound(&self) -> Llr {
        (self.beta / (1.0 - self.alpha)).ln()
    }

    pub fn upper_bound(&self) -> Llr {
        ((1.0 - self.beta) / self.alpha).ln()
    }

    /// barrier corrections (o0, o1) from the excursion records
    pub fn margins(&self) -> (Llr, Llr) {
        match self.overshoot {
            None => (0.0, 0.0),
            Some(o) => (
                if o.m0 != 0.0 { -o.sq0 / o.m0 / 2.0 } else { 0.0 },
                if o.m1 != 0.0 { o.sq1 / o.m1 / 2.0 } else { 0.0 },
            ),
        }
    }

    /// drop the excursion record after a contract violation
    pub fn invalidate_overshoot(&mut self) {
        self.overshoot = None;
    }

    /// Re-evaluate the test over the aggregated results so far.
    ///
    /// Trinomial frequencies ascend (losses, draws, wins); the pentanomial,
    /// when present, takes precedence. Safe to call repeatedly with the same
    /// totals (old tests are recomputed this way).
    pub fn update(&mut self, wins: u64, losses: u64, draws: u64, pentanomial: Option<&[u64; 5]>) {
        let trinomial = [losses as f64, draws as f64, wins as f64];
        let (elo0, elo1) = match self.elo_model {
            EloModel::Logistic => (self.elo0, self.elo1),
            EloModel::BayesElo => {
                let ref tri = llr::regularize(&trinomial);
                let drawelo = llr::drawelo(tri);
                (
                    llr::bayeselo_to_logistic(self.elo0, drawelo),
                    llr::bayeselo_to_logistic(self.elo1, drawelo),
                )
            }
        };
        let frequencies = match pentanomial {
            Some(p) => p.iter().map(|&x| x as f64).collect::<Vec<_>>(),
            None => trinomial.to_vec(),
        };
        let samples = frequencies.iter().sum::<f64>() as u64;
        if samples % self.batch_size != 0 {
            log::warn!("sprt update off the batch grid ({} samples)", samples);
            self.overshoot = None;
        }
        self.llr = llr::logistic(elo0, elo1, &frequencies);
        self.excursion(samples);
        let (o0, o1) = self.margins();
        self.state = if self.llr < self.lower_bound() + o0 {
            Status::Rejected
        } else if self.llr > self.upper_bound() - o1 {
            Status::Accepted
        } else {
            Status::Open
        };
    }

    /// Fold one LLR observation into the excursion records. A sample count
    /// below the last one breaks the contract and removes the record; the
    /// same count is an idempotent recomputation; a jump of more than one
    /// batch resets the references and is audited as skipped.
    fn excursion(&mut self, samples: u64) {
        let llr = self.llr;
        let batch = self.batch_size;
        if let Some(o) = self.overshoot.as_ref() {
            if samples < o.last_update {
                log::warn!("sprt lost {} samples, dropping overshoot", o.last_update - samples);
                self.overshoot = None;
                return;
            }
        }
        let Some(o) = self.overshoot.as_mut() else {
            return;
        };
        if samples == o.last_update {
            return;
        }
        if samples == o.last_update + batch {
            if llr < o.ref0 {
                let delta = llr - o.ref0;
                o.m0 += delta;
                o.sq0 += delta * delta;
                o.ref0 = llr;
            }
            if llr > o.ref1 {
                let delta = llr - o.ref1;
                o.m1 += delta;
                o.sq1 += delta * delta;
                o.ref1 = llr;
            }
        } else {
            o.ref0 = llr;
            o.ref1 = llr;
            o.skipped_updates += (samples - o.last_update) - 1;
        }
        o.last_update = samples;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprt() -> Sprt {
        Sprt::new(0.05, 0.05, 0.0, 5.0, EloModel::Logistic, 4)
    }

    #[test]
    fn bounds() {
        let s = sprt();
        assert!((s.lower_bound() + 2.9444389791664403).abs() < 1e-12);
        assert!((s.upper_bound() - 2.9444389791664403).abs() < 1e-12);
    }

    #[test]
    fn accepts_after_winning_streak() {
        // one LD, one central, one DW and one WW pair per batch of four
        let mut s = sprt();
        let mut pent = [0u64; 5];
        let mut batches = 0u64;
        while s.state == Status::Open {
            for i in 1..5 {
                pent[i] += 1;
            }
            let (w, l, d) = (3 * (batches + 1), batches + 1, 4 * (batches + 1));
            s.update(w, l, d, Some(&pent));
            batches += 1;
            assert!(batches < 1000);
        }
        assert_eq!(batches, 66);
        assert_eq!(s.state, Status::Accepted);
        assert!((s.llr - 2.9516421709159966).abs() < 1e-6);
        let (o0, o1) = s.margins();
        assert_eq!(o0, 0.0);
        assert!((o1 - 0.022360926918318983).abs() < 1e-6);
    }

    #[test]
    fn same_count_is_idempotent() {
        let mut s = sprt();
        let pent = [1, 1, 1, 1, 0];
        s.update(1, 3, 4, Some(&pent));
        let first = s.clone();
        s.update(1, 3, 4, Some(&pent));
        assert_eq!(s.llr, first.llr);
        assert_eq!(s.overshoot, first.overshoot);
    }

    #[test]
    fn regression_drops_overshoot() {
        let mut s = sprt();
        s.update(3, 1, 4, Some(&[0, 1, 1, 1, 1]));
        assert!(s.overshoot.is_some());
        s.update(0, 0, 0, Some(&[0; 5]));
        assert!(s.overshoot.is_none());
    }

    #[test]
    fn skipped_batches_reset_references() {
        let mut s = sprt();
        s.update(3, 1, 4, Some(&[0, 1, 1, 1, 1]));
        s.update(9, 3, 12, Some(&[0, 3, 3, 3, 3]));
        let o = s.overshoot.unwrap();
        assert_eq!(o.last_update, 12);
        assert_eq!(o.skipped_updates, 7);
        assert_eq!(o.ref0, s.llr);
        assert_eq!(o.ref1, s.llr);
    }

    #[test]
    fn bayeselo_bounds_are_mapped() {
        let mut b = Sprt::new(0.05, 0.05, -3.0, 1.0, EloModel::BayesElo, 1);
        let mut l = Sprt::new(0.05, 0.05, -3.0, 1.0, EloModel::Logistic, 1);
        let pent = [10789, 19328, 33806, 19402, 10543];
        b.update(65388, 65804, 56553, Some(&pent));
        l.update(65388, 65804, 56553, Some(&pent));
        assert!((l.llr - 2.1312448707048293).abs() < 1e-6);
        assert!(b.llr != l.llr);
    }

    #[test]
    fn decision_is_open_before_evidence() {
        let mut s = sprt();
        s.update(3, 1, 4, Some(&[0, 1, 1, 1, 1]));
        assert_eq!(s.state, Status::Open);
    }
}
