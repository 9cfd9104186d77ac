use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clipping {
    Old,
    Careful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rounding {
    Deterministic,
    Randomized,
}

/// one tuned engine parameter with its gain schedule constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub start: f64,
    pub min: f64,
    pub max: f64,
    pub c_end: f64,
    pub r_end: f64,
    pub a: f64,
    pub c: f64,
    pub theta: f64,
}

/// perturbed value issued to the candidate side of a game pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perturbed {
    pub name: String,
    pub value: f64,
    pub r: f64,
    pub c: f64,
    pub flip: i8,
}

/// name/value pair for the baseline side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub name: String,
    pub value: f64,
}

/// both sides of an antithetic perturbation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issued {
    pub w_params: Vec<Perturbed>,
    pub b_params: Vec<Anchor>,
}

/// snapshot of one parameter's trajectory for the sampled history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub theta: f64,
    pub r: f64,
    pub c: f64,
}

/// Simultaneous Perturbation Stochastic Approximation state for one run.
///
/// Each worker evaluates an antithetic pair theta ± c_k * flip and reports
/// the net pair result; theta then steps along the estimated gradient with
/// gain a_k. Gains decay per the usual schedules c_k = c/(k+1)^gamma and
/// a_k = a/(A+k+1)^alpha.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spsa {
    pub a_cap: f64,
    pub alpha: f64,
    pub gamma: f64,
    pub raw_params: String,
    pub iter: u64,
    pub num_iter: u64,
    pub clipping: Clipping,
    pub rounding: Rounding,
    pub params: Vec<Param>,
    pub param_history: Vec<Vec<Trace>>,
}

impl Spsa {
    /// Parse raw CSV parameter lines `name,start,min,max,c_end,r_end` and
    /// derive the gain constants against the target iteration count.
    pub fn parse(
        raw: &str,
        a_cap: f64,
        alpha: f64,
        gamma: f64,
        num_iter: u64,
        clipping: Clipping,
        rounding: Rounding,
    ) -> anyhow::Result<Self> {
        let mut params = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields = line.split(',').map(str::trim).collect::<Vec<_>>();
            if fields.len() != 6 {
                anyhow::bail!("\"{}\" needs 6 parameters", line);
            }
            let start = fields[1].parse::<f64>()?;
            let min = fields[2].parse::<f64>()?;
            let max = fields[3].parse::<f64>()?;
            let c_end = fields[4].parse::<f64>()?;
            let r_end = fields[5].parse::<f64>()?;
            let c = c_end * (num_iter as f64).powf(gamma);
            let a = r_end * c_end * c_end * (a_cap + num_iter as f64).powf(alpha);
            params.push(Param {
                name: fields[0].to_string(),
                start,
                min,
                max,
                c_end,
                r_end,
                a,
                c,
                theta: start,
            });
        }
        if params.is_empty() {
            anyhow::bail!("no tuning parameters given");
        }
        Ok(Self {
            a_cap,
            alpha,
            gamma,
            raw_params: raw.to_string(),
            iter: 0,
            num_iter,
            clipping,
            rounding,
            params,
            param_history: Vec::new(),
        })
    }

    /// Clip an increment against the parameter bounds. The careful policy
    /// limits the step to half the distance to the approached bound and
    /// bounces off the boundary old-style when that limit hits zero.
    fn clip(param: &Param, increment: f64, clipping: Clipping) -> f64 {
        match clipping {
            Clipping::Old => (param.theta + increment).clamp(param.min, param.max),
            Clipping::Careful => {
                let limit = increment
                    .abs()
                    .min((param.theta - param.min).abs() / 2.0)
                    .min((param.theta - param.max).abs() / 2.0);
                if limit > 0.0 {
                    param.theta + limit * increment.signum()
                } else {
                    (param.theta + increment).clamp(param.min, param.max)
                }
            }
        }
    }

    /// Round an issued engine value. Deterministic rounding is the worker's
    /// job, so the value passes through; randomized rounding floors against
    /// a uniform draw, which is unbiased in expectation.
    fn round<R: Rng>(value: f64, rounding: Rounding, rng: &mut R) -> f64 {
        match rounding {
            Rounding::Deterministic => value,
            Rounding::Randomized => (value + rng.random::<f64>()).floor(),
        }
    }

    /// Issue a fresh antithetic perturbation for the next iteration.
    pub fn issue<R: Rng>(&self, rng: &mut R) -> Issued {
        // assume at least one completed iteration, avoiding the k=0 pole
        let k = (self.iter + 1) as f64;
        let mut w_params = Vec::new();
        let mut b_params = Vec::new();
        for param in self.params.iter() {
            let c_k = param.c / k.powf(self.gamma);
            let r_k = param.a / (self.a_cap + k).powf(self.alpha) / (c_k * c_k);
            let flip = if rng.random::<bool>() { 1i8 } else { -1i8 };
            let delta = c_k * flip as f64;
            w_params.push(Perturbed {
                name: param.name.clone(),
                value: Self::round(Self::clip(param, delta, self.clipping), self.rounding, rng),
                r: r_k,
                c: c_k,
                flip,
            });
            b_params.push(Anchor {
                name: param.name.clone(),
                value: Self::round(Self::clip(param, -delta, self.clipping), self.rounding, rng),
            });
        }
        Issued { w_params, b_params }
    }

    /// Fold a worker's pair results into theta and advance the iteration
    /// counter. Wins and losses are counted from the perturbed (w) side.
    pub fn absorb(&mut self, issued: &[Perturbed], wins: u64, losses: u64, num_games: u64) {
        self.iter += num_games / 2;
        let grow = self.history_has_room();
        let result = wins as f64 - losses as f64;
        let mut traces = Vec::new();
        for (param, w) in self.params.iter_mut().zip(issued.iter()) {
            let step = w.r * w.c * result * w.flip as f64;
            param.theta = Self::clip(param, step, self.clipping);
            if grow {
                traces.push(Trace {
                    theta: param.theta,
                    r: w.r,
                    c: w.c,
                });
            }
        }
        if grow {
            self.param_history.push(traces);
        }
    }

    /// History is sampled every `freq` iterations; more parameters mean a
    /// lower frequency so the stored volume stays constant.
    fn history_freq(&self) -> u64 {
        (crate::SPSA_HISTORY_PER_PARAM * self.params.len() as u64).max(crate::SPSA_HISTORY_MIN_FREQ)
    }

    fn history_has_room(&self) -> bool {
        let freq = self.history_freq() as f64;
        let cap = (crate::SPSA_HISTORY_BUDGET / freq).min(self.iter as f64 / freq);
        (self.param_history.len() as f64) < cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn spsa() -> Spsa {
        Spsa::parse(
            "KingValue,100,0,200,4,0.002",
            1000.0,
            0.602,
            0.101,
            10_000,
            Clipping::Old,
            Rounding::Deterministic,
        )
        .unwrap()
    }

    #[test]
    fn gain_constants() {
        let s = spsa();
        let p = &s.params[0];
        assert!((p.c - 10.140514521991632).abs() < 1e-9);
        assert!((p.a - 8.67098379907045).abs() < 1e-9);
        assert_eq!(p.theta, 100.0);
    }

    #[test]
    fn parse_rejects_short_lines() {
        assert!(Spsa::parse("Bad,1,2,3", 10.0, 0.602, 0.101, 100, Clipping::Old, Rounding::Deterministic).is_err());
        assert!(Spsa::parse("", 10.0, 0.602, 0.101, 100, Clipping::Old, Rounding::Deterministic).is_err());
    }

    #[test]
    fn issue_is_antithetic() {
        let s = spsa();
        let ref mut rng = SmallRng::seed_from_u64(7);
        let issued = s.issue(rng);
        let w = &issued.w_params[0];
        let b = &issued.b_params[0];
        assert!((w.c - 10.140514521991632).abs() < 1e-9);
        assert!((w.r - 0.0013173072362006617).abs() < 1e-9);
        let delta = w.c * w.flip as f64;
        assert!((w.value - (100.0 + delta)).abs() < 1e-9);
        assert!((b.value - (100.0 - delta)).abs() < 1e-9);
    }

    #[test]
    fn absorb_steps_theta_and_iter() {
        let mut s = spsa();
        let issued = vec![Perturbed {
            name: "KingValue".to_string(),
            value: 110.14,
            r: 0.0013173072362006617,
            c: 10.140514521991632,
            flip: 1,
        }];
        s.absorb(&issued, 6, 4, 10);
        assert_eq!(s.iter, 5);
        assert!((s.params[0].theta - 100.02671634631723).abs() < 1e-9);
    }

    #[test]
    fn old_clipping_saturates() {
        let mut p = spsa().params.remove(0);
        p.theta = 195.0;
        assert_eq!(Spsa::clip(&p, 20.0, Clipping::Old), 200.0);
        p.theta = 3.0;
        assert_eq!(Spsa::clip(&p, -20.0, Clipping::Old), 0.0);
    }

    #[test]
    fn careful_clipping_halves_the_approach() {
        let mut p = spsa().params.remove(0);
        p.theta = 1.0;
        // half the distance to the lower bound
        assert!((Spsa::clip(&p, -3.0, Clipping::Careful) - 0.5).abs() < 1e-12);
        // zero room: bounce off the boundary old-style
        p.theta = 0.0;
        assert_eq!(Spsa::clip(&p, -3.0, Clipping::Careful), 0.0);
    }

    #[test]
    fn randomized_rounding_is_unbiased() {
        let ref mut rng = SmallRng::seed_from_u64(42);
        let v = 4.3;
        let n = 100_000;
        let sum = (0..n)
            .map(|_| Spsa::round(v, Rounding::Randomized, rng))
            .sum::<f64>();
        let mean = sum / n as f64;
        assert!((mean - v).abs() < 0.01);
        let rounded = Spsa::round(v, Rounding::Randomized, rng);
        assert!(rounded == 4.0 || rounded == 5.0);
    }

    #[test]
    fn history_sampling_is_rate_limited() {
        let mut s = spsa();
        let issued = s.issue(&mut SmallRng::seed_from_u64(1)).w_params;
        // freq = max(100, 25) = 100, cap = min(250000/freq, iter/freq)
        s.absorb(&issued, 3, 2, 10);
        assert_eq!(s.param_history.len(), 1);
        s.absorb(&issued, 3, 2, 10);
        assert_eq!(s.param_history.len(), 1);
        s.iter = 500;
        s.absorb(&issued, 3, 2, 10);
        assert_eq!(s.param_history.len(), 2);
    }
}
