use super::gauss;
use crate::Probability;
use std::collections::HashMap;

/// outcome of the worker-homogeneity test over a run's per-worker tallies
#[derive(Debug, Clone, PartialEq)]
pub struct Homogeneity {
    pub chi2: f64,
    pub dof: u64,
    pub p: Probability,
    pub residuals: HashMap<String, f64>,
}

impl Homogeneity {
    /// not testable: too few workers or no results at all
    fn untestable() -> Self {
        Self {
            chi2: f64::NAN,
            dof: 0,
            p: f64::NAN,
            residuals: HashMap::new(),
        }
    }

    /// identical workers with respect to the test
    fn uniform(dof: u64) -> Self {
        Self {
            chi2: 0.0,
            dof,
            p: 1.0,
            residuals: HashMap::new(),
        }
    }

    pub fn suspicious(&self) -> bool {
        self.p < crate::CHI2_BAD_P
    }
}

/// Pearson chi-square test of homogeneity over per-worker (wins, losses,
/// draws) tallies, with adjusted standardized residuals per worker.
///
/// Workers whose tally is all zero are skipped. With a single contributing
/// worker the test is vacuous; with a single non-empty outcome column the
/// workers are identical with respect to the test; with exactly two
/// non-empty columns the empty one is dropped before the residuals are
/// computed (the dof keeps the full-shape value so p stays comparable
/// across runs).
pub fn homogeneity(tallies: &[(String, [f64; 3])]) -> Homogeneity {
    let observed = tallies
        .iter()
        .filter(|(_, wld)| wld.iter().any(|&x| x > 0.0))
        .map(|(key, wld)| (key.clone(), wld.to_vec()))
        .collect::<Vec<_>>();
    let rows = observed.len();
    if rows < 2 {
        return Homogeneity::untestable();
    }
    let dof = (rows as u64 - 1) * 2;
    let column_sums = (0..3)
        .map(|c| observed.iter().map(|(_, wld)| wld[c]).sum::<f64>())
        .collect::<Vec<_>>();
    let occupied = column_sums.iter().filter(|&&s| s > 0.0).count();
    match occupied {
        0 => return Homogeneity::untestable(),
        1 => return Homogeneity::uniform(dof),
        _ => {}
    }
    let keep = (0..3).filter(|&c| column_sums[c] > 0.0).collect::<Vec<_>>();
    let observed = observed
        .into_iter()
        .map(|(key, wld)| (key, keep.iter().map(|&c| wld[c]).collect::<Vec<_>>()))
        .collect::<Vec<_>>();
    let column_sums = keep.iter().map(|&c| column_sums[c]).collect::<Vec<_>>();
    let row_sums = observed
        .iter()
        .map(|(_, wld)| wld.iter().sum::<f64>())
        .collect::<Vec<_>>();
    let total = column_sums.iter().sum::<f64>();
    let mut chi2 = 0.0;
    let mut residuals = HashMap::new();
    for (r, (key, wld)) in observed.iter().enumerate() {
        let mut worst: f64 = 0.0;
        for (c, &cell) in wld.iter().enumerate() {
            let expected = row_sums[r] * column_sums[c] / total;
            let raw = cell - expected;
            chi2 += raw * raw / expected;
            let stderr =
                (expected * (1.0 - row_sums[r] / total) * (1.0 - column_sums[c] / total)).sqrt();
            worst = worst.max((raw / stderr).abs());
        }
        residuals.insert(key.clone(), worst);
    }
    Homogeneity {
        chi2,
        dof,
        p: gauss::chi2_sf(chi2, dof),
        residuals,
    }
}
