use serde::Deserialize;
use serde::Serialize;

/// Game tallies, per chunk and aggregated per run. The pentanomial
/// histogram counts game-pair outcomes over the ascending half-point
/// support {LL, LD+DL, LW+DD+WL, DW+WD, WW}.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    #[serde(default)]
    pub crashes: u64,
    #[serde(default)]
    pub time_losses: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pentanomial: Option<[u64; 5]>,
}

impl Stats {
    pub fn games(&self) -> u64 {
        self.wins + self.losses + self.draws
    }

    /// every pair in the pentanomial accounts for exactly two games
    pub fn coherent(&self) -> bool {
        match self.pentanomial {
            None => true,
            Some(p) => 2 * p.iter().sum::<u64>() == self.games(),
        }
    }

    /// ascending trinomial frequencies (losses, draws, wins)
    pub fn trinomial(&self) -> [f64; 3] {
        [self.losses as f64, self.draws as f64, self.wins as f64]
    }

    /// pentanomial when available, trinomial otherwise
    pub fn frequencies(&self) -> Vec<f64> {
        match self.pentanomial {
            Some(p) => p.iter().map(|&x| x as f64).collect(),
            None => self.trinomial().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pentanomial_coherence() {
        let stats = Stats {
            wins: 3,
            losses: 1,
            draws: 4,
            pentanomial: Some([0, 1, 1, 1, 1]),
            ..Default::default()
        };
        assert!(stats.coherent());
        let broken = Stats {
            wins: 4,
            ..stats.clone()
        };
        assert!(!broken.coherent());
        assert!(Stats::default().coherent());
    }

    #[test]
    fn frequencies_prefer_the_pentanomial() {
        let stats = Stats {
            wins: 3,
            losses: 1,
            draws: 4,
            pentanomial: Some([0, 1, 1, 1, 1]),
            ..Default::default()
        };
        assert_eq!(stats.frequencies().len(), 5);
        let stats = Stats {
            pentanomial: None,
            ..stats
        };
        assert_eq!(stats.frequencies(), vec![1.0, 4.0, 3.0]);
    }
}
