use super::gauss;
use super::llr;
use crate::Elo;
use crate::Probability;

/// point estimate with a 95% interval, for fixed-length runs and display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub elo: Elo,
    pub elo95: Elo,
    pub los: Probability,
}

/// per-game score moments of a frequency vector over the ascending
/// half-point support (trinomial or pentanomial)
fn moments(frequencies: &[f64]) -> (f64, f64, f64) {
    let l = frequencies.len();
    let n = frequencies.iter().sum::<f64>();
    let games = n * (l - 1) as f64 / 2.0;
    let mu = frequencies
        .iter()
        .enumerate()
        .map(|(i, &f)| f * i as f64 / 2.0)
        .sum::<f64>()
        / games;
    let mu_record = (l - 1) as f64 / 2.0 * mu;
    let var = frequencies
        .iter()
        .enumerate()
        .map(|(i, &f)| f * (i as f64 / 2.0 - mu_record).powi(2))
        .sum::<f64>()
        / games;
    (games, mu, var)
}

/// elo, symmetric 95% interval and likelihood of superiority
pub fn estimate(frequencies: &[f64]) -> Estimate {
    let ref frequencies = llr::regularize(frequencies);
    let (games, mu, var) = moments(frequencies);
    let stdev = var.sqrt();
    let lo = mu - gauss::Z95 * stdev / games.sqrt();
    let hi = mu + gauss::Z95 * stdev / games.sqrt();
    Estimate {
        elo: llr::elo(mu),
        elo95: (llr::elo(hi) - llr::elo(lo)) / 2.0,
        los: gauss::phi((mu - 0.5) / (stdev / games.sqrt())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_pentanomial() {
        let e = estimate(&[10789.0, 19328.0, 33806.0, 19402.0, 10543.0]);
        assert!((e.elo - -0.7735773359165423).abs() < 1e-6);
        assert!((e.elo95 - 1.2775798957280218).abs() < 1e-6);
        assert!((e.los - 0.11765885803277504).abs() < 1e-5);
    }

    #[test]
    fn reference_trinomial() {
        // 50 wins, 30 losses, 40 draws, ascending (l, d, w)
        let e = estimate(&[30.0, 40.0, 50.0]);
        assert!((e.elo - 58.45121427129523).abs() < 1e-6);
        assert!((e.elo95 - 51.512405991999486).abs() < 1e-6);
        assert!((e.los - 0.9888189635733637).abs() < 1e-5);
    }

    #[test]
    fn balanced_results_are_even_money() {
        let e = estimate(&[100.0, 100.0, 100.0]);
        assert!(e.elo.abs() < 1e-9);
        assert!((e.los - 0.5).abs() < 1e-9);
    }
}
