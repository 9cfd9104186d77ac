use crate::Elo;
use crate::Llr;
use crate::Probability;
use crate::Score;

/// expected score of the candidate at a logistic elo difference
pub fn score(elo: Elo) -> Score {
    1.0 / (1.0 + 10f64.powf(-elo / 400.0))
}

/// mix in a small prior so empty bins do not break the likelihood
pub fn regularize(frequencies: &[f64]) -> Vec<f64> {
    frequencies
        .iter()
        .map(|&f| if f == 0.0 { crate::REGULARIZER } else { f })
        .collect()
}

/// empirical pdf over the ascending half-point score support {i/(n-1)}
fn pdf(frequencies: &[f64]) -> (f64, Vec<(Score, Probability)>) {
    let n = frequencies.iter().sum::<f64>();
    let l = frequencies.len();
    let pdf = frequencies
        .iter()
        .enumerate()
        .map(|(i, &f)| (i as f64 / (l - 1) as f64, f / n))
        .collect();
    (n, pdf)
}

/// mean and variance of a discrete distribution
fn moments(pdf: &[(Score, Probability)]) -> (f64, f64) {
    let mu = pdf.iter().map(|(v, p)| p * v).sum::<f64>();
    let var = pdf.iter().map(|(v, p)| p * (v - mu).powi(2)).sum::<f64>();
    (mu, var)
}

/// Generalized log-likelihood ratio for H1: elo = elo1 against H0: elo = elo0,
/// both in logistic elo, over an observed frequency vector of length 3
/// (losses, draws, wins) or 5 (pentanomial, ascending pair score).
///
/// Uses the Brownian-approximation form N * (s1-s0)(2*mu-s0-s1) / (2*var),
/// which agrees with the exact multinomial MLE ratio to well within the
/// sequential test's resolution.
pub fn logistic(elo0: Elo, elo1: Elo, frequencies: &[f64]) -> Llr {
    let s0 = score(elo0);
    let s1 = score(elo1);
    let ref frequencies = regularize(frequencies);
    let (n, pdf) = pdf(frequencies);
    let (mu, var) = moments(&pdf);
    n * (s1 - s0) * (2.0 * mu - s0 - s1) / var / 2.0
}

/// logistic elo of a score, clamped away from the poles
pub fn elo(score: Score) -> Elo {
    let x = score.clamp(crate::SCORE_EPSILON, 1.0 - crate::SCORE_EPSILON);
    -400.0 * (1.0 / x - 1.0).log10()
}

/// win/loss probabilities of a BayesElo strength at a given drawelo
fn bayeselo_to_proba(elo: Elo, drawelo: Elo) -> (Probability, Probability) {
    let win = 1.0 / (1.0 + 10f64.powf((-elo + drawelo) / 400.0));
    let loss = 1.0 / (1.0 + 10f64.powf((elo + drawelo) / 400.0));
    (win, loss)
}

/// empirical drawelo of a regularized (losses, draws, wins) trinomial
pub fn drawelo(frequencies: &[f64]) -> Elo {
    let n = frequencies.iter().sum::<f64>();
    let p0 = frequencies[0] / n;
    let p2 = frequencies[2] / n;
    200.0 * ((1.0 - p0) / p0 * (1.0 - p2) / p2).log10()
}

/// map a BayesElo bound to logistic elo at the empirical drawelo
pub fn bayeselo_to_logistic(bayeselo: Elo, drawelo: Elo) -> Elo {
    let (win, loss) = bayeselo_to_proba(bayeselo, drawelo);
    let draw = 1.0 - win - loss;
    elo(win + 0.5 * draw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PENTA: [f64; 5] = [10789.0, 19328.0, 33806.0, 19402.0, 10543.0];
    const TRI: [f64; 3] = [65804.0, 56553.0, 65388.0];

    #[test]
    fn reference_pentanomial() {
        assert!((logistic(-3.0, 1.0, &PENTA) - 2.1312448707048293).abs() < 1e-6);
    }

    #[test]
    fn reference_trinomial() {
        assert!((logistic(-3.0, 1.0, &TRI) - 2.0488098804755284).abs() < 1e-6);
    }

    #[test]
    fn antisymmetric_in_hypotheses() {
        let forward = logistic(0.0, 5.0, &PENTA);
        let backward = logistic(5.0, 0.0, &PENTA);
        assert!((forward + backward).abs() < 1e-9);
    }

    #[test]
    fn empty_results_are_neutral() {
        assert!(logistic(0.0, 5.0, &[0.0; 5]).abs() < 1e-5);
    }

    #[test]
    fn score_endpoints() {
        assert!((score(0.0) - 0.5).abs() < 1e-12);
        assert!(score(400.0) > 0.9);
        assert!((score(5.0) + score(-5.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bayeselo_mapping() {
        let ref tri = regularize(&[13624.0, 34333.0, 13543.0]);
        let de = drawelo(tri);
        assert!((de - 218.9900704842353).abs() < 1e-6);
        assert!(bayeselo_to_logistic(0.0, de).abs() < 1e-9);
        let ref tri = regularize(&TRI);
        let de = drawelo(tri);
        assert!((de - 108.00564495997543).abs() < 1e-6);
        assert!((bayeselo_to_logistic(5.0, de) - 4.546351480567138).abs() < 1e-6);
    }

    #[test]
    fn elo_clamps_extreme_scores() {
        assert!(elo(1.0).is_finite());
        assert!(elo(0.0).is_finite());
        assert!(elo(0.5).abs() < 1e-12);
    }
}
