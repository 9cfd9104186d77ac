use crate::Probability;

/// 97.5% quantile of the standard normal law
pub const Z95: f64 = 1.959963984540054;

/// error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7)
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

pub fn erfc(x: f64) -> f64 {
    1.0 - erf(x)
}

/// cumulative distribution function of the standard normal law
pub fn phi(q: f64) -> Probability {
    0.5 * (1.0 + erf(q / std::f64::consts::SQRT_2))
}

/// survival function of the chi-square law with `dof` degrees of freedom.
///
/// Exact finite series for even dof; erfc-based closed form for odd dof.
/// Contingency tables over the three game outcomes always yield an even
/// dof, the odd branch covers reduced tables.
pub fn chi2_sf(x: f64, dof: u64) -> Probability {
    if x <= 0.0 || dof == 0 {
        return 1.0;
    }
    if dof % 2 == 0 {
        let mut term = (-x / 2.0).exp();
        let mut sum = 0.0;
        for i in 0..dof / 2 {
            sum += term;
            term *= (x / 2.0) / (i as f64 + 1.0);
        }
        sum
    } else {
        let mut sum = erfc((x / 2.0).sqrt());
        let mut term = (2.0 * x / std::f64::consts::PI).sqrt() * (-x / 2.0).exp();
        for i in 0..dof / 2 {
            sum += term;
            term *= x / (2 * i + 3) as f64;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phi_at_zero() {
        assert!((phi(0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn phi_at_z95() {
        assert!((phi(Z95) - 0.975).abs() < 1e-6);
        assert!((phi(-Z95) - 0.025).abs() < 1e-6);
    }

    #[test]
    fn phi_is_monotone() {
        assert!(phi(-1.0) < phi(0.0));
        assert!(phi(0.0) < phi(1.0));
        assert!((phi(-1.0) - 0.158655).abs() < 1e-5);
    }

    #[test]
    fn chi2_critical_values() {
        // textbook 5% critical values
        assert!((chi2_sf(3.841458820694124, 1) - 0.05).abs() < 1e-6);
        assert!((chi2_sf(5.991464547107979, 2) - 0.05).abs() < 1e-9);
        assert!((chi2_sf(18.30703805327515, 10) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn chi2_edges() {
        assert_eq!(chi2_sf(0.0, 4), 1.0);
        assert!(chi2_sf(1e3, 4) < 1e-100);
    }
}
