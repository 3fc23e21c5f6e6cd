// ============================================================================
// Normal distribution and linear algebra helpers for the simulation
// ============================================================================

/// Inverse standard normal CDF (Acklam's rational approximation,
/// relative error below 1.2e-9).
pub fn norm_inv(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let a = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    let b = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    let c = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    let d = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    let p_low = 0.02425;
    let p_high = 1.0 - p_low;

    let tail = |q: f64| {
        (((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    };

    if p < p_low {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((a[0] * r + a[1]) * r + a[2]) * r + a[3]) * r + a[4]) * r + a[5]) * q
            / (((((b[0] * r + b[1]) * r + b[2]) * r + b[3]) * r + b[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Cholesky factor `L` (row-major, lower triangular) of an `n x n`
/// symmetric matrix so that `A = L * L'`.
///
/// Returns `None` when the matrix is not positive definite.
pub fn cholesky(a: &[f64], n: usize) -> Option<Vec<f64>> {
    if a.len() != n * n {
        return None;
    }
    let mut l = vec![0.0; n * n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i * n + j] = sum.sqrt();
            } else {
                let ljj = l[j * n + j];
                if ljj.abs() < 1e-12 {
                    return None;
                }
                l[i * n + j] = sum / ljj;
            }
        }
    }
    Some(l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_inv_known_quantiles() {
        assert!(norm_inv(0.5).abs() < 1e-9);
        assert!((norm_inv(0.975) - 1.959964).abs() < 1e-5);
        assert!((norm_inv(0.025) + 1.959964).abs() < 1e-5);
        assert!((norm_inv(0.001) + 3.090232).abs() < 1e-5);
        assert_eq!(norm_inv(0.0), f64::NEG_INFINITY);
        assert_eq!(norm_inv(1.0), f64::INFINITY);
    }

    /// Standard normal CDF approximation (Abramowitz and Stegun 7.1.26)
    fn norm_cdf(x: f64) -> f64 {
        let a1 = 0.254829592;
        let a2 = -0.284496736;
        let a3 = 1.421413741;
        let a4 = -1.453152027;
        let a5 = 1.061405429;
        let p = 0.3275911;

        let sign = if x < 0.0 { -1.0 } else { 1.0 };
        let z = x.abs() / 2.0_f64.sqrt();

        let t = 1.0 / (1.0 + p * z);
        let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();

        0.5 * (1.0 + sign * y)
    }

    #[test]
    fn test_norm_cdf_inverts_norm_inv() {
        for p in [0.01, 0.1, 0.3, 0.5, 0.65, 0.9, 0.99] {
            assert!((norm_cdf(norm_inv(p)) - p).abs() < 1e-6, "p={}", p);
        }
    }

    #[test]
    fn test_cholesky_two_by_two() {
        let rho = 0.5;
        let l = cholesky(&[1.0, rho, rho, 1.0], 2).unwrap();
        assert!((l[0] - 1.0).abs() < 1e-12);
        assert_eq!(l[1], 0.0);
        assert!((l[2] - rho).abs() < 1e-12);
        assert!((l[3] - (1.0 - rho * rho).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_non_positive_definite() {
        assert!(cholesky(&[1.0, 1.0, 1.0, 1.0], 2).is_none());
        assert!(cholesky(&[1.0, 0.0, 0.0], 2).is_none());
    }
}
