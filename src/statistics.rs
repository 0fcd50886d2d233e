use crate::error::{CallerError, Result};
use statrs::distribution::{Discrete, Poisson};
use statrs::function::factorial::ln_factorial;
use statrs::function::gamma::ln_gamma;

const MIN_MEAN: f64 = 0.1;
const MIN_CLUMPING_ADJUSTED: f64 = 6.0;
const MIN_CLUMPING: f64 = 2.0;

/// Negative binomial probability mass over 0..max_value parameterized by mean and variance.
///
/// The clumping parameter r = mean² / (variance - mean) is computed with the mean
/// floored at 0.1 and the variance floored at 1.2 × mean, then floored at 6
/// (`adjust_clumping`) or 2. Non-finite densities are stored as 0; a
/// non-positive mean is a point mass at 0.
pub fn negative_binomial_density(
    mean: f64,
    variance: f64,
    max_value: usize,
    adjust_clumping: bool,
) -> Vec<f64> {
    if mean <= 0.0 {
        let mut point_mass = vec![0.0; max_value];
        if let Some(first) = point_mass.first_mut() {
            *first = 1.0;
        }
        return point_mass;
    }

    let min_clumping = if adjust_clumping {
        MIN_CLUMPING_ADJUSTED
    } else {
        MIN_CLUMPING
    };
    let r = (mean.max(MIN_MEAN).powi(2) / (variance.max(mean * 1.2) - mean)).max(min_clumping);

    let log_base = -r * (1.0 + mean / r).ln();
    let ln_success = (mean / (mean + r)).ln();
    let ln_gamma_r = ln_gamma(r);

    (0..max_value)
        .map(|x| {
            let density = (log_base + x as f64 * ln_success + ln_gamma(r + x as f64)
                - ln_factorial(x as u64)
                - ln_gamma_r)
                .exp();
            finite_or_zero(density)
        })
        .collect()
}

/// Copy-number transition matrix T[parent_cn][transmitted].
///
/// Row 0 is a point mass at 0. Rows cn >= 1 hold Poisson(max(cn/2, 0.1)) mass
/// truncated to the state range, modelling segregation of one parental copy.
pub fn transition_matrix(num_states: usize) -> Result<Vec<Vec<f64>>> {
    let mut matrix = vec![vec![0.0; num_states]; num_states];
    if num_states == 0 {
        return Ok(matrix);
    }
    matrix[0][0] = 1.0;

    for (cn, row) in matrix.iter_mut().enumerate().skip(1) {
        let lambda = (cn as f64 / 2.0).max(MIN_MEAN);
        let poisson = Poisson::new(lambda).map_err(|e| {
            CallerError::invalid_parameter(format!("Poisson rate {} rejected: {}", lambda, e))
        })?;
        for (gt, value) in row.iter_mut().enumerate() {
            *value = poisson.pmf(gt as u64);
        }
    }
    Ok(matrix)
}

/// Phred-scaled confidence that `selected` is the correct choice out of `total` mass.
///
/// `-10 log10((total - selected) / total)`, capped at `max_score`; undefined
/// values (no mass at all) score 0.
pub fn phred_quality(total: f64, selected: f64, max_score: f64) -> f64 {
    let score = -10.0 * ((total - selected) / total).log10();
    if score.is_nan() {
        0.0
    } else if score > max_score {
        max_score
    } else {
        score.max(0.0)
    }
}

/// NaN and infinite likelihoods never win a max-likelihood comparison.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Sample variance (n - 1 denominator); 0 for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_negative_binomial_sums_to_one() {
        let density = negative_binomial_density(40.0, 100.0, 500, true);
        let total: f64 = density.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_negative_binomial_mode_near_mean() {
        let density = negative_binomial_density(100.0, 250.0, 400, true);
        let mode = density
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert!((95..=100).contains(&mode), "mode {}", mode);
    }

    #[test]
    fn test_negative_binomial_zero_mean_is_point_mass() {
        let density = negative_binomial_density(0.0, 10.0, 20, false);
        assert_relative_eq!(density[0], 1.0, epsilon = 1e-12);
        assert!(density[1..].iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_transition_matrix_rows() {
        let matrix = transition_matrix(5).unwrap();
        assert_eq!(matrix.len(), 5);
        assert_relative_eq!(matrix[0].iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_eq!(matrix[0][0], 1.0);
        for row in &matrix[1..] {
            let total: f64 = row.iter().sum();
            assert!(total > 0.9 && total <= 1.0 + 1e-12, "row sum {}", total);
        }
        // Poisson(0.5) at 0
        assert_relative_eq!(matrix[1][0], (-0.5f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_phred_quality_clamps() {
        assert_relative_eq!(phred_quality(1.0, 0.9, 60.0), 10.0, epsilon = 1e-9);
        assert_eq!(phred_quality(1.0, 1.0, 60.0), 60.0);
        assert_eq!(phred_quality(0.0, 0.0, 60.0), 0.0);
    }

    #[test]
    fn test_finite_or_zero() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(0.25), 0.25);
    }

    #[test]
    fn test_sample_variance() {
        assert_relative_eq!(sample_variance(&[1.0, 2.0, 3.0, 4.0]), 5.0 / 3.0, epsilon = 1e-12);
        assert_eq!(sample_variance(&[7.0]), 0.0);
    }
}
