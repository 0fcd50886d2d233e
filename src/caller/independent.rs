use super::scoring::{assign_mcc_single_sample, assign_quality, coverage_likelihood, has_allele_evidence};
use super::CallContext;
use crate::error::Result;
use crate::types::Segment;

/// Call one segment for unrelated samples.
///
/// Every sample is restricted to the copy-number combination (at most
/// `max_allele_number` distinct states) that maximizes the summed per-sample
/// best likelihood, then takes its best state within it.
pub(super) fn call_segment(context: &CallContext<'_>, segments: &mut [&mut Segment]) -> Result<()> {
    let params = context.params;
    let likelihoods: Vec<Vec<f64>> = context
        .samples
        .iter()
        .zip(segments.iter())
        .map(|(sample, segment)| coverage_likelihood(sample, segment, params))
        .collect();

    if likelihoods.len() == 1 {
        let likelihood = &likelihoods[0];
        let mut best = 0;
        for (cn, &value) in likelihood.iter().enumerate() {
            if value > likelihood[best] {
                best = cn;
            }
        }
        segments[0].set_copy_number(best);
        assign_quality(segments[0], likelihood, params);
    } else {
        let combination = best_combination(&context.space.copy_number_combinations, &likelihoods);
        for (segment, likelihood) in segments.iter_mut().zip(&likelihoods) {
            // only states of the chosen combination carry mass
            let mut restricted = vec![0.0; likelihood.len()];
            let mut best: Option<(usize, f64)> = None;
            for &cn in combination {
                restricted[cn] = likelihood[cn];
                if best.map_or(true, |(_, value)| likelihood[cn] > value) {
                    best = Some((cn, likelihood[cn]));
                }
            }
            if let Some((cn, _)) = best {
                segment.set_copy_number(cn);
            }
            assign_quality(segment, &restricted, params);
        }
    }

    if has_allele_evidence(segments, params) {
        for (sample, segment) in context.samples.iter().zip(segments.iter_mut()) {
            assign_mcc_single_sample(sample, segment, &context.space.genotypes, params);
        }
    }
    Ok(())
}

/// Combination maximizing Σ samples max over its states; first one on ties.
fn best_combination<'a>(combinations: &'a [Vec<usize>], likelihoods: &[Vec<f64>]) -> &'a [usize] {
    let mut best: &[usize] = &[];
    let mut best_total = f64::MIN;
    for combination in combinations {
        let total: f64 = likelihoods
            .iter()
            .map(|likelihood| {
                combination
                    .iter()
                    .map(|&cn| likelihood[cn])
                    .fold(0.0, f64::max)
            })
            .sum();
        if total > best_total {
            best_total = total;
            best = combination;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_combination_prefers_shared_states() {
        let combinations = crate::genotypes::copy_number_combinations(5, 2);
        let likelihoods = vec![
            vec![0.0, 0.0, 0.1, 0.8, 0.0],
            vec![0.0, 0.0, 0.9, 0.05, 0.0],
        ];
        assert_eq!(best_combination(&combinations, &likelihoods), &[2, 3]);
    }

    #[test]
    fn test_best_combination_limited_to_one_state() {
        let combinations = crate::genotypes::copy_number_combinations(5, 1);
        let likelihoods = vec![
            vec![0.0, 0.0, 0.1, 0.8, 0.0],
            vec![0.0, 0.0, 0.9, 0.05, 0.0],
        ];
        // 0.1 + 0.9 beats 0.8 + 0.05
        assert_eq!(best_combination(&combinations, &likelihoods), &[2]);
    }
}
