use crate::statistics::{finite_or_zero, negative_binomial_density, phred_quality};
use crate::types::Genotype;

/// Coverage mean multiplier per copy-number state; low and odd states skew
/// away from the ideal `cn × haploid mean`.
fn coverage_multiplier(copy_number: usize) -> f64 {
    match copy_number {
        0 => 0.1,
        1 => 0.9,
        3 => 3.3,
        cn => cn as f64,
    }
}

/// Per-sample likelihood model over copy-number and genotype states.
///
/// Holds one coverage pmf table per copy-number state and one allele-count pmf
/// table per haplotype count; a genotype (a, b) reads tables a and b. Built once
/// per sample and only read during calling.
#[derive(Debug, Clone)]
pub struct CopyNumberModel {
    num_states: usize,
    max_value: usize,
    cn_distribution: Vec<Vec<f64>>,
    allele_distribution: Vec<Vec<f64>>,
}

impl CopyNumberModel {
    /// Build the model.
    ///
    /// * `haploid_mean` - expected coverage of a single copy
    /// * `haploid_allele_mean` - expected read count of a single allele copy
    /// * `max_value` - length of every pmf table; lookups beyond are clamped
    pub fn new(
        num_states: usize,
        haploid_mean: f64,
        haploid_allele_mean: f64,
        variance: f64,
        allele_variance: f64,
        max_value: usize,
    ) -> Self {
        let max_value = max_value.max(1);

        let cn_distribution = (0..num_states)
            .map(|cn| {
                negative_binomial_density(
                    haploid_mean * coverage_multiplier(cn),
                    variance,
                    max_value,
                    true,
                )
            })
            .collect();

        let allele_distribution = (0..num_states)
            .map(|gt| {
                negative_binomial_density(
                    haploid_allele_mean * (gt as f64).max(0.1),
                    allele_variance,
                    max_value,
                    false,
                )
            })
            .collect();

        Self {
            num_states,
            max_value,
            cn_distribution,
            allele_distribution,
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Likelihood of the observed coverage under every copy-number state.
    pub fn get_cn_likelihood(&self, coverage: f64) -> Vec<f64> {
        let index = (coverage.max(0.0).round() as usize).min(self.max_value - 1);
        self.cn_distribution
            .iter()
            .map(|table| finite_or_zero(table[index]))
            .collect()
    }

    /// Sum over allele sites of P(ref count | gt.a) · P(alt count | gt.b).
    ///
    /// Observed counts are clamped to `max_coverage - 1`. Genotypes outside the
    /// model's state range have likelihood 0.
    pub fn get_current_gt_likelihood(
        &self,
        max_coverage: usize,
        allele_counts: &[(usize, usize)],
        genotype: &Genotype,
    ) -> f64 {
        let (Some(table_a), Some(table_b)) = (
            self.allele_distribution.get(genotype.counts_a),
            self.allele_distribution.get(genotype.counts_b),
        ) else {
            return 0.0;
        };

        let cap = max_coverage.max(1).min(self.max_value) - 1;
        let total: f64 = allele_counts
            .iter()
            .map(|&(a, b)| table_a[a.min(cap)] * table_b[b.min(cap)])
            .sum();
        finite_or_zero(total)
    }

    /// Phred-scaled genotype quality over `genotypes`.
    ///
    /// With `selected` unset the highest-likelihood genotype (first on ties) is
    /// chosen. Returns the score, clamped to `[0, max_qscore]`, together with the
    /// index of the genotype it refers to.
    pub fn get_gt_likelihood_score(
        &self,
        allele_counts: &[(usize, usize)],
        genotypes: &[Genotype],
        selected: Option<usize>,
        max_coverage: usize,
        max_qscore: f64,
    ) -> (f64, usize) {
        let likelihoods: Vec<f64> = genotypes
            .iter()
            .map(|gt| self.get_current_gt_likelihood(max_coverage, allele_counts, gt))
            .collect();

        let selected = selected.unwrap_or_else(|| {
            let mut best = 0;
            for (index, &value) in likelihoods.iter().enumerate() {
                if value > likelihoods[best] {
                    best = index;
                }
            }
            best
        });

        let total: f64 = likelihoods.iter().sum();
        let chosen = likelihoods.get(selected).copied().unwrap_or(0.0);
        (phred_quality(total, chosen, max_qscore), selected)
    }
}
