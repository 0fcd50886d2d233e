use crate::distribution::CopyNumberDistribution;
use crate::parameters::PedigreeCallerParameters;
use crate::pedigree::SampleView;
use crate::statistics::{finite_or_zero, phred_quality};
use crate::types::{Genotype, Segment};

const DIPLOID: usize = 2;
const MIN_DE_NOVO_PROBABILITY: f64 = 1e-6;

/// Copy-number likelihoods for one sample at one segment, coverage capped at a
/// multiple of the sample mean.
pub(super) fn coverage_likelihood(
    sample: &SampleView<'_>,
    segment: &Segment,
    params: &PedigreeCallerParameters,
) -> Vec<f64> {
    let cap = sample.mean_coverage * params.coverage_multiplier_cap;
    sample
        .model
        .get_cn_likelihood(segment.median_coverage.min(cap))
        .into_iter()
        .map(finite_or_zero)
        .collect()
}

/// Set QScore and quality filter from the sample's (unnormalized) state likelihoods.
pub(super) fn assign_quality(segment: &mut Segment, likelihoods: &[f64], params: &PedigreeCallerParameters) {
    let total: f64 = likelihoods.iter().sum();
    let selected = likelihoods.get(segment.copy_number).copied().unwrap_or(0.0);
    let qscore = phred_quality(total, selected, params.max_qscore);
    segment.set_quality(qscore, params.quality_filter_threshold);
}

/// Axis of the joint tensor together with the state it is expected to hold
#[derive(Debug, Clone, Copy)]
pub(super) struct ReferenceAxis {
    pub axis: usize,
    pub copy_number: usize,
}

/// Conditional de novo quality of a proband call.
///
/// Over populated tensor states where the proband keeps `proband_cn`, the
/// denominator sums all mass and the numerator the mass where every
/// `reference` axis sits at its reference copy number. The tensor holds the
/// maximum likelihood seen per state rather than a summed marginal, so this is
/// an approximation of the inherited-event probability.
pub(super) fn conditional_de_novo_score(
    distribution: &CopyNumberDistribution,
    proband: ReferenceAxis,
    proband_cn: usize,
    reference: &[ReferenceAxis],
    max_qscore: f64,
) -> Option<f64> {
    let marginal = distribution.marginal_by_axis(proband.axis);
    let alt = marginal.get(proband_cn).copied().unwrap_or(0.0);
    let reference_mass = marginal.get(proband.copy_number).copied().unwrap_or(0.0);
    let proband_marginal_alt = alt / (alt + reference_mass);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (index, value) in distribution.indices() {
        if index[proband.axis] != proband_cn {
            continue;
        }
        denominator += value;
        if reference.iter().all(|r| index[r.axis] == r.copy_number) {
            numerator += value;
        }
    }
    if !(denominator > 0.0) || !proband_marginal_alt.is_finite() {
        return None;
    }

    let probability = (1.0 - numerator / denominator) * (1.0 - proband_marginal_alt);
    let score = -10.0 * probability.max(MIN_DE_NOVO_PROBABILITY).log10();
    Some(score.min(max_qscore))
}

/// Highest-likelihood genotype among `candidates`, first one on ties.
pub(super) fn best_genotype(
    sample: &SampleView<'_>,
    segment: &Segment,
    candidates: &[Genotype],
) -> Option<Genotype> {
    let mut best: Option<(Genotype, f64)> = None;
    for gt in candidates {
        let likelihood =
            sample
                .model
                .get_current_gt_likelihood(sample.max_coverage, &segment.allele_counts, gt);
        if best.map_or(true, |(_, value)| likelihood > value) {
            best = Some((*gt, likelihood));
        }
    }
    best.map(|(gt, _)| gt)
}

/// Record the major chromosome count implied by `genotype`.
///
/// Above diploid the MCC is the larger haplotype count, scored against every
/// genotype of the same copy number. At or below diploid it is 1 for a diploid
/// call and the copy number itself otherwise, without a score.
pub(super) fn assign_mcc(
    sample: &SampleView<'_>,
    segment: &mut Segment,
    genotype: Genotype,
    genotypes: &[Vec<Genotype>],
    params: &PedigreeCallerParameters,
) {
    let copy_number = segment.copy_number;
    if copy_number > DIPLOID {
        let candidates = genotypes.get(copy_number).map(Vec::as_slice).unwrap_or(&[]);
        let selected = candidates.iter().position(|gt| *gt == genotype);
        let (score, _) = sample.model.get_gt_likelihood_score(
            &segment.allele_counts,
            candidates,
            selected,
            sample.max_coverage,
            params.max_qscore,
        );
        segment.set_major_chromosome_count(genotype.major_count(), Some(score));
    } else {
        let mcc = if copy_number == DIPLOID { 1 } else { copy_number };
        segment.set_major_chromosome_count(mcc, None);
    }
}

/// MCC from the sample's own allele counts only.
pub(super) fn assign_mcc_single_sample(
    sample: &SampleView<'_>,
    segment: &mut Segment,
    genotypes: &[Vec<Genotype>],
    params: &PedigreeCallerParameters,
) {
    let candidates = genotypes.get(segment.copy_number).map(Vec::as_slice).unwrap_or(&[]);
    if let Some(gt) = best_genotype(sample, segment, candidates) {
        assign_mcc(sample, segment, gt, genotypes, params);
    }
}

/// Every sample carries enough allele sites, and they are dense enough along the
/// first sample's segment, to attempt MCC calls.
pub(super) fn has_allele_evidence(segments: &[&mut Segment], params: &PedigreeCallerParameters) -> bool {
    let Some(first) = segments.first() else {
        return false;
    };
    if segments
        .iter()
        .any(|s| s.allele_counts.len() < params.min_allele_counts)
    {
        return false;
    }
    let mean_sites = segments
        .iter()
        .map(|s| s.allele_counts.len() as f64)
        .sum::<f64>()
        / segments.len() as f64;
    let density = first.length() as f64 / mean_sites;
    density <= params.allele_density_threshold
}
