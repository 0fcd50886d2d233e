use super::scoring::{
    assign_mcc, assign_mcc_single_sample, assign_quality, conditional_de_novo_score,
    coverage_likelihood, has_allele_evidence, ReferenceAxis,
};
use super::{CallContext, Family};
use crate::distribution::CopyNumberDistribution;
use crate::error::Result;
use crate::pedigree::SampleView;
use crate::statistics::finite_or_zero;
use crate::types::{Genotype, Segment};

const DEFAULT_COPY_NUMBER: usize = 2;

/// Joint pedigree calling of one segment across all members.
pub(super) fn call_segment(
    context: &CallContext<'_>,
    family: &Family,
    segments: &mut [&mut Segment],
) -> Result<()> {
    let distribution = assign_copy_number(context, family, segments)?;

    for (axis, &member) in family.axes.iter().enumerate() {
        let marginal = distribution.marginal_by_axis(axis);
        assign_quality(segments[member], &marginal, context.params);
    }

    assign_de_novo_scores(context, family, &distribution, segments);

    if has_allele_evidence(segments, context.params) {
        assign_mcc_with_pedigree(context, family, segments);
    }
    Ok(())
}

/// Search every (parent1 state, parent2 state, offspring genotypes) triple and
/// write the maximum-likelihood copy numbers into the segments.
///
/// Each visited joint state keeps the largest likelihood seen for it; the
/// returned tensor is a MAP proxy, not a summed joint probability.
fn assign_copy_number(
    context: &CallContext<'_>,
    family: &Family,
    segments: &mut [&mut Segment],
) -> Result<CopyNumberDistribution> {
    let params = context.params;
    let space = context.space;
    let num_states = params.maximum_copy_number;
    let transition = &space.transition_matrix;

    let likelihoods: Vec<Vec<f64>> = family
        .axes
        .iter()
        .map(|&member| coverage_likelihood(&context.samples[member], segments[member], params))
        .collect();
    let names = family
        .axes
        .iter()
        .map(|&member| context.samples[member].name.to_string())
        .collect();
    let mut distribution = CopyNumberDistribution::new(names, num_states)?;

    let mut best_likelihood = 0.0;
    let mut best_index = vec![DEFAULT_COPY_NUMBER; family.axes.len()];
    let mut index = vec![0; family.axes.len()];

    for cn1 in 0..num_states {
        for cn2 in 0..num_states {
            let parent_likelihood = likelihoods[0][cn1] * likelihoods[1][cn2];
            index[0] = cn1;
            index[1] = cn2;
            for offspring in &space.offspring_genotypes {
                let mut likelihood = parent_likelihood;
                for (child, gt) in offspring.iter().enumerate() {
                    let child_cn = gt.copy_number().min(num_states - 1);
                    likelihood *= transition[cn1][gt.counts_a]
                        * transition[cn2][gt.counts_b]
                        * likelihoods[child + 2][child_cn];
                    index[child + 2] = child_cn;
                }
                let likelihood = finite_or_zero(likelihood);
                distribution.set_max_joint_probability(likelihood, &index)?;
                if likelihood > best_likelihood {
                    best_likelihood = likelihood;
                    best_index.copy_from_slice(&index);
                }
            }
        }
    }

    for (&member, &cn) in family.axes.iter().zip(&best_index) {
        segments[member].set_copy_number(cn);
    }
    Ok(distribution)
}

/// DQ for each proband whose call differs from its reference copy number while
/// parents and other probands stay at theirs, all with confident calls.
fn assign_de_novo_scores(
    context: &CallContext<'_>,
    family: &Family,
    distribution: &CopyNumberDistribution,
    segments: &mut [&mut Segment],
) {
    let params = context.params;
    let threshold = params.quality_filter_threshold as f64;
    let reference_cn = |member: usize, segment: &Segment| {
        context.samples[member].ploidy.reference_copy_number(segment)
    };
    let at_reference = |member: usize, segments: &[&mut Segment]| {
        segments[member].copy_number == reference_cn(member, segments[member])
    };

    for &proband in &family.probands {
        let proband_cn = segments[proband].copy_number;
        let proband_ref = reference_cn(proband, segments[proband]);
        if proband_cn == proband_ref {
            continue;
        }
        if !family.parents.iter().all(|&p| at_reference(p, segments)) {
            continue;
        }
        if !family
            .probands
            .iter()
            .filter(|&&other| other != proband)
            .all(|&other| at_reference(other, segments))
        {
            continue;
        }
        let confident = std::iter::once(proband)
            .chain(family.parents)
            .all(|member| segments[member].qscore > threshold);
        if !confident {
            continue;
        }

        let reference: Vec<ReferenceAxis> = family
            .axes
            .iter()
            .enumerate()
            .filter(|&(_, &member)| {
                family.parents.contains(&member) || (member != proband && family.probands.contains(&member))
            })
            .map(|(axis, &member)| ReferenceAxis {
                axis,
                copy_number: reference_cn(member, segments[member]),
            })
            .collect();
        let Some(axis) = family.axis_of(proband) else {
            continue;
        };
        let proband_axis = ReferenceAxis {
            axis,
            copy_number: proband_ref,
        };

        if let Some(score) = conditional_de_novo_score(
            distribution,
            proband_axis,
            proband_cn,
            &reference,
            params.max_qscore,
        ) {
            segments[proband].set_de_novo_score(score);
        }
    }
}

/// Highest-likelihood genotype at the child's copy number that shares a count
/// with both parental genotypes, with its likelihood.
fn best_consistent_genotype(
    sample: &SampleView<'_>,
    segment: &Segment,
    genotypes: &[Vec<Genotype>],
    parent1: &Genotype,
    parent2: &Genotype,
) -> Option<(Genotype, f64)> {
    let mut best: Option<(Genotype, f64)> = None;
    let candidates = genotypes
        .get(segment.copy_number)
        .into_iter()
        .flatten()
        .filter(|gt| gt.is_consistent_with_parent(parent1) && gt.is_consistent_with_parent(parent2));
    for gt in candidates {
        let value = sample
            .model
            .get_current_gt_likelihood(sample.max_coverage, &segment.allele_counts, gt);
        if best.map_or(true, |(_, v)| value > v) {
            best = Some((*gt, value));
        }
    }
    best
}

/// Joint MCC assignment conditioned on the called copy numbers.
///
/// For every pair of parental genotypes, each inherited child call takes its
/// best genotype among those consistent with both parents; the pair
/// maximizing the product of parental and child likelihoods sets every MCC.
/// Children carrying a DQ score are called from their own allele counts.
fn assign_mcc_with_pedigree(
    context: &CallContext<'_>,
    family: &Family,
    segments: &mut [&mut Segment],
) {
    let params = context.params;
    let genotypes = &context.space.genotypes;
    let [parent1, parent2] = family.parents;
    let sample1 = &context.samples[parent1];
    let sample2 = &context.samples[parent2];

    let (Some(parent1_gts), Some(parent2_gts)) = (
        genotypes.get(segments[parent1].copy_number),
        genotypes.get(segments[parent2].copy_number),
    ) else {
        return;
    };

    let inherited: Vec<usize> = family
        .children
        .iter()
        .copied()
        .filter(|&child| segments[child].dq_score.is_none())
        .collect();

    let mut best_likelihood = f64::MIN;
    let mut best: Option<(Genotype, Genotype, Vec<Option<Genotype>>)> = None;

    for gt1 in parent1_gts {
        for gt2 in parent2_gts {
            let mut likelihood = 1.0;
            let mut child_gts = Vec::with_capacity(inherited.len());
            for &child in &inherited {
                let child_best = best_consistent_genotype(
                    &context.samples[child],
                    segments[child],
                    genotypes,
                    gt1,
                    gt2,
                );
                // no genotype explained by both parents rules the pair out
                likelihood *= child_best.map_or(0.0, |(_, value)| value);
                child_gts.push(child_best.map(|(gt, _)| gt));
            }
            likelihood *= sample1.model.get_current_gt_likelihood(
                sample1.max_coverage,
                &segments[parent1].allele_counts,
                gt1,
            ) * sample2.model.get_current_gt_likelihood(
                sample2.max_coverage,
                &segments[parent2].allele_counts,
                gt2,
            );
            let likelihood = finite_or_zero(likelihood);

            if likelihood > best_likelihood {
                best_likelihood = likelihood;
                best = Some((*gt1, *gt2, child_gts));
            }
        }
    }

    if let Some((gt1, gt2, child_gts)) = best {
        assign_mcc(sample1, segments[parent1], gt1, genotypes, params);
        assign_mcc(sample2, segments[parent2], gt2, genotypes, params);
        for (&child, gt) in inherited.iter().zip(child_gts) {
            if let Some(gt) = gt {
                assign_mcc(&context.samples[child], segments[child], gt, genotypes, params);
            }
        }
    }

    for &child in &family.children {
        if segments[child].dq_score.is_some() {
            assign_mcc_single_sample(&context.samples[child], segments[child], genotypes, params);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::StateSpace;
    use crate::genotypes::genotypes_by_copy_number;
    use crate::model::CopyNumberModel;
    use crate::parameters::PedigreeCallerParameters;
    use crate::pedigree::{Kinship, PloidyInfo};

    const MAX_COVERAGE: usize = 100;

    fn model() -> CopyNumberModel {
        CopyNumberModel::new(5, 20.0, 15.0, 100.0, 37.5, MAX_COVERAGE)
    }

    fn view<'a>(name: &'a str, kinship: Kinship, model: &'a CopyNumberModel, ploidy: &'a PloidyInfo) -> SampleView<'a> {
        SampleView {
            name,
            kinship,
            model,
            ploidy,
            mean_coverage: 40.0,
            max_coverage: MAX_COVERAGE,
        }
    }

    fn trio() -> Family {
        Family {
            parents: [0, 1],
            children: vec![2],
            probands: vec![2],
            axes: vec![0, 1, 2],
        }
    }

    fn called(copy_number: usize, qscore: f64, sites: (usize, usize)) -> Segment {
        let mut segment = Segment::new("chr1", 0, 10_000, 40.0);
        segment.set_copy_number(copy_number);
        segment.set_quality(qscore, 7);
        segment.allele_counts = vec![sites; 15];
        segment
    }

    fn gain_distribution() -> CopyNumberDistribution {
        let names = vec!["mother".into(), "father".into(), "child".into()];
        let mut dist = CopyNumberDistribution::new(names, 5).unwrap();
        dist.set_joint_probability(0.9, &[2, 2, 3]).unwrap();
        dist.set_joint_probability(0.05, &[2, 2, 2]).unwrap();
        dist.set_joint_probability(0.01, &[3, 2, 3]).unwrap();
        dist
    }

    #[test]
    fn test_de_novo_gain_is_scored() {
        let params = PedigreeCallerParameters::default();
        let (model, ploidy) = (model(), PloidyInfo::default());
        let samples = vec![
            view("mother", Kinship::Parent, &model, &ploidy),
            view("father", Kinship::Parent, &model, &ploidy),
            view("child", Kinship::Proband, &model, &ploidy),
        ];
        let space = StateSpace::default();
        let context = CallContext { params: &params, space: &space, samples: &samples };

        let mut segments = vec![called(2, 30.0, (15, 15)), called(2, 30.0, (15, 15)), called(3, 30.0, (15, 30))];
        let mut refs: Vec<&mut Segment> = segments.iter_mut().collect();
        assign_de_novo_scores(&context, &trio(), &gain_distribution(), &mut refs);

        let dq = segments[2].dq_score.unwrap();
        assert!(dq > 0.0 && dq <= params.max_qscore, "dq {}", dq);
        assert!(segments[0].dq_score.is_none());
    }

    #[test]
    fn test_low_quality_parent_blocks_de_novo_score() {
        let params = PedigreeCallerParameters::default();
        let (model, ploidy) = (model(), PloidyInfo::default());
        let samples = vec![
            view("mother", Kinship::Parent, &model, &ploidy),
            view("father", Kinship::Parent, &model, &ploidy),
            view("child", Kinship::Proband, &model, &ploidy),
        ];
        let space = StateSpace::default();
        let context = CallContext { params: &params, space: &space, samples: &samples };

        let mut segments = vec![called(2, 30.0, (15, 15)), called(2, 3.0, (15, 15)), called(3, 30.0, (15, 30))];
        let mut refs: Vec<&mut Segment> = segments.iter_mut().collect();
        assign_de_novo_scores(&context, &trio(), &gain_distribution(), &mut refs);
        assert!(segments[2].dq_score.is_none());

        // proband at its reference copy number
        let mut segments = vec![called(2, 30.0, (15, 15)), called(2, 30.0, (15, 15)), called(2, 30.0, (15, 15))];
        let mut refs: Vec<&mut Segment> = segments.iter_mut().collect();
        assign_de_novo_scores(&context, &trio(), &gain_distribution(), &mut refs);
        assert!(segments[2].dq_score.is_none());
    }

    #[test]
    fn test_inherited_child_genotype_must_match_both_parents() {
        let model = model();
        let ploidy = PloidyInfo::default();
        let sample = view("child", Kinship::Offspring, &model, &ploidy);
        let genotypes = genotypes_by_copy_number(5);
        let child = called(3, 30.0, (0, 45));

        let diploid = Genotype::new(1, 1);
        let (best, _) = best_consistent_genotype(&sample, &child, &genotypes, &diploid, &diploid).unwrap();
        assert!(best.is_consistent_with_parent(&diploid));
        assert_eq!(best.major_count(), 2);

        // no genotype of copy number 3 carries both a 1 and a 0 count
        let nullisomic = Genotype::new(0, 0);
        assert!(best_consistent_genotype(&sample, &child, &genotypes, &diploid, &nullisomic).is_none());
    }

    #[test]
    fn test_child_mcc_with_and_without_de_novo_score() {
        let params = PedigreeCallerParameters::default();
        let (model, ploidy) = (model(), PloidyInfo::default());
        let samples = vec![
            view("mother", Kinship::Parent, &model, &ploidy),
            view("father", Kinship::Parent, &model, &ploidy),
            view("child", Kinship::Proband, &model, &ploidy),
        ];
        let space = StateSpace {
            genotypes: genotypes_by_copy_number(5),
            ..Default::default()
        };
        let context = CallContext { params: &params, space: &space, samples: &samples };
        let trio_segments = || vec![called(2, 30.0, (15, 15)), called(2, 30.0, (15, 15)), called(3, 30.0, (0, 45))];

        // inherited: restricted to genotypes sharing a count with both (1, 1) parents
        let mut segments = trio_segments();
        let mut refs: Vec<&mut Segment> = segments.iter_mut().collect();
        assign_mcc_with_pedigree(&context, &trio(), &mut refs);
        assert_eq!(segments[0].major_chromosome_count, Some(1));
        assert_eq!(segments[2].major_chromosome_count, Some(2));

        // de novo: the child's own allele counts decide
        let mut segments = trio_segments();
        segments[2].set_de_novo_score(40.0);
        let mut refs: Vec<&mut Segment> = segments.iter_mut().collect();
        assign_mcc_with_pedigree(&context, &trio(), &mut refs);
        assert_eq!(segments[2].major_chromosome_count, Some(3));
        assert!(segments[2].major_chromosome_count_score.is_some());
    }
}
