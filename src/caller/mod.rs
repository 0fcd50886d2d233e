mod independent;
mod pedigree_mode;
mod scoring;

use crate::error::{CallerError, Result};
use crate::genotypes::{
    copy_number_combinations, genotypes_by_copy_number, offspring_genotype_combinations,
    parental_genotypes,
};
use crate::parameters::PedigreeCallerParameters;
use crate::partition::{get_parallel_intervals, SegmentIndexRange};
use crate::pedigree::{Kinship, PedigreeMember, SampleView};
use crate::statistics::transition_matrix;
use crate::types::{CallerMode, Genotype, Segment};
use indicatif::ProgressBar;
use log::{debug, info};
use rayon::prelude::*;

/// Read-only enumerations built once per run and shared by every worker
#[derive(Debug, Clone, Default)]
pub(crate) struct StateSpace {
    pub transition_matrix: Vec<Vec<f64>>,
    pub offspring_genotypes: Vec<Vec<Genotype>>,
    pub genotypes: Vec<Vec<Genotype>>,
    pub copy_number_combinations: Vec<Vec<usize>>,
}

/// Member indices grouped by role.
///
/// `axes` fixes the joint tensor layout: both parents, then probands, then
/// other offspring, each group in input order.
#[derive(Debug, Clone)]
pub(crate) struct Family {
    pub parents: [usize; 2],
    pub children: Vec<usize>,
    pub probands: Vec<usize>,
    pub axes: Vec<usize>,
}

impl Family {
    fn from_samples(samples: &[SampleView<'_>]) -> Result<Self> {
        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.sort_by_key(|&i| samples[i].kinship.rank());

        let parents: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| samples[i].kinship == Kinship::Parent)
            .collect();
        let [parent1, parent2] = parents[..] else {
            return Err(CallerError::pedigree(format!(
                "pedigree calling needs exactly two parents, found {}",
                parents.len()
            )));
        };
        if let Some(other) = samples.iter().find(|s| s.kinship == Kinship::Other) {
            return Err(CallerError::pedigree(format!(
                "sample '{}' has no role in the pedigree",
                other.name
            )));
        }

        let children: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| matches!(samples[i].kinship, Kinship::Proband | Kinship::Offspring))
            .collect();
        let probands = children
            .iter()
            .copied()
            .filter(|&i| samples[i].kinship == Kinship::Proband)
            .collect();
        let axes = [parent1, parent2].into_iter().chain(children.iter().copied()).collect();

        Ok(Self {
            parents: [parent1, parent2],
            children,
            probands,
            axes,
        })
    }

    /// Tensor axis of a member, `None` for samples outside the family.
    pub fn axis_of(&self, member: usize) -> Option<usize> {
        self.axes.iter().position(|&m| m == member)
    }
}

/// Per-segment inputs shared by the calling passes
pub(crate) struct CallContext<'a> {
    pub params: &'a PedigreeCallerParameters,
    pub space: &'a StateSpace,
    pub samples: &'a [SampleView<'a>],
}

/// Multi-sample copy-number and genotype caller.
pub struct PedigreeCaller {
    params: PedigreeCallerParameters,
}

impl PedigreeCaller {
    pub fn new(params: PedigreeCallerParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn parameters(&self) -> &PedigreeCallerParameters {
        &self.params
    }

    /// Call every segment of every member in place.
    ///
    /// Segment lists must be index-aligned across members. Segments are split
    /// into contiguous index ranges processed in parallel on the current rayon
    /// pool; the first per-segment error aborts the run.
    pub fn call(
        &self,
        members: &mut [PedigreeMember],
        mode: CallerMode,
        progress: Option<&ProgressBar>,
    ) -> Result<()> {
        check_alignment(members)?;
        let num_segments = members[0].segments.len();

        let (samples, segment_lists): (Vec<SampleView<'_>>, Vec<&mut [Segment]>) =
            members.iter_mut().map(|m| m.split_view()).unzip();

        let family = match mode {
            CallerMode::Pedigree => Some(Family::from_samples(&samples)?),
            CallerMode::Independent => None,
        };
        let space = self.build_state_space(family.as_ref(), samples.len())?;

        let ranges = get_parallel_intervals(
            num_segments,
            rayon::current_num_threads(),
            self.params.max_core_number,
        );
        info!(
            "Calling {} segments across {} samples in {} ranges ({:?} mode)",
            num_segments,
            samples.len(),
            ranges.len(),
            mode
        );

        let context = CallContext {
            params: &self.params,
            space: &space,
            samples: &samples,
        };
        let chunks = split_into_ranges(segment_lists, &ranges);

        chunks
            .into_par_iter()
            .enumerate()
            .try_for_each(|(range_index, mut slices)| -> Result<()> {
                let len = slices.first().map_or(0, |s| s.len());
                debug!("Range {} started ({} segments)", range_index, len);
                for i in 0..len {
                    let mut segments: Vec<&mut Segment> =
                        slices.iter_mut().map(|s| &mut s[i]).collect();
                    for segment in segments.iter_mut() {
                        segment.reset_calls();
                    }
                    match &family {
                        Some(family) => pedigree_mode::call_segment(&context, family, &mut segments)?,
                        None => independent::call_segment(&context, &mut segments)?,
                    }
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                }
                debug!("Range {} finished", range_index);
                Ok(())
            })?;

        info!("Finished calling {} segments", num_segments);
        Ok(())
    }

    fn build_state_space(&self, family: Option<&Family>, num_samples: usize) -> Result<StateSpace> {
        let num_states = self.params.maximum_copy_number;
        let genotypes = genotypes_by_copy_number(num_states);

        let space = match family {
            Some(family) => {
                let parental = parental_genotypes(num_states);
                let offspring_genotypes = offspring_genotype_combinations(
                    &parental,
                    family.children.len(),
                    self.params.max_num_offspring_genotypes,
                    self.params.subsampling_seed,
                )?;
                info!(
                    "State space: {} parental genotypes, {} offspring genotype combinations",
                    parental.len(),
                    offspring_genotypes.len()
                );
                StateSpace {
                    transition_matrix: transition_matrix(num_states)?,
                    offspring_genotypes,
                    genotypes,
                    copy_number_combinations: Vec::new(),
                }
            }
            None => {
                let max_alleles = self.params.max_allele_number.min(num_samples);
                let combinations = copy_number_combinations(num_states, max_alleles);
                info!(
                    "State space: {} copy-number combinations of up to {} states",
                    combinations.len(),
                    max_alleles
                );
                StateSpace {
                    genotypes,
                    copy_number_combinations: combinations,
                    ..Default::default()
                }
            }
        };
        Ok(space)
    }
}

/// Every member must hold the same intervals at the same indices.
fn check_alignment(members: &[PedigreeMember]) -> Result<()> {
    let Some(first) = members.first() else {
        return Err(CallerError::invalid_parameter("no samples to call"));
    };
    for member in &members[1..] {
        if member.segments.len() != first.segments.len() {
            return Err(CallerError::SegmentMismatch(format!(
                "sample '{}' has {} segments, sample '{}' has {}",
                member.name,
                member.segments.len(),
                first.name,
                first.segments.len()
            )));
        }
        if let Some((index, (a, b))) = first
            .segments
            .iter()
            .zip(&member.segments)
            .enumerate()
            .find(|(_, (a, b))| !a.same_interval(b))
        {
            return Err(CallerError::SegmentMismatch(format!(
                "segment {} differs: {}:{}-{} in '{}' vs {}:{}-{} in '{}'",
                index, a.chrom, a.begin, a.end, first.name, b.chrom, b.begin, b.end, member.name
            )));
        }
    }
    Ok(())
}

/// Regroup each member's segment slice so every range owns its own sub-slices.
fn split_into_ranges<'a>(
    lists: Vec<&'a mut [Segment]>,
    ranges: &[SegmentIndexRange],
) -> Vec<Vec<&'a mut [Segment]>> {
    let mut chunks: Vec<Vec<&'a mut [Segment]>> = ranges
        .iter()
        .map(|_| Vec::with_capacity(lists.len()))
        .collect();
    for list in lists {
        let mut rest = list;
        for (chunk, range) in chunks.iter_mut().zip(ranges) {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            chunk.push(head);
            rest = tail;
        }
    }
    chunks
}
