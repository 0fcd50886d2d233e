use crate::error::{CallerError, Result};
use crate::parameters::PedigreeCallerParameters;
use crate::pedigree::PedigreeMember;
use crate::types::Segment;
use log::info;

/// Merge decision inputs for one segment index, shared by all samples
#[derive(Debug, Clone)]
struct MergeKey<'a> {
    chrom: &'a str,
    begin: u64,
    end: u64,
    copy_numbers: Vec<usize>,
    mean_qscore: f64,
}

impl MergeKey<'_> {
    fn length(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }
}

/// Segments folded into one output segment; `anchor` keeps its calls.
#[derive(Debug, Clone, PartialEq)]
struct MergeGroup {
    anchor: usize,
    indices: Vec<usize>,
}

/// Merge segments of all members in lockstep.
///
/// Segments shorter than `minimum_call_size` are first assimilated into the
/// neighbouring call with the higher mean QScore (same chromosome, within
/// `maximum_merge_span`). Adjacent calls with identical copy numbers in every
/// sample are then joined. Merged segments take the mean QScore of their
/// constituents.
pub fn merge_segments(members: &mut [PedigreeMember], params: &PedigreeCallerParameters) -> Result<()> {
    let Some(first) = members.first() else {
        return Ok(());
    };
    let num_segments = first.segments.len();
    if let Some(member) = members.iter().find(|m| m.segments.len() != num_segments) {
        return Err(CallerError::SegmentMismatch(format!(
            "sample '{}' has {} segments, expected {}",
            member.name,
            member.segments.len(),
            num_segments
        )));
    }
    if num_segments == 0 {
        return Ok(());
    }

    let groups = {
        let keys: Vec<MergeKey<'_>> = (0..num_segments)
            .map(|i| {
                let segment = &first.segments[i];
                MergeKey {
                    chrom: &segment.chrom,
                    begin: segment.begin,
                    end: segment.end,
                    copy_numbers: members.iter().map(|m| m.segments[i].copy_number).collect(),
                    mean_qscore: members.iter().map(|m| m.segments[i].qscore).sum::<f64>()
                        / members.len() as f64,
                }
            })
            .collect();
        let assimilated = assimilate_short_segments(&keys, params);
        merge_identical_calls(&keys, assimilated, params.maximum_merge_span)
    };

    for member in members.iter_mut() {
        let merged = groups
            .iter()
            .map(|group| merge_group(&member.segments, group, params.quality_filter_threshold))
            .collect();
        member.segments = merged;
    }
    info!("Merged {} segments into {}", num_segments, groups.len());
    Ok(())
}

fn assimilate_short_segments(keys: &[MergeKey<'_>], params: &PedigreeCallerParameters) -> Vec<MergeGroup> {
    let min_size = params.minimum_call_size;
    let span = params.maximum_merge_span;
    let mut groups: Vec<MergeGroup> = Vec::new();
    // group index of each long segment already emitted
    let mut group_of: Vec<Option<usize>> = vec![None; keys.len()];
    let mut pending: Vec<usize> = Vec::new();

    let mut i = 0;
    while i < keys.len() {
        let key = &keys[i];
        if key.length() >= min_size {
            let mut indices = std::mem::take(&mut pending);
            indices.push(i);
            group_of[i] = Some(groups.len());
            groups.push(MergeGroup { anchor: i, indices });
            i += 1;
            continue;
        }

        let previous = (0..i)
            .rev()
            .take_while(|&j| keys[j].chrom == key.chrom)
            .find(|&j| keys[j].length() >= min_size)
            .filter(|&j| key.begin.saturating_sub(keys[j].end) <= span);
        let next = (i + 1..keys.len())
            .take_while(|&j| keys[j].chrom == key.chrom)
            .find(|&j| keys[j].length() >= min_size)
            .filter(|&j| keys[j].begin.saturating_sub(key.end) <= span);

        let previous_q = previous.map(|j| keys[j].mean_qscore);
        let next_q = next.map(|j| keys[j].mean_qscore);

        match (previous, next) {
            (Some(j), _) if next_q.map_or(true, |q| previous_q >= Some(q)) => {
                if let Some(group) = group_of[j] {
                    groups[group].indices.push(i);
                }
                i += 1;
            }
            (_, Some(j)) => {
                pending.extend(i..j);
                i = j;
            }
            _ => {
                groups.push(MergeGroup {
                    anchor: i,
                    indices: vec![i],
                });
                i += 1;
            }
        }
    }
    groups
}

fn merge_identical_calls(keys: &[MergeKey<'_>], groups: Vec<MergeGroup>, span: u64) -> Vec<MergeGroup> {
    let mut merged: Vec<MergeGroup> = Vec::with_capacity(groups.len());
    for group in groups {
        if let Some(last) = merged.last_mut() {
            let last_key = &keys[last.anchor];
            let key = &keys[group.anchor];
            let last_end = last.indices.iter().map(|&i| keys[i].end).max().unwrap_or(last_key.end);
            let begin = group.indices.iter().map(|&i| keys[i].begin).min().unwrap_or(key.begin);
            if last_key.copy_numbers == key.copy_numbers
                && last_key.chrom == key.chrom
                && begin.saturating_sub(last_end) < span
            {
                last.indices.extend(group.indices);
                continue;
            }
        }
        merged.push(group);
    }
    merged
}

/// Fold a group into one segment: the anchor's calls, the union interval,
/// all allele sites, length-weighted coverage and mean QScore.
fn merge_group(segments: &[Segment], group: &MergeGroup, quality_threshold: u32) -> Segment {
    let mut merged = segments[group.anchor].clone();
    if group.indices.len() == 1 {
        return merged;
    }

    let parts: Vec<&Segment> = group.indices.iter().map(|&i| &segments[i]).collect();
    merged.begin = parts.iter().map(|s| s.begin).min().unwrap_or(merged.begin);
    merged.end = parts.iter().map(|s| s.end).max().unwrap_or(merged.end);
    merged.allele_counts = parts
        .iter()
        .flat_map(|s| s.allele_counts.iter().copied())
        .collect();

    let total_length: u64 = parts.iter().map(|s| s.length()).sum();
    if total_length > 0 {
        merged.median_coverage = parts
            .iter()
            .map(|s| s.median_coverage * s.length() as f64)
            .sum::<f64>()
            / total_length as f64;
    }

    let qscore = parts.iter().map(|s| s.qscore).sum::<f64>() / parts.len() as f64;
    merged.set_quality(qscore, quality_threshold);
    merged
}
