use crate::pedigree::PedigreeMember;
use crate::types::Segment;
use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::path::Path;

const HEADER: [&str; 10] = [
    "chrom",
    "start",
    "end",
    "sample",
    "copy_number",
    "mcc",
    "mcc_score",
    "qscore",
    "dq_score",
    "filter",
];

fn tsv_writer(path: &Path) -> Result<Writer<File>> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))
}

fn missing_or<T>(value: Option<T>, format: impl Fn(T) -> String) -> String {
    value.map(format).unwrap_or_else(|| ".".to_string())
}

/// Filter column: the quality filter, plus `dq{threshold}` for a de novo score
/// below the de novo threshold.
pub fn filter_label(segment: &Segment, de_novo_threshold: u32) -> String {
    let low_dq = segment
        .dq_score
        .is_some_and(|dq| dq < de_novo_threshold as f64);
    match (segment.filter.is_pass(), low_dq) {
        (_, false) => segment.filter.to_string(),
        (true, true) => format!("dq{}", de_novo_threshold),
        (false, true) => format!("{};dq{}", segment.filter, de_novo_threshold),
    }
}

fn write_row(wtr: &mut Writer<File>, sample: &str, segment: &Segment, de_novo_threshold: u32) -> Result<()> {
    wtr.write_record(&[
        segment.chrom.clone(),
        segment.begin.to_string(),
        segment.end.to_string(),
        sample.to_string(),
        segment.copy_number.to_string(),
        missing_or(segment.major_chromosome_count, |mcc| mcc.to_string()),
        missing_or(segment.major_chromosome_count_score, |s| format!("{:.2}", s)),
        format!("{:.2}", segment.qscore),
        missing_or(segment.dq_score, |s| format!("{:.2}", s)),
        filter_label(segment, de_novo_threshold),
    ])?;
    Ok(())
}

/// One row per (segment, sample), segments in order, samples in input order.
pub fn write_joint_calls(members: &[PedigreeMember], path: &Path, de_novo_threshold: u32) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    wtr.write_record(HEADER)?;

    let num_segments = members.first().map_or(0, |m| m.segments.len());
    for i in 0..num_segments {
        for member in members {
            let segment = member
                .segments
                .get(i)
                .with_context(|| format!("sample '{}' has no segment {}", member.name, i))?;
            write_row(&mut wtr, &member.name, segment, de_novo_threshold)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_sample_calls(member: &PedigreeMember, path: &Path, de_novo_threshold: u32) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    wtr.write_record(HEADER)?;
    for segment in &member.segments {
        write_row(&mut wtr, &member.name, segment, de_novo_threshold)?;
    }
    wtr.flush()?;
    Ok(())
}
