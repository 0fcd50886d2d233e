use crate::pedigree::{PloidyInfo, PloidyRegion};
use crate::types::Segment;
use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Failed to open TSV file: {}", path.display()))
}

/// Read one sample's segments from a TSV with columns `chrom start end coverage`.
///
/// Rows must be in genomic order; coordinates are zero-based half-open.
pub fn load_segments(path: &Path) -> Result<Vec<Segment>> {
    let mut rdr = tsv_reader(path)?;
    let mut segments = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        let row = i + 1;
        let record = record.with_context(|| format!("Failed to parse TSV row {}", row))?;
        let ctx = || format!("{} row {}", path.display(), row);

        let chrom = record.get(0).with_context(ctx)?.to_string();
        let begin: u64 = record.get(1).with_context(ctx)?.parse().with_context(ctx)?;
        let end: u64 = record.get(2).with_context(ctx)?.parse().with_context(ctx)?;
        let coverage: f64 = record.get(3).with_context(ctx)?.parse().with_context(ctx)?;
        if end <= begin {
            anyhow::bail!("{}: segment end {} is not after start {}", ctx(), end, begin);
        }
        segments.push(Segment::new(chrom, begin, end, coverage));
    }

    if segments.is_empty() {
        anyhow::bail!("No segments found in {}", path.display());
    }
    info!("Loaded {} segments from {}", segments.len(), path.display());
    Ok(segments)
}

/// Read reference copy-number regions, keyed by sample, from a TSV with columns
/// `sample chrom start end copy_number`. A missing file means every sample is diploid.
pub fn load_ploidy(path: &Path) -> Result<HashMap<String, PloidyInfo>> {
    let mut ploidy: HashMap<String, PloidyInfo> = HashMap::new();
    if !path.exists() {
        warn!("Ploidy file {} not found; assuming diploid everywhere", path.display());
        return Ok(ploidy);
    }

    let mut rdr = tsv_reader(path)?;
    for (i, record) in rdr.records().enumerate() {
        let row = i + 1;
        let record = record.with_context(|| format!("Failed to parse TSV row {}", row))?;
        let ctx = || format!("{} row {}", path.display(), row);

        let sample = record.get(0).with_context(ctx)?.to_string();
        let region = PloidyRegion {
            chrom: record.get(1).with_context(ctx)?.to_string(),
            begin: record.get(2).with_context(ctx)?.parse().with_context(ctx)?,
            end: record.get(3).with_context(ctx)?.parse().with_context(ctx)?,
            copy_number: record.get(4).with_context(ctx)?.parse().with_context(ctx)?,
        };
        ploidy.entry(sample).or_default().regions.push(region);
    }
    info!("Loaded ploidy regions for {} samples", ploidy.len());
    Ok(ploidy)
}
