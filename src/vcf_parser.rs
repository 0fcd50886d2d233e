use crate::error::CallerError;
use crate::types::Segment;
use anyhow::{Context, Result};
use log::{debug, info};
use rust_htslib::{bcf, bcf::Read};
use std::collections::HashMap;
use std::path::Path;

/// Resolve a sample name to its column index in the VCF header.
fn resolve_sample_index(header: &bcf::header::HeaderView, name: &str) -> Result<usize> {
    let samples: Vec<String> = header
        .samples()
        .iter()
        .map(|s| String::from_utf8_lossy(s).to_string())
        .collect();
    samples
        .iter()
        .position(|s| s == name)
        .with_context(|| {
            format!(
                "Sample '{}' not found in VCF header. Available samples: {:?}",
                name, samples
            )
        })
}

/// Segment indices per chromosome, ordered by start.
fn index_segments(segments: &[Segment]) -> HashMap<String, Vec<usize>> {
    let mut by_chrom: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, segment) in segments.iter().enumerate() {
        by_chrom.entry(segment.chrom.clone()).or_default().push(i);
    }
    for indices in by_chrom.values_mut() {
        indices.sort_by_key(|&i| segments[i].begin);
    }
    by_chrom
}

/// Index of the segment containing zero-based `pos`, if any.
fn find_segment(segments: &[Segment], indices: &[usize], pos: u64) -> Option<usize> {
    let after = indices.partition_point(|&i| segments[i].begin <= pos);
    let candidate = *indices.get(after.checked_sub(1)?)?;
    (pos < segments[candidate].end).then_some(candidate)
}

/// Attach `(ref, alt)` read counts from the `AD` field of every biallelic SNV to
/// the segment containing it.
///
/// `sample_name` selects the VCF column; it may be omitted for single-sample
/// files. Returns the mean total (ref + alt) coverage over assigned sites.
pub fn load_allele_counts(
    path: &Path,
    sample_name: Option<&str>,
    segments: &mut [Segment],
) -> Result<f64> {
    let mut reader = bcf::Reader::from_path(path)
        .with_context(|| format!("Failed to open VCF file: {}", path.display()))?;
    let header = reader.header().clone();

    let sample_idx = match sample_name {
        Some(name) => resolve_sample_index(&header, name)?,
        None => {
            if header.sample_count() != 1 {
                anyhow::bail!(
                    "VCF {} has {} samples; use --sample-name to pick one",
                    path.display(),
                    header.sample_count()
                );
            }
            0
        }
    };
    let label = sample_name.unwrap_or("<single sample>").to_string();

    let by_chrom = index_segments(segments);
    let mut total_records: u64 = 0;
    let mut assigned: u64 = 0;
    let mut total_coverage: u64 = 0;

    for result in reader.records() {
        total_records += 1;
        let record = result.context("Failed to read VCF record")?;

        let alleles = record.alleles();
        if alleles.len() != 2 || alleles[0].len() != 1 || alleles[1].len() != 1 {
            continue;
        }

        let rid = record.rid().context("No reference ID")?;
        let chrom = String::from_utf8_lossy(header.rid2name(rid)?).to_string();
        let Some(indices) = by_chrom.get(&chrom) else {
            continue;
        };
        let pos = record.pos() as u64;
        let Some(segment_idx) = find_segment(segments, indices, pos) else {
            continue;
        };

        let counts = match record.format(b"AD").integer() {
            Ok(ad) => ad.get(sample_idx).and_then(|values| {
                if values.len() < 2 || values[0] < 0 || values[1] < 0 {
                    None
                } else {
                    Some((values[0] as usize, values[1] as usize))
                }
            }),
            Err(_) => None,
        };
        let Some((ref_count, alt_count)) = counts else {
            continue;
        };

        segments[segment_idx].allele_counts.push((ref_count, alt_count));
        total_coverage += (ref_count + alt_count) as u64;
        assigned += 1;
    }

    debug!("{}: {} VCF records scanned, {} sites assigned", label, total_records, assigned);
    if assigned == 0 {
        return Err(CallerError::missing_data(
            label,
            format!("no allele counts assigned to segments from {}", path.display()),
        )
        .into());
    }

    let mean = total_coverage as f64 / assigned as f64;
    info!(
        "{}: {} allele sites, mean allele coverage {:.2}",
        label, assigned, mean
    );
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    const HEADER: &str = "##fileformat=VCFv4.2\n\
##contig=<ID=chr1,length=100000>\n\
##contig=<ID=chr2,length=100000>\n\
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
##FORMAT=<ID=AD,Number=R,Type=Integer,Description=\"Allelic depths\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tmother\tchild\n";

    fn write_vcf(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".vcf").tempfile().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn segments() -> Vec<Segment> {
        vec![
            Segment::new("chr1", 0, 1000, 40.0),
            Segment::new("chr1", 1000, 2000, 40.0),
            Segment::new("chr2", 0, 1000, 40.0),
        ]
    }

    #[test]
    fn test_find_segment() {
        let segments = segments();
        let index = index_segments(&segments);
        let chr1 = &index["chr1"];
        assert_eq!(find_segment(&segments, chr1, 0), Some(0));
        assert_eq!(find_segment(&segments, chr1, 999), Some(0));
        assert_eq!(find_segment(&segments, chr1, 1000), Some(1));
        assert_eq!(find_segment(&segments, chr1, 2000), None);
    }

    #[test]
    fn test_load_allele_counts_for_named_sample() {
        let file = write_vcf(
            "chr1\t101\t.\tA\tG\t50\tPASS\t.\tGT:AD\t0/1:10,12\t0/1:20,18\n\
             chr1\t1501\t.\tC\tT\t50\tPASS\t.\tGT:AD\t0/1:8,9\t0/1:15,15\n\
             chr1\t1601\t.\tC\tCT\t50\tPASS\t.\tGT:AD\t0/1:8,9\t0/1:15,15\n\
             chr2\t11\t.\tG\tA,T\t50\tPASS\t.\tGT:AD\t1/2:0,5,5\t1/2:0,5,5\n\
             chr2\t5011\t.\tG\tA\t50\tPASS\t.\tGT:AD\t0/1:5,5\t0/1:5,5\n",
        );
        let mut segments = segments();
        let mean = load_allele_counts(file.path(), Some("child"), &mut segments).unwrap();

        assert_eq!(segments[0].allele_counts, vec![(20, 18)]);
        assert_eq!(segments[1].allele_counts, vec![(15, 15)]);
        assert!(segments[2].allele_counts.is_empty());
        assert_relative_eq!(mean, 34.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_sample_is_rejected() {
        let file = write_vcf("chr1\t101\t.\tA\tG\t50\tPASS\t.\tGT:AD\t0/1:10,12\t0/1:20,18\n");
        let mut segments = segments();
        assert!(load_allele_counts(file.path(), Some("father"), &mut segments).is_err());
        assert!(load_allele_counts(file.path(), None, &mut segments).is_err());
    }

    #[test]
    fn test_no_sites_is_missing_data() {
        let file = write_vcf("chr1\t5001\t.\tA\tG\t50\tPASS\t.\tGT:AD\t0/1:10,12\t0/1:20,18\n");
        let mut segments = segments();
        let err = load_allele_counts(file.path(), Some("mother"), &mut segments).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CallerError>(),
            Some(CallerError::MissingData { .. })
        ));
    }
}
