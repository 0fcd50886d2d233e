use crate::error::{CallerError, Result};
use crate::model::CopyNumberModel;
use crate::statistics::sample_variance;
use crate::types::Segment;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

const DIPLOID: usize = 2;
const MAX_COVERAGE_MARGIN: f64 = 10.0;
const VARIANCE_SCALE: f64 = 2.5;

/// Role of a sample within the family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kinship {
    Parent,
    Proband,
    Offspring,
    /// Unrelated sample called without family structure
    Other,
}

impl Kinship {
    /// Sort key used to order members: parents, then probands, then other offspring.
    pub fn rank(&self) -> u8 {
        match self {
            Kinship::Parent => 0,
            Kinship::Proband => 1,
            Kinship::Offspring => 2,
            Kinship::Other => 3,
        }
    }
}

impl fmt::Display for Kinship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Kinship::Parent => "parent",
            Kinship::Proband => "proband",
            Kinship::Offspring => "offspring",
            Kinship::Other => "other",
        };
        write!(f, "{}", label)
    }
}

/// One row of a pedigree (.ped) file
#[derive(Debug, Clone, PartialEq)]
pub struct PedigreeRecord {
    pub family: String,
    pub sample: String,
    pub maternal: String,
    pub paternal: String,
    pub kinship: Kinship,
}

impl PedigreeRecord {
    fn is_founder(maternal: &str, paternal: &str) -> bool {
        maternal == "0" && paternal == "0"
    }
}

/// Parse a tab-separated pedigree file with columns
/// `family sample maternal paternal sex phenotype`.
pub fn read_pedigree_file(path: &Path) -> Result<Vec<PedigreeRecord>> {
    let text = std::fs::read_to_string(path).map_err(|source| CallerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pedigree(&text)
}

pub fn parse_pedigree(text: &str) -> Result<Vec<PedigreeRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            return Err(CallerError::pedigree(format!(
                "line {}: expected 6 tab-separated fields, found {}",
                line_no + 1,
                fields.len()
            )));
        }
        let (maternal, paternal, phenotype) = (fields[2], fields[3], fields[5]);
        let kinship = if PedigreeRecord::is_founder(maternal, paternal) {
            Kinship::Parent
        } else if phenotype == "affected" || phenotype == "2" {
            Kinship::Proband
        } else {
            Kinship::Offspring
        };
        records.push(PedigreeRecord {
            family: fields[0].to_string(),
            sample: fields[1].to_string(),
            maternal: maternal.to_string(),
            paternal: paternal.to_string(),
            kinship,
        });
    }
    Ok(records)
}

/// Validate the family structure and return the kinship of every input sample, in input order.
pub fn assign_kinships(records: &[PedigreeRecord], sample_names: &[String]) -> Result<Vec<Kinship>> {
    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(record.sample.as_str()) {
            return Err(CallerError::pedigree(format!(
                "sample '{}' listed more than once",
                record.sample
            )));
        }
    }

    let by_name: HashMap<&str, &PedigreeRecord> =
        records.iter().map(|r| (r.sample.as_str(), r)).collect();
    for record in records {
        if !sample_names.iter().any(|name| name == &record.sample) {
            info!("Unused pedigree member: {}", record.sample);
        }
    }

    let mut members = Vec::with_capacity(sample_names.len());
    for name in sample_names {
        let record = by_name.get(name.as_str()).ok_or_else(|| {
            CallerError::pedigree(format!("sample '{}' is missing from the pedigree", name))
        })?;
        members.push(*record);
    }

    let parents: Vec<&str> = members
        .iter()
        .filter(|r| r.kinship == Kinship::Parent)
        .map(|r| r.sample.as_str())
        .collect();
    let probands = members
        .iter()
        .filter(|r| r.kinship == Kinship::Proband)
        .count();
    let children: Vec<&&PedigreeRecord> = members
        .iter()
        .filter(|r| r.kinship != Kinship::Parent)
        .collect();

    if probands > 1 {
        return Err(CallerError::pedigree(format!(
            "{} probands found, at most one is supported",
            probands
        )));
    }
    if !children.is_empty() && parents.len() != 2 {
        return Err(CallerError::pedigree(format!(
            "offspring require exactly two parents, found {}",
            parents.len()
        )));
    }
    for child in children {
        let listed = [child.maternal.as_str(), child.paternal.as_str()];
        if !parents.iter().all(|p| listed.contains(p)) {
            return Err(CallerError::pedigree(format!(
                "parents of '{}' ({}, {}) are not the pedigree parents",
                child.sample, child.maternal, child.paternal
            )));
        }
    }

    Ok(members.iter().map(|r| r.kinship).collect())
}

/// Reference copy-number override for a region of one sample
#[derive(Debug, Clone, PartialEq)]
pub struct PloidyRegion {
    pub chrom: String,
    pub begin: u64,
    pub end: u64,
    pub copy_number: usize,
}

/// Expected copy number per region for one sample; diploid outside any region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PloidyInfo {
    pub regions: Vec<PloidyRegion>,
}

impl PloidyInfo {
    pub fn reference_copy_number(&self, segment: &Segment) -> usize {
        self.regions
            .iter()
            .find(|r| r.chrom == segment.chrom && r.begin < segment.end && segment.begin < r.end)
            .map(|r| r.copy_number)
            .unwrap_or(DIPLOID)
    }
}

/// One sample of the run: its segments, coverage statistics and likelihood model.
#[derive(Debug, Clone)]
pub struct PedigreeMember {
    pub name: String,
    pub kinship: Kinship,
    pub segments: Vec<Segment>,
    pub mean_coverage: f64,
    pub coverage_variance: f64,
    pub mean_allele_coverage: f64,
    pub allele_coverage_variance: f64,
    pub max_coverage: usize,
    pub ploidy: PloidyInfo,
    pub model: CopyNumberModel,
}

/// Read-only part of a member, borrowed apart from its segments
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a> {
    pub name: &'a str,
    pub kinship: Kinship,
    pub model: &'a CopyNumberModel,
    pub ploidy: &'a PloidyInfo,
    pub mean_coverage: f64,
    pub max_coverage: usize,
}

impl PedigreeMember {
    /// Compute coverage statistics and build the sample's model.
    ///
    /// `mean_allele_coverage` is the mean total (ref + alt) read count over the
    /// sample's allele sites.
    pub fn new(
        name: impl Into<String>,
        kinship: Kinship,
        segments: Vec<Segment>,
        mean_allele_coverage: f64,
        ploidy: Option<PloidyInfo>,
        num_states: usize,
    ) -> Result<Self> {
        let name = name.into();
        if segments.is_empty() {
            return Err(CallerError::missing_data(&name, "no segments"));
        }
        if !(mean_allele_coverage.is_finite() && mean_allele_coverage > 0.0) {
            return Err(CallerError::missing_data(
                &name,
                format!("mean allele coverage {} is not usable", mean_allele_coverage),
            ));
        }

        let coverages: Vec<f64> = segments.iter().map(|s| s.median_coverage).collect();
        let mean_coverage = coverages.iter().sum::<f64>() / coverages.len() as f64;
        if !(mean_coverage.is_finite() && mean_coverage > 0.0) {
            return Err(CallerError::missing_data(
                &name,
                format!("mean coverage {} is not usable", mean_coverage),
            ));
        }
        let coverage_variance = sample_variance(&coverages);
        let allele_means: Vec<f64> = segments
            .iter()
            .filter_map(|s| s.mean_allele_coverage())
            .collect();
        let allele_coverage_variance = sample_variance(&allele_means);
        let max_coverage = (coverages.iter().cloned().fold(0.0, f64::max) + MAX_COVERAGE_MARGIN)
            .floor() as usize;

        let model = CopyNumberModel::new(
            num_states,
            mean_coverage / 2.0,
            mean_allele_coverage / 2.0,
            mean_coverage * VARIANCE_SCALE,
            mean_allele_coverage * VARIANCE_SCALE,
            max_coverage,
        );
        debug!(
            "{} ({}): mean coverage {:.2} (var {:.2}), mean allele coverage {:.2} (var {:.2}), max coverage {}",
            name,
            kinship,
            mean_coverage,
            coverage_variance,
            mean_allele_coverage,
            allele_coverage_variance,
            max_coverage
        );

        Ok(Self {
            name,
            kinship,
            segments,
            mean_coverage,
            coverage_variance,
            mean_allele_coverage,
            allele_coverage_variance,
            max_coverage,
            ploidy: ploidy.unwrap_or_default(),
            model,
        })
    }

    pub fn reference_copy_number(&self, segment_index: usize) -> usize {
        self.segments
            .get(segment_index)
            .map(|s| self.ploidy.reference_copy_number(s))
            .unwrap_or(DIPLOID)
    }

    /// Borrow the read-only fields and the mutable segment list at the same time.
    pub fn split_view(&mut self) -> (SampleView<'_>, &mut [Segment]) {
        let view = SampleView {
            name: &self.name,
            kinship: self.kinship,
            model: &self.model,
            ploidy: &self.ploidy,
            mean_coverage: self.mean_coverage,
            max_coverage: self.max_coverage,
        };
        (view, &mut self.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TRIO: &str = "fam\tmother\t0\t0\t2\tunaffected\n\
                        fam\tfather\t0\t0\t1\tunaffected\n\
                        fam\tchild\tmother\tfather\t1\taffected\n";

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_trio_roles() {
        let records = parse_pedigree(TRIO).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kinship, Kinship::Parent);
        assert_eq!(records[2].kinship, Kinship::Proband);

        let kinships =
            assign_kinships(&records, &names(&["child", "mother", "father"])).unwrap();
        assert_eq!(kinships, vec![Kinship::Proband, Kinship::Parent, Kinship::Parent]);
    }

    #[test]
    fn test_unaffected_child_is_offspring() {
        let text = format!("{}fam\tsib\tmother\tfather\t2\t1\n", TRIO);
        let records = parse_pedigree(&text).unwrap();
        assert_eq!(records[3].kinship, Kinship::Offspring);
    }

    #[test]
    fn test_rejects_short_rows() {
        assert!(matches!(
            parse_pedigree("fam\tchild\tmother\n"),
            Err(CallerError::Pedigree(_))
        ));
    }

    #[test]
    fn test_rejects_two_probands() {
        let text = format!("{}fam\tsib\tmother\tfather\t2\taffected\n", TRIO);
        let records = parse_pedigree(&text).unwrap();
        let result = assign_kinships(&records, &names(&["mother", "father", "child", "sib"]));
        assert!(matches!(result, Err(CallerError::Pedigree(_))));
    }

    #[test]
    fn test_rejects_missing_parent() {
        let records = parse_pedigree(TRIO).unwrap();
        let result = assign_kinships(&records, &names(&["mother", "child"]));
        assert!(matches!(result, Err(CallerError::Pedigree(_))));
    }

    #[test]
    fn test_rejects_foreign_parents() {
        let text = "fam\tmother\t0\t0\t2\t1\n\
                    fam\tfather\t0\t0\t1\t1\n\
                    fam\tchild\taunt\tfather\t1\taffected\n";
        let records = parse_pedigree(text).unwrap();
        let result = assign_kinships(&records, &names(&["mother", "father", "child"]));
        assert!(matches!(result, Err(CallerError::Pedigree(_))));
    }

    #[test]
    fn test_rejects_unknown_and_duplicate_samples() {
        let records = parse_pedigree(TRIO).unwrap();
        assert!(assign_kinships(&records, &names(&["mother", "father", "stranger"])).is_err());

        let text = format!("{}fam\tchild\tmother\tfather\t1\taffected\n", TRIO);
        let records = parse_pedigree(&text).unwrap();
        assert!(assign_kinships(&records, &names(&["mother", "father", "child"])).is_err());
    }

    #[test]
    fn test_ploidy_override() {
        let ploidy = PloidyInfo {
            regions: vec![PloidyRegion {
                chrom: "chrX".into(),
                begin: 1000,
                end: 5000,
                copy_number: 1,
            }],
        };
        assert_eq!(ploidy.reference_copy_number(&Segment::new("chrX", 4000, 6000, 20.0)), 1);
        assert_eq!(ploidy.reference_copy_number(&Segment::new("chrX", 5000, 6000, 20.0)), 2);
        assert_eq!(ploidy.reference_copy_number(&Segment::new("chr1", 1000, 2000, 20.0)), 2);
    }

    #[test]
    fn test_member_statistics() {
        let segments = vec![
            Segment::new("chr1", 0, 1000, 38.0),
            Segment::new("chr1", 1000, 2000, 40.0),
            Segment::new("chr1", 2000, 3000, 42.0),
        ];
        let member =
            PedigreeMember::new("s1", Kinship::Other, segments, 40.0, None, 5).unwrap();
        assert_relative_eq!(member.mean_coverage, 40.0, epsilon = 1e-12);
        assert_relative_eq!(member.coverage_variance, 4.0, epsilon = 1e-12);
        assert_eq!(member.max_coverage, 52);
        assert_eq!(member.model.num_states(), 5);
        assert_eq!(member.reference_copy_number(1), 2);
    }

    #[test]
    fn test_member_requires_data() {
        assert!(matches!(
            PedigreeMember::new("s1", Kinship::Other, vec![], 40.0, None, 5),
            Err(CallerError::MissingData { .. })
        ));
        let segments = vec![Segment::new("chr1", 0, 1000, 40.0)];
        assert!(matches!(
            PedigreeMember::new("s1", Kinship::Other, segments, 0.0, None, 5),
            Err(CallerError::MissingData { .. })
        ));
    }
}
