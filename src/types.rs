use std::fmt;

/// Allele-count pair whose sum is the copy number it represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Genotype {
    pub counts_a: usize,
    pub counts_b: usize,
}

impl Genotype {
    pub fn new(counts_a: usize, counts_b: usize) -> Self {
        Self { counts_a, counts_b }
    }

    pub fn copy_number(&self) -> usize {
        self.counts_a + self.counts_b
    }

    /// Larger of the two haplotype counts
    pub fn major_count(&self) -> usize {
        self.counts_a.max(self.counts_b)
    }

    /// A child genotype is consistent with a parent when they share at least one count value.
    pub fn is_consistent_with_parent(&self, parent: &Genotype) -> bool {
        parent.counts_a == self.counts_a
            || parent.counts_b == self.counts_a
            || parent.counts_a == self.counts_b
            || parent.counts_b == self.counts_b
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.counts_a, self.counts_b)
    }
}

/// Filter tag attached to a called segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentFilter {
    #[default]
    Pass,
    /// QScore below the quality threshold (`q{threshold}`)
    LowQuality(u32),
}

impl SegmentFilter {
    pub fn is_pass(&self) -> bool {
        matches!(self, SegmentFilter::Pass)
    }
}

impl fmt::Display for SegmentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentFilter::Pass => write!(f, "PASS"),
            SegmentFilter::LowQuality(threshold) => write!(f, "q{}", threshold),
        }
    }
}

/// How samples relate to each other during calling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerMode {
    /// Two parents plus offspring, joint inference through the transition matrix
    Pedigree,
    /// Unrelated samples, each called within a shared copy-number combination
    Independent,
}

/// A genomic interval with aggregated coverage and allele counts, the unit of calling.
///
/// Coordinates are zero-based half-open. Calling fields start unset and are
/// written in place by the caller through the setters below.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub chrom: String,
    pub begin: u64,
    pub end: u64,
    pub median_coverage: f64,
    /// Per-site (ref, alt) read counts of SNVs inside the segment
    pub allele_counts: Vec<(usize, usize)>,
    pub copy_number: usize,
    pub major_chromosome_count: Option<usize>,
    pub major_chromosome_count_score: Option<f64>,
    pub qscore: f64,
    pub dq_score: Option<f64>,
    pub filter: SegmentFilter,
}

impl Segment {
    pub fn new(chrom: impl Into<String>, begin: u64, end: u64, median_coverage: f64) -> Self {
        Self {
            chrom: chrom.into(),
            begin,
            end,
            median_coverage,
            allele_counts: Vec::new(),
            copy_number: 2,
            major_chromosome_count: None,
            major_chromosome_count_score: None,
            qscore: 0.0,
            dq_score: None,
            filter: SegmentFilter::Pass,
        }
    }

    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }

    /// Mean total (ref + alt) coverage over the segment's allele sites
    pub fn mean_allele_coverage(&self) -> Option<f64> {
        if self.allele_counts.is_empty() {
            return None;
        }
        let total: usize = self.allele_counts.iter().map(|(a, b)| a + b).sum();
        Some(total as f64 / self.allele_counts.len() as f64)
    }

    pub fn same_interval(&self, other: &Segment) -> bool {
        self.chrom == other.chrom && self.begin == other.begin && self.end == other.end
    }

    pub fn set_copy_number(&mut self, copy_number: usize) {
        self.copy_number = copy_number;
    }

    pub fn set_quality(&mut self, qscore: f64, filter_threshold: u32) {
        self.qscore = qscore;
        self.filter = if qscore < filter_threshold as f64 {
            SegmentFilter::LowQuality(filter_threshold)
        } else {
            SegmentFilter::Pass
        };
    }

    pub fn set_major_chromosome_count(&mut self, mcc: usize, score: Option<f64>) {
        self.major_chromosome_count = Some(mcc);
        self.major_chromosome_count_score = score;
    }

    pub fn set_de_novo_score(&mut self, dq_score: f64) {
        self.dq_score = Some(dq_score);
    }

    /// Clear results of a previous calling pass
    pub fn reset_calls(&mut self) {
        self.copy_number = 2;
        self.major_chromosome_count = None;
        self.major_chromosome_count_score = None;
        self.qscore = 0.0;
        self.dq_score = None;
        self.filter = SegmentFilter::Pass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_genotype_copy_number() {
        let gt = Genotype::new(1, 2);
        assert_eq!(gt.copy_number(), 3);
        assert_eq!(gt.major_count(), 2);
        assert_eq!(gt.to_string(), "1/2");
    }

    #[test]
    fn test_pedigree_consistency() {
        let parent = Genotype::new(1, 1);
        assert!(Genotype::new(1, 0).is_consistent_with_parent(&parent));
        assert!(Genotype::new(2, 1).is_consistent_with_parent(&parent));
        assert!(!Genotype::new(2, 0).is_consistent_with_parent(&parent));
    }

    #[test]
    fn test_set_quality_filters_low_scores() {
        let mut segment = Segment::new("chr1", 0, 1000, 40.0);
        segment.set_quality(5.0, 7);
        assert_eq!(segment.filter, SegmentFilter::LowQuality(7));
        assert_eq!(segment.filter.to_string(), "q7");

        segment.set_quality(30.0, 7);
        assert_eq!(segment.filter, SegmentFilter::Pass);
    }

    #[test]
    fn test_mean_allele_coverage() {
        let mut segment = Segment::new("chr1", 0, 1000, 40.0);
        assert!(segment.mean_allele_coverage().is_none());
        segment.allele_counts = vec![(10, 10), (15, 5), (0, 30)];
        assert_relative_eq!(segment.mean_allele_coverage().unwrap(), 70.0 / 3.0, epsilon = 1e-12);
    }
}
