use crate::error::{CallerError, Result};
use serde::Deserialize;
use std::path::Path;

/// Immutable calling configuration shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PedigreeCallerParameters {
    /// Number of copy-number states considered (states 0..maximum_copy_number-1)
    pub maximum_copy_number: usize,
    /// Maximum number of distinct copy-number states per segment in independent mode
    pub max_allele_number: usize,
    /// Minimum allele sites per sample before MCC is attempted
    pub min_allele_counts: usize,
    /// Maximum bp per allele site before MCC is skipped
    pub allele_density_threshold: f64,
    pub max_qscore: f64,
    pub quality_filter_threshold: u32,
    pub de_novo_quality_filter_threshold: u32,
    pub max_num_offspring_genotypes: usize,
    pub de_novo_rate: f64,
    pub minimum_call_size: u64,
    pub maximum_merge_span: u64,
    /// Upper bound on the number of parallel segment ranges
    pub max_core_number: usize,
    /// Segment coverage is capped at this multiple of the sample mean before lookup
    pub coverage_multiplier_cap: f64,
    pub subsampling_seed: u64,
}

impl Default for PedigreeCallerParameters {
    fn default() -> Self {
        Self {
            maximum_copy_number: 5,
            max_allele_number: 3,
            min_allele_counts: 10,
            allele_density_threshold: 100_000.0,
            max_qscore: 60.0,
            quality_filter_threshold: 7,
            de_novo_quality_filter_threshold: 20,
            max_num_offspring_genotypes: 500,
            de_novo_rate: 1e-5,
            minimum_call_size: 1000,
            maximum_merge_span: 10_000,
            max_core_number: 30,
            coverage_multiplier_cap: 3.0,
            subsampling_seed: 0,
        }
    }
}

impl PedigreeCallerParameters {
    /// Load parameters from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CallerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.maximum_copy_number < 3 {
            return Err(CallerError::invalid_parameter(format!(
                "maximum_copy_number must be at least 3 to include the diploid state, got {}",
                self.maximum_copy_number
            )));
        }
        if self.max_allele_number == 0 {
            return Err(CallerError::invalid_parameter("max_allele_number must be at least 1"));
        }
        if self.max_num_offspring_genotypes == 0 {
            return Err(CallerError::invalid_parameter(
                "max_num_offspring_genotypes must be at least 1",
            ));
        }
        if !(self.max_qscore > 0.0) {
            return Err(CallerError::invalid_parameter("max_qscore must be positive"));
        }
        if !(0.0..=1.0).contains(&self.de_novo_rate) {
            return Err(CallerError::invalid_parameter(format!(
                "de_novo_rate must lie in [0, 1], got {}",
                self.de_novo_rate
            )));
        }
        if self.max_core_number == 0 {
            return Err(CallerError::invalid_parameter("max_core_number must be at least 1"));
        }
        if !(self.coverage_multiplier_cap > 0.0) {
            return Err(CallerError::invalid_parameter("coverage_multiplier_cap must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PedigreeCallerParameters::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_missing_diploid_state() {
        let params = PedigreeCallerParameters {
            maximum_copy_number: 2,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(CallerError::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_de_novo_rate_outside_unit_interval() {
        let params = PedigreeCallerParameters {
            de_novo_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(CallerError::InvalidParameter(_))));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maximum_copy_number": 6, "subsampling_seed": 42}}"#).unwrap();

        let params = PedigreeCallerParameters::from_json_file(file.path()).unwrap();
        assert_eq!(params.maximum_copy_number, 6);
        assert_eq!(params.subsampling_seed, 42);
        assert_eq!(params.max_num_offspring_genotypes, 500);
        assert_eq!(params.quality_filter_threshold, 7);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            PedigreeCallerParameters::from_json_file(file.path()),
            Err(CallerError::Json(_))
        ));
    }
}
