use crate::error::{CallerError, Result};
use std::collections::BTreeMap;

/// Joint likelihood tensor over every sample's copy-number state for one segment.
///
/// Only visited state vectors are stored, keyed by their mixed-radix offset so
/// iteration (and therefore summation) order is fixed. Unset entries read as 0.
#[derive(Debug, Clone)]
pub struct CopyNumberDistribution {
    sample_names: Vec<String>,
    num_states: usize,
    values: BTreeMap<usize, f64>,
}

impl CopyNumberDistribution {
    pub fn new(sample_names: Vec<String>, num_states: usize) -> Result<Self> {
        if sample_names.is_empty() || num_states == 0 {
            return Err(CallerError::StateSpace(
                "joint distribution needs at least one sample and one state".to_string(),
            ));
        }
        num_states
            .checked_pow(sample_names.len() as u32)
            .ok_or_else(|| {
                CallerError::StateSpace(format!(
                    "{} samples with {} states cannot be indexed",
                    sample_names.len(),
                    num_states
                ))
            })?;
        Ok(Self {
            sample_names,
            num_states,
            values: BTreeMap::new(),
        })
    }

    pub fn num_samples(&self) -> usize {
        self.sample_names.len()
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn offset(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.sample_names.len() {
            return Err(CallerError::StateSpace(format!(
                "index has {} axes, distribution has {}",
                index.len(),
                self.sample_names.len()
            )));
        }
        let mut offset = 0;
        for &state in index {
            if state >= self.num_states {
                return Err(CallerError::StateSpace(format!(
                    "state {} outside 0..{}",
                    state, self.num_states
                )));
            }
            offset = offset * self.num_states + state;
        }
        Ok(offset)
    }

    fn decode(&self, mut offset: usize) -> Vec<usize> {
        let mut index = vec![0; self.sample_names.len()];
        for slot in index.iter_mut().rev() {
            *slot = offset % self.num_states;
            offset /= self.num_states;
        }
        index
    }

    pub fn set_joint_probability(&mut self, value: f64, index: &[usize]) -> Result<()> {
        let offset = self.offset(index)?;
        self.values.insert(offset, value);
        Ok(())
    }

    /// Keep the larger of `value` and the stored entry.
    pub fn set_max_joint_probability(&mut self, value: f64, index: &[usize]) -> Result<()> {
        let offset = self.offset(index)?;
        let entry = self.values.entry(offset).or_insert(value);
        if value > *entry {
            *entry = value;
        }
        Ok(())
    }

    pub fn get_joint_probability(&self, index: &[usize]) -> f64 {
        self.offset(index)
            .ok()
            .and_then(|offset| self.values.get(&offset).copied())
            .unwrap_or(0.0)
    }

    /// Unnormalized marginal over the named sample's axis.
    pub fn get_marginal_probability(&self, sample_name: &str) -> Result<Vec<f64>> {
        let axis = self
            .sample_names
            .iter()
            .position(|name| name == sample_name)
            .ok_or_else(|| CallerError::UnknownSample(sample_name.to_string()))?;
        Ok(self.marginal_by_axis(axis))
    }

    pub fn marginal_by_axis(&self, axis: usize) -> Vec<f64> {
        let mut marginal = vec![0.0; self.num_states];
        if axis >= self.sample_names.len() {
            return marginal;
        }
        let stride = self
            .num_states
            .pow((self.sample_names.len() - axis - 1) as u32);
        for (&offset, &value) in &self.values {
            marginal[(offset / stride) % self.num_states] += value;
        }
        marginal
    }

    /// Populated state vectors with their values, in lexicographic order.
    pub fn indices(&self) -> impl Iterator<Item = (Vec<usize>, f64)> + '_ {
        self.values
            .iter()
            .map(move |(&offset, &value)| (self.decode(offset), value))
    }
}
