use crate::error::{CallerError, Result};
use crate::types::Genotype;
use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Every (a, b) with a + b = cn for 0 <= cn < num_states, ordered by copy number then a.
pub fn parental_genotypes(num_states: usize) -> Vec<Genotype> {
    (0..num_states)
        .flat_map(|cn| (0..=cn).map(move |gt| Genotype::new(gt, cn - gt)))
        .collect()
}

/// Genotypes indexed by the copy number they sum to.
pub fn genotypes_by_copy_number(num_states: usize) -> Vec<Vec<Genotype>> {
    (0..num_states)
        .map(|cn| (0..=cn).map(|gt| Genotype::new(gt, cn - gt)).collect())
        .collect()
}

/// Lazy odometer over the cartesian product of `radices[i]` choices per axis.
///
/// Yields index vectors in lexicographic order, last axis fastest. Restartable
/// through `Clone`; an empty radix list yields a single empty vector.
#[derive(Debug, Clone)]
pub struct CartesianProduct {
    radices: Vec<usize>,
    current: Option<Vec<usize>>,
}

impl CartesianProduct {
    pub fn new(radices: Vec<usize>) -> Self {
        let current = if radices.iter().any(|&r| r == 0) {
            None
        } else {
            Some(vec![0; radices.len()])
        };
        Self { radices, current }
    }

    /// Number of combinations, `None` when it does not fit in usize.
    pub fn total(&self) -> Option<usize> {
        self.radices
            .iter()
            .try_fold(1usize, |acc, &r| acc.checked_mul(r))
    }

    /// Decode the `n`-th combination of the lexicographic order.
    pub fn combination_at(&self, mut n: usize) -> Vec<usize> {
        let mut combination = vec![0; self.radices.len()];
        for (slot, &radix) in combination.iter_mut().zip(&self.radices).rev() {
            *slot = n % radix;
            n /= radix;
        }
        combination
    }
}

impl Iterator for CartesianProduct {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        let mut following = current.clone();
        let mut axis = following.len();
        let mut carried = true;
        while carried && axis > 0 {
            axis -= 1;
            following[axis] += 1;
            if following[axis] == self.radices[axis] {
                following[axis] = 0;
            } else {
                carried = false;
            }
        }
        if !carried {
            self.current = Some(following);
        }
        Some(current)
    }
}

/// Joint genotype choices for `num_offspring` children, each picking from `parental`.
///
/// When the product exceeds `cap`, `cap` combinations are drawn without
/// replacement using a `StdRng` seeded with `seed` and returned in
/// lexicographic order.
pub fn offspring_genotype_combinations(
    parental: &[Genotype],
    num_offspring: usize,
    cap: usize,
    seed: u64,
) -> Result<Vec<Vec<Genotype>>> {
    let product = CartesianProduct::new(vec![parental.len(); num_offspring]);
    let total = product.total().ok_or_else(|| {
        CallerError::StateSpace(format!(
            "{} genotypes for {} offspring overflow the combination index",
            parental.len(),
            num_offspring
        ))
    })?;

    let to_genotypes = |choice: Vec<usize>| -> Vec<Genotype> {
        choice.into_iter().map(|i| parental[i]).collect()
    };

    if total <= cap {
        return Ok(product.map(to_genotypes).collect());
    }

    warn!(
        "Subsampling {} of {} offspring genotype combinations (seed {})",
        cap, total, seed
    );
    let mut rng = StdRng::seed_from_u64(seed);
    let mut selected = rand::seq::index::sample(&mut rng, total, cap).into_vec();
    selected.sort_unstable();
    Ok(selected
        .into_iter()
        .map(|n| to_genotypes(product.combination_at(n)))
        .collect())
}

/// All sets of distinct copy-number states of size 1..=max_alleles, each sorted ascending.
pub fn copy_number_combinations(num_states: usize, max_alleles: usize) -> Vec<Vec<usize>> {
    let mut combinations = Vec::new();
    for size in 1..=max_alleles.min(num_states) {
        let mut current: Vec<usize> = (0..size).collect();
        loop {
            combinations.push(current.clone());
            // advance the rightmost position that still has room
            let Some(pos) = (0..size).rev().find(|&i| current[i] < num_states - size + i) else {
                break;
            };
            current[pos] += 1;
            for i in pos + 1..size {
                current[i] = current[i - 1] + 1;
            }
        }
    }
    combinations
}
