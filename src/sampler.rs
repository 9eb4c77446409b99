//! Sampler
//!
//! Strategies for sampling the training rows of each tree of the forest.
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleMethod {
    /// Every tree sees every row once.
    None,
    /// Rows drawn with replacement, as many as there are rows.
    Bootstrap,
}

impl SampleMethod {
    pub fn from_bootstrap(bootstrap: bool) -> Self {
        if bootstrap {
            SampleMethod::Bootstrap
        } else {
            SampleMethod::None
        }
    }

    pub fn sampler(&self) -> Box<dyn Sampler> {
        match self {
            SampleMethod::None => Box::new(NoSampler {}),
            SampleMethod::Bootstrap => Box::new(BootstrapSampler {}),
        }
    }
}

// A sampler is used to pick the rows a new tree is fitted on.
pub trait Sampler {
    /// Sample the data, returning a tuple, where the first item is the samples
    /// chosen for training, and the second are the samples never drawn.
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>);
}

pub struct NoSampler {}

impl Sampler for NoSampler {
    fn sample(&mut self, _rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        (index.to_vec(), Vec::new())
    }
}

pub struct BootstrapSampler {}

impl Sampler for BootstrapSampler {
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        if index.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let mut drawn = vec![false; index.len()];
        let mut chosen = Vec::with_capacity(index.len());
        for _ in 0..index.len() {
            let i = rng.gen_range(0..index.len());
            drawn[i] = true;
            chosen.push(index[i]);
        }
        let excluded = index
            .iter()
            .zip(drawn)
            .filter(|(_, d)| !d)
            .map(|(i, _)| *i)
            .collect();
        (chosen, excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_bootstrap_sampler() {
        let mut rng = StdRng::seed_from_u64(42);
        let index: Vec<usize> = (0..100).collect();
        let mut sampler = BootstrapSampler {};
        let (chosen, excluded) = sampler.sample(&mut rng, &index);

        assert_eq!(chosen.len(), index.len());
        // Drawing with replacement leaves some rows out of the bag.
        assert!(!excluded.is_empty());
        assert!(excluded.iter().all(|e| !chosen.contains(e)));

        let mut rng2 = StdRng::seed_from_u64(42);
        let (chosen2, _) = sampler.sample(&mut rng2, &index);
        assert_eq!(chosen, chosen2);
    }

    #[test]
    fn test_no_sampler() {
        let mut rng = StdRng::seed_from_u64(0);
        let index = vec![3, 1, 2];
        let mut sampler = SampleMethod::from_bootstrap(false).sampler();
        let (chosen, excluded) = sampler.sample(&mut rng, &index);
        assert_eq!(chosen, index);
        assert!(excluded.is_empty());
    }
}
