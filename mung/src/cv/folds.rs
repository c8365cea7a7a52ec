use crate::error::{MungError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// One train/test partition of sample indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Anything that partitions `n` samples into folds. Fold generation
/// knows nothing about models and can be tested on its own.
pub trait FoldGenerator {
    /// * `sample_keys` - one key per sample, in matrix row order
    fn folds(&self, sample_keys: &[Box<str>]) -> Result<Vec<Fold>>;
}

/// Hold out every sample once
#[derive(Debug, Clone, Copy, Default)]
pub struct LeaveOneOut;

impl FoldGenerator for LeaveOneOut {
    fn folds(&self, sample_keys: &[Box<str>]) -> Result<Vec<Fold>> {
        let nn = sample_keys.len();
        if nn < 2 {
            return Err(MungError::InsufficientData(format!(
                "leave-one-out needs at least 2 samples, got {}",
                nn
            )));
        }
        Ok((0..nn)
            .map(|i| Fold {
                train: (0..nn).filter(|&j| j != i).collect(),
                test: vec![i],
            })
            .collect())
    }
}

/// Independent random resamples, each holding out `round(f n)`
/// samples drawn without replacement
#[derive(Debug, Clone, Copy)]
pub struct ShuffleSplit {
    pub n_splits: usize,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for ShuffleSplit {
    fn default() -> Self {
        Self {
            n_splits: 10,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl ShuffleSplit {
    pub fn validate(&self) -> Result<()> {
        if self.n_splits == 0 {
            return Err(MungError::InvalidConfig(
                "shuffle-split needs at least one resample".into(),
            ));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(MungError::InvalidConfig(format!(
                "test fraction must be within (0, 1), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }

    /// Number of test samples per resample, kept within `[1, n − 1]`
    pub fn test_size(&self, nn: usize) -> usize {
        let k = (self.test_fraction * nn as f64).round() as usize;
        k.clamp(1, nn.saturating_sub(1).max(1))
    }

    /// Folds over `nn` anonymous samples
    pub fn split(&self, nn: usize) -> Result<Vec<Fold>> {
        self.validate()?;
        if nn < 2 {
            return Err(MungError::InsufficientData(format!(
                "shuffle-split needs at least 2 samples, got {}",
                nn
            )));
        }

        let n_test = self.test_size(nn);

        Ok((0..self.n_splits)
            .map(|r| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(r as u64));
                let mut test = rand::seq::index::sample(&mut rng, nn, n_test).into_vec();
                test.sort_unstable();

                let mut is_test = vec![false; nn];
                for &i in &test {
                    is_test[i] = true;
                }
                let train = (0..nn).filter(|&i| !is_test[i]).collect();
                Fold { train, test }
            })
            .collect())
    }
}

impl FoldGenerator for ShuffleSplit {
    fn folds(&self, sample_keys: &[Box<str>]) -> Result<Vec<Fold>> {
        self.split(sample_keys.len())
    }
}

/// One fold per group: samples whose key starts with the group
/// pattern are held out together (e.g., all time points of one
/// perturbation)
#[derive(Debug, Clone, Default)]
pub struct LeaveGroupOut {
    pub groups: Vec<Box<str>>,
}

impl FoldGenerator for LeaveGroupOut {
    fn folds(&self, sample_keys: &[Box<str>]) -> Result<Vec<Fold>> {
        if self.groups.is_empty() {
            return Err(MungError::InvalidConfig(
                "leave-group-out needs at least one group".into(),
            ));
        }

        let nn = sample_keys.len();
        let mut folds = vec![];

        for group in &self.groups {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..nn).partition(|&i| sample_keys[i].starts_with(&group[..]));

            if test.is_empty() {
                log::warn!("group {} matches no sample", group);
                continue;
            }
            if train.is_empty() {
                return Err(MungError::InvalidConfig(format!(
                    "group {} matches every sample; nothing left to train on",
                    group
                )));
            }
            folds.push(Fold { train, test });
        }
        Ok(folds)
    }
}

/// Cross-validation scheme
#[derive(Debug, Clone)]
pub enum CvScheme {
    LeaveOneOut,
    ShuffleSplit(ShuffleSplit),
    LeaveGroupOut(LeaveGroupOut),
}

impl FoldGenerator for CvScheme {
    fn folds(&self, sample_keys: &[Box<str>]) -> Result<Vec<Fold>> {
        match self {
            CvScheme::LeaveOneOut => LeaveOneOut.folds(sample_keys),
            CvScheme::ShuffleSplit(ss) => ss.folds(sample_keys),
            CvScheme::LeaveGroupOut(lgo) => lgo.folds(sample_keys),
        }
    }
}

impl std::fmt::Display for CvScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CvScheme::LeaveOneOut => write!(f, "leave-one-out"),
            CvScheme::ShuffleSplit(ss) => write!(
                f,
                "shuffle-split ({} x {:.2}, seed {})",
                ss.n_splits, ss.test_fraction, ss.seed
            ),
            CvScheme::LeaveGroupOut(lgo) => {
                write!(f, "leave-group-out ({} groups)", lgo.groups.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn keys(names: &[&str]) -> Vec<Box<str>> {
        names.iter().map(|&s| s.into()).collect()
    }

    fn assert_disjoint(fold: &Fold) {
        let train: HashSet<_> = fold.train.iter().collect();
        let test: HashSet<_> = fold.test.iter().collect();
        assert_eq!(train.len(), fold.train.len());
        assert_eq!(test.len(), fold.test.len());
        assert!(train.is_disjoint(&test));
    }

    #[test]
    fn leave_one_out_covers_everything() -> anyhow::Result<()> {
        let folds = LeaveOneOut.folds(&keys(&["a", "b", "c", "d", "e"]))?;
        assert_eq!(folds.len(), 5);
        for (i, fold) in folds.iter().enumerate() {
            assert_disjoint(fold);
            assert_eq!(fold.test, vec![i]);
            assert_eq!(fold.train.len() + fold.test.len(), 5);
        }
        Ok(())
    }

    #[test]
    fn shuffle_split_sizes_and_reproducibility() -> anyhow::Result<()> {
        let ss = ShuffleSplit {
            n_splits: 20,
            test_fraction: 0.2,
            seed: 7,
        };
        let folds = ss.split(23)?;
        assert_eq!(folds.len(), 20);
        for fold in &folds {
            assert_disjoint(fold);
            assert_eq!(fold.test.len(), 5); // round(4.6)
            assert_eq!(fold.train.len(), 18);
        }
        assert_eq!(folds, ss.split(23)?);

        // resamples differ from each other
        let distinct: HashSet<_> = folds.iter().map(|f| f.test.clone()).collect();
        assert!(distinct.len() > 1);
        Ok(())
    }

    #[test]
    fn shuffle_split_keeps_one_on_each_side() {
        let ss = ShuffleSplit {
            n_splits: 1,
            test_fraction: 0.9,
            seed: 0,
        };
        assert_eq!(ss.test_size(2), 1);
        assert_eq!(ss.test_size(10), 9);

        let ss = ShuffleSplit {
            test_fraction: 0.01,
            ..ss
        };
        assert_eq!(ss.test_size(10), 1);
    }

    #[test]
    fn shuffle_split_rejects_bad_fraction() {
        let ss = ShuffleSplit {
            test_fraction: 1.0,
            ..Default::default()
        };
        assert!(matches!(ss.split(10), Err(MungError::InvalidConfig(_))));
    }

    #[test]
    fn leave_group_out_by_prefix() -> anyhow::Result<()> {
        let samples = keys(&["N_upshift_5", "N_upshift_9", "Rapamycin_5", "NaCl_1", "NaCl_2"]);
        let lgo = LeaveGroupOut {
            groups: keys(&["N_upshift", "Rapamycin", "alpha"]),
        };
        let folds = lgo.folds(&samples)?;
        assert_eq!(folds.len(), 2);
        assert_eq!(folds[0].test, vec![0, 1]);
        assert_eq!(folds[0].train, vec![2, 3, 4]);
        assert_eq!(folds[1].test, vec![2]);

        let all = LeaveGroupOut {
            groups: keys(&["N"]),
        };
        assert!(all.folds(&keys(&["N_upshift_5", "NaCl_1"])).is_err());
        Ok(())
    }
}
