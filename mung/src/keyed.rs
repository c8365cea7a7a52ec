use crate::error::{MungError, Result};
use std::collections::HashMap;

/// Values labelled by sample (or target, or response) keys. Missing
/// values are non-finite.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedVector {
    pub keys: Vec<Box<str>>,
    pub values: Vec<f64>,
}

impl KeyedVector {
    pub fn new(keys: Vec<Box<str>>, values: Vec<f64>) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(MungError::Alignment(format!(
                "{} keys for {} values",
                keys.len(),
                values.len()
            )));
        }
        let mut seen = std::collections::HashSet::with_capacity(keys.len());
        for k in &keys {
            if !seen.insert(k.as_ref()) {
                return Err(MungError::Alignment(format!("duplicate key {}", k)));
            }
        }
        Ok(Self { keys, values })
    }

    pub fn from_pairs<K: Into<Box<str>>>(pairs: impl IntoIterator<Item = (K, f64)>) -> Result<Self> {
        let (keys, values): (Vec<Box<str>>, Vec<f64>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self::new(keys, values)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Finite value at `key`
    pub fn get(&self, key: &str) -> Option<f64> {
        self.keys
            .iter()
            .position(|k| k.as_ref() == key)
            .map(|i| self.values[i])
            .filter(|v| v.is_finite())
    }

    pub fn to_map(&self) -> HashMap<&str, f64> {
        self.keys
            .iter()
            .zip(self.values.iter())
            .map(|(k, &v)| (k.as_ref(), v))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.keys.iter().map(|k| k.as_ref()).zip(self.values.iter().copied())
    }
}

/// Positions `(i, j)` with `a.keys[i] == b.keys[j]`, in the order of
/// `a`. No shared key is a caller bug and reported as an alignment
/// error.
pub fn align_keys(a: &[Box<str>], b: &[Box<str>]) -> Result<Vec<(usize, usize)>> {
    let b_index: HashMap<&str, usize> = b
        .iter()
        .enumerate()
        .map(|(j, k)| (k.as_ref(), j))
        .collect();

    let pairs: Vec<(usize, usize)> = a
        .iter()
        .enumerate()
        .filter_map(|(i, k)| b_index.get(k.as_ref()).map(|&j| (i, j)))
        .collect();

    if pairs.is_empty() && !(a.is_empty() && b.is_empty()) {
        return Err(MungError::Alignment(format!(
            "no shared keys among {} and {} entries",
            a.len(),
            b.len()
        )));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = KeyedVector::from_pairs([("a", 1.0), ("a", 2.0)]).unwrap_err();
        assert!(matches!(err, MungError::Alignment(_)));
    }

    #[test]
    fn align_in_left_order() -> anyhow::Result<()> {
        let a: Vec<Box<str>> = vec!["s3".into(), "s1".into(), "s9".into()];
        let b: Vec<Box<str>> = vec!["s1".into(), "s2".into(), "s3".into()];
        assert_eq!(align_keys(&a, &b)?, vec![(0, 2), (1, 0)]);

        let c: Vec<Box<str>> = vec!["x".into()];
        assert!(align_keys(&a, &c).is_err());
        Ok(())
    }
}
