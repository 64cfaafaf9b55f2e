//! Sigma: the sample standard deviation of ITE values within a group.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::GroupKey;
use crate::error::{EhteError, Result};
use crate::ite::IteTable;

/// Minimum retained ITE values for a defined sigma.
pub const MIN_RETAINED: usize = 2;

/// Heterogeneity statistic of one (permutation, arm) group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SigmaResult {
    pub key: GroupKey,
    /// Sample sd (n - 1) of the retained ITEs; NaN below [`MIN_RETAINED`].
    pub sigma: f64,
    /// ITE rows that entered the statistic.
    pub retained: usize,
    /// Rows dropped for lacking a placebo match.
    pub excluded: usize,
}

impl SigmaResult {
    pub fn is_defined(&self) -> bool {
        self.retained >= MIN_RETAINED && self.sigma.is_finite()
    }

    /// The sigma, or [`EhteError::InsufficientData`] when it is undefined.
    pub fn value(&self) -> Result<f64> {
        if self.is_defined() {
            Ok(self.sigma)
        } else {
            Err(EhteError::InsufficientData {
                key: self.key,
                needed: MIN_RETAINED,
                got: self.retained,
            })
        }
    }
}

/// Sigma per group, ordered by (permutation, arm).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SigmaTable {
    pub results: BTreeMap<GroupKey, SigmaResult>,
}

impl SigmaTable {
    pub fn get(&self, key: &GroupKey) -> Option<&SigmaResult> {
        self.results.get(key)
    }

    /// Results for one arm across all permutations.
    pub fn for_arm(&self, arm_code: i64) -> impl Iterator<Item = &SigmaResult> + '_ {
        self.results
            .values()
            .filter(move |r| r.key.arm_code == arm_code)
    }

    /// Distinct arm codes present, ascending.
    pub fn arm_codes(&self) -> Vec<i64> {
        let mut codes: Vec<i64> = self.results.keys().map(|k| k.arm_code).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Reduce an ITE table to one [`SigmaResult`] per group.
pub fn sigma_by_group(ite: &IteTable) -> SigmaTable {
    let mut retained: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    let mut excluded: BTreeMap<GroupKey, usize> = BTreeMap::new();
    for record in &ite.records {
        let values = retained.entry(record.key).or_default();
        match record.ite {
            Some(v) => values.push(v),
            None => *excluded.entry(record.key).or_insert(0) += 1,
        }
    }

    let results = retained
        .into_iter()
        .map(|(key, values)| {
            let sigma = if values.len() >= MIN_RETAINED {
                sample_std_dev(&values)
            } else {
                f64::NAN
            };
            let result = SigmaResult {
                key,
                sigma,
                retained: values.len(),
                excluded: excluded.get(&key).copied().unwrap_or(0),
            };
            (key, result)
        })
        .collect();
    SigmaTable { results }
}

/// Welford's running variance, n - 1 denominator.
///
/// A constant sample yields exactly zero: every update sees a zero delta.
fn sample_std_dev(values: &[f64]) -> f64 {
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    (m2 / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ite::IteRecord;

    fn record(key: GroupKey, percentile: i32, ite: Option<f64>) -> IteRecord {
        IteRecord {
            key,
            percentile,
            treatment_value: ite.unwrap_or(0.0),
            placebo_value: ite.map(|_| 0.0),
            ite,
        }
    }

    #[test]
    fn test_constant_ite_gives_zero_sigma() {
        let key = GroupKey::observed(2);
        let records = (3..=97).map(|p| record(key, p, Some(1.7))).collect();
        let table = sigma_by_group(&IteTable { records });
        let r = table.get(&key).unwrap();
        assert_eq!(r.sigma, 0.0);
        assert_eq!(r.retained, 95);
        assert_eq!(r.value(), Ok(0.0));
    }

    #[test]
    fn test_sample_sd_uses_n_minus_one() {
        let key = GroupKey::observed(2);
        let records = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .iter()
            .enumerate()
            .map(|(i, &v)| record(key, i as i32, Some(v)))
            .collect();
        let table = sigma_by_group(&IteTable { records });
        // Population sd is 2; sample sd is sqrt(32 / 7).
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((table.get(&key).unwrap().sigma - expected).abs() < 1e-12);
    }

    #[test]
    fn test_missing_ites_excluded() {
        let key = GroupKey::new(4, 3);
        let records = vec![
            record(key, 10, Some(1.0)),
            record(key, 11, None),
            record(key, 12, Some(3.0)),
        ];
        let table = sigma_by_group(&IteTable { records });
        let r = table.get(&key).unwrap();
        assert_eq!(r.retained, 2);
        assert_eq!(r.excluded, 1);
        assert!((r.sigma - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_single_point_is_undefined() {
        let key = GroupKey::observed(2);
        let records = vec![record(key, 50, Some(1.0)), record(key, 51, None)];
        let table = sigma_by_group(&IteTable { records });
        let r = table.get(&key).unwrap();
        assert!(r.sigma.is_nan());
        assert!(!r.is_defined());
        assert_eq!(
            r.value(),
            Err(EhteError::InsufficientData {
                key,
                needed: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_groups_and_arm_lookup() {
        let records = vec![
            record(GroupKey::new(1, 2), 1, Some(1.0)),
            record(GroupKey::new(1, 2), 2, Some(2.0)),
            record(GroupKey::new(2, 2), 1, Some(1.0)),
            record(GroupKey::new(2, 2), 2, Some(4.0)),
            record(GroupKey::new(1, 3), 1, Some(0.0)),
            record(GroupKey::new(1, 3), 2, Some(0.0)),
        ];
        let table = sigma_by_group(&IteTable { records });
        assert_eq!(table.len(), 3);
        assert_eq!(table.arm_codes(), vec![2, 3]);
        assert_eq!(table.for_arm(2).count(), 2);
    }
}
