//! Empirical p-values of observed sigma against the null sigma distribution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::GroupKey;
use crate::sigma::SigmaTable;

/// Sigma, normalized effect size and p-value per arm code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStatistics {
    pub sigmas: BTreeMap<i64, f64>,
    /// Observed sigma divided by the placebo's observed sd (the eHTE).
    pub normalized_effect_sizes: BTreeMap<i64, f64>,
    pub p_values: BTreeMap<i64, f64>,
    /// Null replicates with a defined sigma, per arm.
    pub null_replicates: BTreeMap<i64, usize>,
    /// Why an arm's entries are NaN.
    pub missing: BTreeMap<i64, String>,
}

impl ArmStatistics {
    pub fn arm_codes(&self) -> impl Iterator<Item = i64> + '_ {
        self.sigmas.keys().copied()
    }

    /// Mark an arm as failed: NaN in every map, with the reason recorded.
    pub fn record_missing(&mut self, arm_code: i64, reason: impl Into<String>) {
        self.sigmas.insert(arm_code, f64::NAN);
        self.normalized_effect_sizes.insert(arm_code, f64::NAN);
        self.p_values.insert(arm_code, f64::NAN);
        self.null_replicates.entry(arm_code).or_insert(0);
        self.missing.insert(arm_code, reason.into());
    }
}

/// One-sided empirical p-value: `(1 + #{null >= observed}) / (1 + #null)`.
///
/// The observed statistic counts as one member of the reference set, so the
/// smallest reachable value is `1 / (R + 1)`. Non-finite null sigmas are
/// dropped; a non-finite observed sigma yields NaN.
pub fn empirical_p_value(observed: f64, null_sigmas: &[f64]) -> f64 {
    if !observed.is_finite() {
        return f64::NAN;
    }
    let valid = null_sigmas.iter().filter(|s| s.is_finite());
    let (total, at_least) = valid.fold((0usize, 0usize), |(total, ge), &s| {
        (total + 1, ge + usize::from(s >= observed))
    });
    (1 + at_least) as f64 / (1 + total) as f64
}

/// Compare observed sigmas (permutation 0) against null sigmas (permutations >= 1).
///
/// Null replicates with an undefined sigma leave the reference set entirely:
/// they shrink the denominator instead of counting as "below observed".
/// [`ArmStatistics::null_replicates`] reports how many remained.
pub fn compare(
    observed: &SigmaTable,
    null: &SigmaTable,
    placebo_sd: f64,
    arm_codes: &[i64],
) -> ArmStatistics {
    let mut out = ArmStatistics::default();
    for &arm in arm_codes {
        let sigma = match observed.get(&GroupKey::observed(arm)) {
            None => {
                out.record_missing(arm, "no observed ITE rows");
                continue;
            }
            Some(result) => match result.value() {
                Ok(sigma) => sigma,
                Err(e) => {
                    log::warn!("arm {arm}: observed sigma undefined: {e}");
                    out.record_missing(arm, e.to_string());
                    continue;
                }
            },
        };

        let null_results: Vec<_> = null.for_arm(arm).filter(|r| !r.key.is_observed()).collect();
        let null_sigmas: Vec<f64> = null_results
            .iter()
            .filter(|r| r.is_defined())
            .map(|r| r.sigma)
            .collect();
        let dropped = null_results.len() - null_sigmas.len();
        if dropped > 0 {
            log::warn!("arm {arm}: {dropped} null replicate(s) with undefined sigma dropped");
        }

        out.sigmas.insert(arm, sigma);
        out.normalized_effect_sizes.insert(arm, sigma / placebo_sd);
        out.p_values.insert(arm, empirical_p_value(sigma, &null_sigmas));
        out.null_replicates.insert(arm, null_sigmas.len());
    }
    out
}
