//! Validated subject-level trial data.
//!
//! [`Dataset::new`] is the single validation pass: everything downstream
//! assumes the placebo arm exists under [`PLACEBO_CODE`], every change value is
//! finite, and arm codes map one-to-one onto arm labels.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::{EhteError, Result};

/// Arm code reserved for the placebo arm.
pub const PLACEBO_CODE: i64 = 1;

/// Label the placebo arm must carry (compared case-insensitively).
pub const PLACEBO_LABEL: &str = "Placebo";

// ---------------------------------------------------------------------------
// Records and keys
// ---------------------------------------------------------------------------

/// One subject's change-from-baseline in one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub arm_label: String,
    pub arm_code: i64,
    pub change: f64,
}

impl Observation {
    pub fn new(arm_label: impl Into<String>, arm_code: i64, change: f64) -> Self {
        Self {
            arm_label: arm_label.into(),
            arm_code,
            change,
        }
    }
}

/// (permutation index, arm code). Index 0 is observed data; 1.. are null replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub perm: u32,
    pub arm_code: i64,
}

impl GroupKey {
    pub fn new(perm: u32, arm_code: i64) -> Self {
        Self { perm, arm_code }
    }

    /// Key for the observed (non-simulated) data of an arm.
    pub fn observed(arm_code: i64) -> Self {
        Self { perm: 0, arm_code }
    }

    pub fn is_observed(&self) -> bool {
        self.perm == 0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(perm {}, arm {})", self.perm, self.arm_code)
    }
}

/// A change value tagged with its permutation group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaggedValue {
    pub key: GroupKey,
    pub value: f64,
}

impl TaggedValue {
    pub fn new(key: GroupKey, value: f64) -> Self {
        Self { key, value }
    }
}

// ---------------------------------------------------------------------------
// Arm catalog
// ---------------------------------------------------------------------------

/// Bijective arm code → arm label lookup, built once from the observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmCatalog {
    labels: BTreeMap<i64, String>,
}

impl ArmCatalog {
    /// Build the catalog, rejecting a code with two labels or a label with two codes.
    pub fn from_observations(observations: &[Observation]) -> Result<Self> {
        let mut labels: BTreeMap<i64, String> = BTreeMap::new();
        let mut codes: BTreeMap<&str, i64> = BTreeMap::new();
        for obs in observations {
            match labels.get(&obs.arm_code) {
                Some(existing) if existing != &obs.arm_label => {
                    return Err(EhteError::invalid_input(format!(
                        "arm code {} is labelled both '{existing}' and '{}'",
                        obs.arm_code, obs.arm_label
                    )));
                }
                Some(_) => {}
                None => {
                    labels.insert(obs.arm_code, obs.arm_label.clone());
                }
            }
            match codes.get(obs.arm_label.as_str()) {
                Some(&code) if code != obs.arm_code => {
                    return Err(EhteError::invalid_input(format!(
                        "arm label '{}' is coded both {code} and {}",
                        obs.arm_label, obs.arm_code
                    )));
                }
                Some(_) => {}
                None => {
                    codes.insert(obs.arm_label.as_str(), obs.arm_code);
                }
            }
        }
        Ok(Self { labels })
    }

    pub fn label(&self, arm_code: i64) -> Option<&str> {
        self.labels.get(&arm_code).map(String::as_str)
    }

    /// Label for display, falling back to the numeric code.
    pub fn display_label(&self, arm_code: i64) -> String {
        self.label(arm_code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("arm {arm_code}"))
    }

    /// All arm codes in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = i64> + '_ {
        self.labels.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Per-arm summaries
// ---------------------------------------------------------------------------

/// Descriptive statistics for one arm. `std_dev` is the sample sd (NaN below 2 subjects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSummary {
    pub arm_code: i64,
    pub arm_label: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl ArmSummary {
    fn from_values(arm_code: i64, arm_label: String, values: &[f64]) -> Self {
        Self {
            arm_code,
            arm_label,
            count: values.len(),
            mean: values.iter().mean(),
            std_dev: values.iter().std_dev(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Validated observations plus their arm catalog.
#[derive(Debug, Clone)]
pub struct Dataset {
    observations: Vec<Observation>,
    catalog: ArmCatalog,
}

impl Dataset {
    /// Validate raw observations.
    ///
    /// Fails when the set is empty, a change value is not finite, codes and
    /// labels conflict, or the placebo arm is missing or not coded
    /// [`PLACEBO_CODE`].
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        if observations.is_empty() {
            return Err(EhteError::invalid_input("dataset has no observations"));
        }
        if let Some((row, obs)) = observations
            .iter()
            .enumerate()
            .find(|(_, o)| !o.change.is_finite())
        {
            return Err(EhteError::invalid_input(format!(
                "row {row}: change value {} for arm '{}' is not finite",
                obs.change, obs.arm_label
            )));
        }

        let catalog = ArmCatalog::from_observations(&observations)?;

        let placebo_codes: Vec<i64> = catalog
            .labels
            .iter()
            .filter(|(_, label)| label.eq_ignore_ascii_case(PLACEBO_LABEL))
            .map(|(&code, _)| code)
            .collect();
        match placebo_codes.as_slice() {
            [] => {
                return Err(EhteError::invalid_input(format!(
                    "no arm labelled '{PLACEBO_LABEL}'"
                )));
            }
            [code] if *code == PLACEBO_CODE => {}
            [code] => {
                return Err(EhteError::invalid_input(format!(
                    "placebo arm must be coded {PLACEBO_CODE}, found {code}"
                )));
            }
            _ => {
                return Err(EhteError::invalid_input(format!(
                    "several arms are labelled '{PLACEBO_LABEL}': {placebo_codes:?}"
                )));
            }
        }

        log::debug!(
            "validated {} observations across {} arms",
            observations.len(),
            catalog.len()
        );
        Ok(Self {
            observations,
            catalog,
        })
    }

    pub fn catalog(&self) -> &ArmCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Active (non-placebo) arm codes in ascending order.
    pub fn active_arm_codes(&self) -> Vec<i64> {
        self.catalog.codes().filter(|&c| c != PLACEBO_CODE).collect()
    }

    /// Change values of one arm, in input order.
    pub fn arm_values(&self, arm_code: i64) -> Vec<f64> {
        self.observations
            .iter()
            .filter(|o| o.arm_code == arm_code)
            .map(|o| o.change)
            .collect()
    }

    /// Observations of the given arms tagged as permutation 0, in input order.
    pub fn tagged_observed(&self, arm_codes: &[i64]) -> Vec<TaggedValue> {
        self.observations
            .iter()
            .filter(|o| arm_codes.contains(&o.arm_code))
            .map(|o| TaggedValue::new(GroupKey::observed(o.arm_code), o.change))
            .collect()
    }

    pub fn summary(&self, arm_code: i64) -> ArmSummary {
        ArmSummary::from_values(
            arm_code,
            self.catalog.display_label(arm_code),
            &self.arm_values(arm_code),
        )
    }

    /// One summary per arm, ascending by code.
    pub fn summaries(&self) -> Vec<ArmSummary> {
        self.catalog.codes().map(|c| self.summary(c)).collect()
    }
}
