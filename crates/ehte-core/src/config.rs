//! Analysis configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EhteError, Result};
use crate::quantile::PercentileGrid;

/// Default number of requested null replicates.
pub const DEFAULT_N_PERMS: u32 = 10_000;

/// Fixed seed list; [`DEFAULT_SEED_INDEX`] selects the one used for simulation.
pub const DEFAULT_SEEDS: [u64; 15] = [
    123, 456, 789, 987, 654, 321, 102, 103, 104, 105, 106, 107, 108, 109, 110,
];

/// Index into the seed list used for both the placebo and the active-arm simulation.
pub const DEFAULT_SEED_INDEX: usize = 1;

/// Settings for one eHTE analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EhteConfig {
    /// Requested null replicates. The reference set for the p-value holds
    /// `n_perms + 1` members (the observed statistic counts once).
    pub n_perms: u32,
    /// Alternate seeds.
    pub seeds: Vec<u64>,
    /// Which seed drives both simulation calls.
    pub seed_index: usize,
    /// Grid for the rank-based ("all data") policy.
    pub full_grid: PercentileGrid,
    /// Grid for the reduced ("48 percentiles") policy.
    pub reduced_grid: PercentileGrid,
    /// Restrict the rank-based policy to percentiles 3..=97 before sigma.
    pub central_interval: bool,
    /// Active arms to analyze; `None` means every non-placebo arm in the data.
    pub arms: Option<Vec<i64>>,
}

impl Default for EhteConfig {
    fn default() -> Self {
        Self {
            n_perms: DEFAULT_N_PERMS,
            seeds: DEFAULT_SEEDS.to_vec(),
            seed_index: DEFAULT_SEED_INDEX,
            full_grid: PercentileGrid::FULL,
            reduced_grid: PercentileGrid::CENTRAL_48,
            central_interval: true,
            arms: None,
        }
    }
}

impl EhteConfig {
    pub fn with_n_perms(mut self, n_perms: u32) -> Self {
        self.n_perms = n_perms;
        self
    }

    pub fn with_seed_index(mut self, seed_index: usize) -> Self {
        self.seed_index = seed_index;
        self
    }

    pub fn with_arms(mut self, arms: Vec<i64>) -> Self {
        self.arms = Some(arms);
        self
    }

    /// The seed used for both null simulations.
    pub fn simulation_seed(&self) -> Result<u64> {
        self.seeds.get(self.seed_index).copied().ok_or_else(|| {
            EhteError::invalid_config(format!(
                "seed index {} out of range for {} seed(s)",
                self.seed_index,
                self.seeds.len()
            ))
        })
    }

    /// Size of the p-value reference set.
    pub fn reference_set_size(&self) -> u64 {
        u64::from(self.n_perms) + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_perms == 0 {
            return Err(EhteError::invalid_config("n_perms must be at least 1"));
        }
        self.simulation_seed()?;
        self.full_grid.validate()?;
        self.reduced_grid.validate()?;
        if let Some(arms) = &self.arms {
            if arms.is_empty() {
                return Err(EhteError::invalid_config("arm selection is empty"));
            }
        }
        Ok(())
    }
}
