//! End-to-end eHTE analysis.
//!
//! ```text
//! Dataset ─┬─ observed placebo + treatment ── ITE ── sigma (perm 0) ──────┐
//!          │                                                             ├─ p-values
//!          └─ null simulation (one seed, placebo sd) ── ITE ── sigma (perm 1..=R) ┘
//! ```
//!
//! Two policies run side by side:
//! - **all data**: rank-based alignment on the full grid, optionally cut to
//!   percentiles 3..=97 before sigma;
//! - **48 percentiles**: grid-based alignment on the 48-point central grid.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::aggregate::{self, Aggregation};
use crate::config::EhteConfig;
use crate::dataset::{ArmCatalog, ArmSummary, Dataset, GroupKey, PLACEBO_CODE, TaggedValue};
use crate::error::{EhteError, Result};
use crate::ite::{self, CentralInterval, IteTable};
use crate::pvalue::{self, ArmStatistics};
use crate::quantile::PercentileGrid;
use crate::sigma::{self, SigmaTable};
use crate::simulate::{self, NullModel, SimulationDataset};

/// The two percentile policies reported side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Policy {
    #[serde(rename = "all data")]
    AllData,
    #[serde(rename = "48 percentiles")]
    Percentiles48,
}

impl Policy {
    pub const ALL: [Policy; 2] = [Policy::AllData, Policy::Percentiles48];

    pub fn key(&self) -> &'static str {
        match self {
            Self::AllData => "all data",
            Self::Percentiles48 => "48 percentiles",
        }
    }
}

/// Per-policy results, serialized as `{"all data": .., "48 percentiles": ..}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EhteResults {
    #[serde(rename = "all data")]
    pub all_data: ArmStatistics,
    #[serde(rename = "48 percentiles")]
    pub percentiles_48: ArmStatistics,
}

impl EhteResults {
    pub fn get(&self, policy: Policy) -> &ArmStatistics {
        match policy {
            Policy::AllData => &self.all_data,
            Policy::Percentiles48 => &self.percentiles_48,
        }
    }

    fn get_mut(&mut self, policy: Policy) -> &mut ArmStatistics {
        match policy {
            Policy::AllData => &mut self.all_data,
            Policy::Percentiles48 => &mut self.percentiles_48,
        }
    }
}

/// Everything one analysis produces.
#[derive(Debug, Clone, Serialize)]
pub struct EhteReport {
    pub catalog: ArmCatalog,
    pub summaries: Vec<ArmSummary>,
    pub placebo_sd: f64,
    pub simulation_seed: u64,
    pub n_perms: u32,
    /// Observed ITE rows of the "all data" policy, for plotting.
    pub ite: IteTable,
    pub results: EhteResults,
    /// Recoverable problems met along the way: one entry per observed group,
    /// one [`EhteError::NullReplicates`] per arm and kind for simulated groups.
    pub diagnostics: Vec<EhteError>,
}

/// Runs the eHTE pipeline over a validated dataset.
#[derive(Debug, Clone)]
pub struct EhteEstimator {
    dataset: Dataset,
    config: EhteConfig,
}

impl EhteEstimator {
    pub fn new(dataset: Dataset, config: EhteConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { dataset, config })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &EhteConfig {
        &self.config
    }

    /// Run both policies and compute p-values.
    ///
    /// Fails only when the placebo arm cannot supply a standard deviation or
    /// the arm selection names the placebo; every per-arm problem becomes NaN
    /// in the results plus an entry in [`EhteReport::diagnostics`].
    pub fn run(&self) -> Result<EhteReport> {
        let seed = self.config.simulation_seed()?;
        let placebo = self.dataset.summary(PLACEBO_CODE);
        if placebo.count < 2 {
            return Err(EhteError::InsufficientData {
                key: GroupKey::observed(PLACEBO_CODE),
                needed: 2,
                got: placebo.count,
            });
        }
        let placebo_sd = placebo.std_dev;

        let mut diagnostics = Diagnostics::default();
        let (arms, degenerate) = self.select_arms()?;
        for &arm_code in &degenerate {
            log::warn!("arm {arm_code} has no observations, skipped");
            diagnostics.push(EhteError::DegenerateArm { arm_code });
        }

        log::info!(
            "eHTE: {} active arm(s), {} null replicate(s) (reference set {}), seed {seed}, placebo sd {placebo_sd:.4}",
            arms.len(),
            self.config.n_perms,
            self.config.reference_set_size()
        );

        let observed_placebo = self.dataset.tagged_observed(&[PLACEBO_CODE]);
        let observed_treatment = self.dataset.tagged_observed(&arms);

        let (null_placebo, null_treatment) = if arms.is_empty() {
            (empty_simulation(), empty_simulation())
        } else {
            let summaries: Vec<ArmSummary> = arms.iter().map(|&c| self.dataset.summary(c)).collect();
            let placebo_model = NullModel::placebo(&placebo)?;
            let active_model = NullModel::active(&summaries, placebo_sd)?;
            (
                simulate::simulate_seeded(seed, &placebo_model, self.config.n_perms)?,
                simulate::simulate_seeded(seed, &active_model, self.config.n_perms)?,
            )
        };
        log::debug!(
            "null cohorts: {} placebo and {} active replicate(s)",
            null_placebo.replicates,
            null_treatment.replicates
        );

        let interval = self
            .config
            .central_interval
            .then_some(CentralInterval::CENTRAL_95);

        // all data: rank-based on the full grid.
        let (observed_ite, observed_sigma) = rank_policy(
            &observed_placebo,
            &observed_treatment,
            &self.config.full_grid,
            interval,
            &mut diagnostics,
        );
        let (_, null_sigma) = rank_policy(
            &null_placebo.values,
            &null_treatment.values,
            &self.config.full_grid,
            interval,
            &mut diagnostics,
        );
        let all_data = pvalue::compare(&observed_sigma, &null_sigma, placebo_sd, &arms);

        // 48 percentiles: grid-based on the reduced grid, never re-filtered.
        let observed_sigma_48 = grid_policy(
            &observed_placebo,
            &observed_treatment,
            &self.config.reduced_grid,
            &mut diagnostics,
        );
        let null_sigma_48 = grid_policy(
            &null_placebo.values,
            &null_treatment.values,
            &self.config.reduced_grid,
            &mut diagnostics,
        );
        let percentiles_48 = pvalue::compare(&observed_sigma_48, &null_sigma_48, placebo_sd, &arms);

        let mut results = EhteResults {
            all_data,
            percentiles_48,
        };
        for policy in Policy::ALL {
            for &arm_code in &degenerate {
                results
                    .get_mut(policy)
                    .record_missing(arm_code, EhteError::DegenerateArm { arm_code }.to_string());
            }
        }

        Ok(EhteReport {
            catalog: self.dataset.catalog().clone(),
            summaries: self.dataset.summaries(),
            placebo_sd,
            simulation_seed: seed,
            n_perms: self.config.n_perms,
            ite: observed_ite,
            results,
            diagnostics: diagnostics.into_vec(),
        })
    }

    /// Split the requested arms into analyzable ones and ones without observations.
    fn select_arms(&self) -> Result<(Vec<i64>, Vec<i64>)> {
        let requested = match &self.config.arms {
            Some(arms) => {
                if arms.contains(&PLACEBO_CODE) {
                    return Err(EhteError::invalid_config(format!(
                        "arm selection includes the placebo code {PLACEBO_CODE}"
                    )));
                }
                let mut arms = arms.clone();
                arms.sort_unstable();
                arms.dedup();
                arms
            }
            None => self.dataset.active_arm_codes(),
        };
        Ok(requested
            .into_iter()
            .partition(|&code| self.dataset.summary(code).count > 0))
    }
}

fn empty_simulation() -> SimulationDataset {
    SimulationDataset {
        replicates: 0,
        values: Vec::new(),
    }
}

fn rank_policy(
    placebo: &[TaggedValue],
    treatment: &[TaggedValue],
    grid: &PercentileGrid,
    interval: Option<CentralInterval>,
    diagnostics: &mut Diagnostics,
) -> (IteTable, SigmaTable) {
    let placebo_tables = aggregate::percentile_tables(placebo, grid);
    collect_failures(&placebo_tables, diagnostics);
    let mut ite = ite::rank_based(&placebo_tables, treatment);
    if let Some(interval) = interval {
        ite = ite.restrict(interval);
    }
    diagnostics.extend(ite.unaligned());
    let sigmas = sigma::sigma_by_group(&ite);
    (ite, sigmas)
}

fn grid_policy(
    placebo: &[TaggedValue],
    treatment: &[TaggedValue],
    grid: &PercentileGrid,
    diagnostics: &mut Diagnostics,
) -> SigmaTable {
    let placebo_tables = aggregate::percentile_tables(placebo, grid);
    let treatment_tables = aggregate::percentile_tables(treatment, grid);
    collect_failures(&placebo_tables, diagnostics);
    collect_failures(&treatment_tables, diagnostics);
    let ite = ite::grid_based(&placebo_tables, &treatment_tables);
    diagnostics.extend(ite.unaligned());
    sigma::sigma_by_group(&ite)
}

fn collect_failures(aggregation: &Aggregation, diagnostics: &mut Diagnostics) {
    diagnostics.extend(aggregation.failures.values().cloned());
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Recoverable errors of one run. Errors on observed data stay one per group;
/// errors on simulated replicates are folded per (arm, kind) so their number
/// does not grow with `n_perms`.
#[derive(Debug, Default)]
struct Diagnostics {
    observed: Vec<EhteError>,
    null: BTreeMap<(i64, &'static str), NullFailures>,
}

#[derive(Debug)]
struct NullFailures {
    perms: BTreeSet<u32>,
    first: EhteError,
}

impl Diagnostics {
    fn push(&mut self, err: EhteError) {
        match err.group_key() {
            Some(key) if !key.is_observed() => {
                let entry = self
                    .null
                    .entry((key.arm_code, err.kind()))
                    .or_insert_with(|| NullFailures {
                        perms: BTreeSet::new(),
                        first: err.clone(),
                    });
                entry.perms.insert(key.perm);
            }
            _ => self.observed.push(err),
        }
    }

    fn into_vec(self) -> Vec<EhteError> {
        let mut out = self.observed;
        for ((arm_code, _), failures) in self.null {
            log::warn!(
                "arm {arm_code}: {} null replicate(s) failed: {}",
                failures.perms.len(),
                failures.first
            );
            out.push(EhteError::NullReplicates {
                arm_code,
                replicates: failures.perms.len(),
                first: Box::new(failures.first),
            });
        }
        out
    }
}

impl Extend<EhteError> for Diagnostics {
    fn extend<I: IntoIterator<Item = EhteError>>(&mut self, iter: I) {
        for err in iter {
            self.push(err);
        }
    }
}
