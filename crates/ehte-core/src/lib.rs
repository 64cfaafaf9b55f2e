//! # ehte-core
//!
//! **Effective heterogeneity of treatment effect for randomized trials.**
//!
//! Given per-subject change-from-baseline values for a placebo arm and one or
//! more active arms, `ehte-core` estimates how much individual treatment
//! effects vary. Each treatment observation is matched to the placebo value at
//! the same percentile; the standard deviation of those differences (sigma),
//! divided by the placebo sd, is the eHTE. Significance comes from simulated
//! cohorts with no heterogeneity.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ehte_core::{Dataset, EhteConfig, EhteEstimator, Observation};
//!
//! let rows = vec![
//!     Observation::new("Placebo", 1, -0.4),
//!     Observation::new("Placebo", 1, 0.3),
//!     Observation::new("Placebo", 1, 1.1),
//!     Observation::new("Drug A", 2, 0.9),
//!     Observation::new("Drug A", 2, 2.6),
//!     Observation::new("Drug A", 2, 1.4),
//! ];
//! let dataset = Dataset::new(rows).unwrap();
//! let report = EhteEstimator::new(dataset, EhteConfig::default().with_n_perms(1_000))
//!     .unwrap()
//!     .run()
//!     .unwrap();
//! println!("{report}");
//! ```
//!
//! ## Pipeline
//!
//! Dataset → percentile tables → ITE alignment → sigma → p-values
//!
//! The same pipeline runs over the observed data (permutation 0) and over
//! `n_perms` simulated replicates (permutations 1..=n_perms), under two
//! policies:
//! - **all data**: rank-based alignment on the 101-point grid, central 3..=97 band;
//! - **48 percentiles**: grid-based alignment on 48 marks spanning 3..=97.

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod estimator;
pub mod ite;
pub mod pvalue;
pub mod quantile;
pub mod report;
pub mod sigma;
pub mod simulate;

pub use aggregate::{Aggregation, PercentileTable, percentile_tables};
pub use config::{DEFAULT_N_PERMS, DEFAULT_SEED_INDEX, DEFAULT_SEEDS, EhteConfig};
pub use dataset::{
    ArmCatalog, ArmSummary, Dataset, GroupKey, Observation, PLACEBO_CODE, PLACEBO_LABEL,
    TaggedValue,
};
pub use error::{EhteError, Result};
pub use estimator::{EhteEstimator, EhteReport, EhteResults, Policy};
pub use ite::{CentralInterval, IteRecord, IteTable, grid_based, percentile_ranks, rank_based};
pub use pvalue::{ArmStatistics, compare, empirical_p_value};
pub use quantile::{PercentileGrid, PercentilePoint, sas_percentile, sas_percentiles};
pub use report::{IteRow, ite_rows, policy_heading, render_arm_lines, render_summary_table};
pub use sigma::{SigmaResult, SigmaTable, sigma_by_group};
pub use simulate::{ArmTarget, NullModel, SimulationDataset, simulate, simulate_seeded};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
