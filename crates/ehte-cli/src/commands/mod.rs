pub mod analyze;
pub mod percentiles;

use std::path::Path;

use ehte_core::{Dataset, Observation, PercentileGrid};
use serde::Deserialize;

/// One input row: `TRT01P,TRT01PN,CHG`.
#[derive(Debug, Deserialize)]
struct InputRecord {
    #[serde(rename = "TRT01P")]
    arm_label: String,
    #[serde(rename = "TRT01PN")]
    arm_code: i64,
    #[serde(rename = "CHG")]
    change: f64,
}

impl From<InputRecord> for Observation {
    fn from(r: InputRecord) -> Self {
        Observation::new(r.arm_label.trim(), r.arm_code, r.change)
    }
}

/// Read and validate a trial CSV. Errors are returned as display strings.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset, String> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let mut observations = Vec::new();
    for (i, record) in reader.deserialize::<InputRecord>().enumerate() {
        let record = record.map_err(|e| format!("{}: record {}: {e}", path.display(), i + 1))?;
        observations.push(Observation::from(record));
    }
    log::debug!("read {} row(s) from {}", observations.len(), path.display());
    Dataset::new(observations).map_err(|e| format!("{}: {e}", path.display()))
}

/// Parse a comma-separated list of arm codes.
pub fn parse_arm_list(list: &str) -> Result<Vec<i64>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|e| format!("bad arm code '{s}': {e}")))
        .collect()
}

pub fn parse_grid(name: &str) -> PercentileGrid {
    match name {
        "central48" => PercentileGrid::CENTRAL_48,
        _ => PercentileGrid::FULL,
    }
}

/// `warn` by default; each `-v` raises one level. `RUST_LOG` wins when set.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Print an error and exit with status 1.
pub fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}
