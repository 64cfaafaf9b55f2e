use std::path::Path;

use ehte_core::{EhteConfig, EhteEstimator, EhteReport};

pub struct AnalyzeCommandConfig<'a> {
    pub input_path: &'a str,
    pub config_path: Option<&'a str>,
    pub n_perms: Option<u32>,
    pub seed_index: Option<usize>,
    pub arms: Option<&'a str>,
    pub central_interval: bool,
    pub output_path: Option<&'a str>,
    pub ite_output_path: Option<&'a str>,
}

pub fn run(cfg: AnalyzeCommandConfig<'_>) {
    let config = build_config(&cfg).unwrap_or_else(|e| super::fail(e));
    let dataset = super::load_dataset(cfg.input_path).unwrap_or_else(|e| super::fail(e));

    println!(
        "Analyzing {} observation(s) across {} arm(s), {} null replicate(s)...\n",
        dataset.len(),
        dataset.catalog().len(),
        config.n_perms
    );

    let report = EhteEstimator::new(dataset, config)
        .and_then(|est| est.run())
        .unwrap_or_else(|e| super::fail(e));

    print!("{report}");

    if let Some(path) = cfg.output_path {
        match write_json(path, &report) {
            Ok(()) => println!("\nResults written to {path}"),
            Err(e) => eprintln!("\nFailed to write {path}: {e}"),
        }
    }
    if let Some(path) = cfg.ite_output_path {
        match write_ite_csv(path, &report) {
            Ok(n) => println!("{n} ITE row(s) written to {path}"),
            Err(e) => eprintln!("Failed to write {path}: {e}"),
        }
    }
}

/// Defaults, then the JSON config file, then explicit flags.
fn build_config(cfg: &AnalyzeCommandConfig<'_>) -> Result<EhteConfig, String> {
    let mut config = match cfg.config_path {
        Some(path) => {
            let text =
                std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
            serde_json::from_str::<EhteConfig>(&text)
                .map_err(|e| format!("invalid config {path}: {e}"))?
        }
        None => EhteConfig::default(),
    };
    if let Some(n) = cfg.n_perms {
        config.n_perms = n;
    }
    if let Some(i) = cfg.seed_index {
        config.seed_index = i;
    }
    if let Some(list) = cfg.arms {
        config.arms = Some(super::parse_arm_list(list)?);
    }
    if !cfg.central_interval {
        config.central_interval = false;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn write_json(path: impl AsRef<Path>, report: &EhteReport) -> Result<(), String> {
    let json = serde_json::to_string_pretty(report).map_err(|e| e.to_string())?;
    std::fs::write(path, json).map_err(|e| e.to_string())
}

fn write_ite_csv(path: impl AsRef<Path>, report: &EhteReport) -> Result<usize, String> {
    let rows = ehte_core::ite_rows(&report.ite, &report.catalog);
    let mut writer = csv::Writer::from_path(path).map_err(|e| e.to_string())?;
    for row in &rows {
        writer.serialize(row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehte_core::{Dataset, Observation};

    fn base_cfg(config_path: Option<&str>) -> AnalyzeCommandConfig<'_> {
        AnalyzeCommandConfig {
            input_path: "unused.csv",
            config_path,
            n_perms: None,
            seed_index: None,
            arms: None,
            central_interval: true,
            output_path: None,
            ite_output_path: None,
        }
    }

    fn small_report() -> EhteReport {
        let mut rows = Vec::new();
        for i in 0..12 {
            rows.push(Observation::new("Placebo", 1, i as f64 * 0.5));
            rows.push(Observation::new("Drug A", 2, 1.0 + i as f64));
        }
        let config = EhteConfig::default().with_n_perms(10);
        EhteEstimator::new(Dataset::new(rows).unwrap(), config)
            .unwrap()
            .run()
            .unwrap()
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"n_perms": 500, "seed_index": 0}"#).unwrap();
        let path = path.to_str().unwrap();

        let from_file = build_config(&base_cfg(Some(path))).unwrap();
        assert_eq!(from_file.n_perms, 500);
        assert_eq!(from_file.seed_index, 0);

        let mut cfg = base_cfg(Some(path));
        cfg.n_perms = Some(40);
        cfg.arms = Some("2,3");
        cfg.central_interval = false;
        let merged = build_config(&cfg).unwrap();
        assert_eq!(merged.n_perms, 40);
        assert_eq!(merged.seed_index, 0);
        assert_eq!(merged.arms, Some(vec![2, 3]));
        assert!(!merged.central_interval);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = base_cfg(None);
        cfg.n_perms = Some(0);
        assert!(build_config(&cfg).is_err());
        assert!(build_config(&base_cfg(Some("/nonexistent/cfg.json"))).is_err());
    }

    #[test]
    fn test_writes_json_and_ite_csv() {
        let report = small_report();
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("report.json");
        write_json(&json_path, &report).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert!(json["results"]["48 percentiles"]["sigmas"]["2"].is_number());

        let csv_path = dir.path().join("ite.csv");
        let n = write_ite_csv(&csv_path, &report).unwrap();
        assert_eq!(n, report.ite.len());
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(text.starts_with(
            "perm,arm_code,arm_label,percentile,treatment_value,placebo_value,ite"
        ));
        assert_eq!(text.lines().count(), n + 1);
    }
}
