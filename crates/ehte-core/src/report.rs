//! Plain-text and flat-row rendering of an [`EhteReport`].

use std::fmt;

use serde::Serialize;

use crate::dataset::{ArmCatalog, ArmSummary};
use crate::estimator::{EhteReport, Policy};
use crate::ite::IteTable;
use crate::pvalue::ArmStatistics;

/// Heading printed above each policy's results.
pub fn policy_heading(policy: Policy) -> &'static str {
    match policy {
        Policy::AllData => "3-97% percentiles based on actual",
        Policy::Percentiles48 => "Fixed 48 percentiles",
    }
}

/// One line per arm: `treatment: <label>, σ: .., eHTE: .., p-value: ..`.
pub fn render_arm_lines(stats: &ArmStatistics, catalog: &ArmCatalog) -> Vec<String> {
    stats
        .arm_codes()
        .map(|code| {
            let mut line = format!(
                "treatment: {}, σ: {:.5}, eHTE: {:.3}, p-value: {:.3}",
                catalog.display_label(code),
                stats.sigmas[&code],
                stats.normalized_effect_sizes[&code],
                stats.p_values[&code],
            );
            if let Some(reason) = stats.missing.get(&code) {
                line.push_str(&format!(" ({reason})"));
            }
            line
        })
        .collect()
}

/// Fixed-width table of per-arm descriptive statistics.
pub fn render_summary_table(summaries: &[ArmSummary]) -> String {
    let width = summaries
        .iter()
        .map(|s| s.arm_label.chars().count())
        .max()
        .unwrap_or(0)
        .max("Arm".len());
    let mut out = format!(
        "{:<width$}  {:>4}  {:>6}  {:>10}  {:>10}  {:>10}  {:>10}\n",
        "Arm", "Code", "N", "Mean", "SD", "Min", "Max"
    );
    out.push_str(&"-".repeat(width + 2 + 4 + 2 + 6 + 4 * 12));
    out.push('\n');
    for s in summaries {
        out.push_str(&format!(
            "{:<width$}  {:>4}  {:>6}  {:>10.4}  {:>10.4}  {:>10.4}  {:>10.4}\n",
            s.arm_label, s.arm_code, s.count, s.mean, s.std_dev, s.min, s.max
        ));
    }
    out
}

impl fmt::Display for EhteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", render_summary_table(&self.summaries))?;
        writeln!(
            f,
            "placebo sd: {:.5}  null replicates: {}  seed: {}",
            self.placebo_sd, self.n_perms, self.simulation_seed
        )?;
        for policy in Policy::ALL {
            writeln!(f)?;
            writeln!(f, "{}", policy_heading(policy))?;
            for line in render_arm_lines(self.results.get(policy), &self.catalog) {
                writeln!(f, "  {line}")?;
            }
        }
        if !self.diagnostics.is_empty() {
            writeln!(f)?;
            writeln!(f, "diagnostics:")?;
            for d in &self.diagnostics {
                writeln!(f, "  - {d}")?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Flat ITE rows
// ---------------------------------------------------------------------------

/// One ITE record flattened for CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IteRow {
    pub perm: u32,
    pub arm_code: i64,
    pub arm_label: String,
    pub percentile: i32,
    pub treatment_value: f64,
    pub placebo_value: Option<f64>,
    pub ite: Option<f64>,
}

pub fn ite_rows(ite: &IteTable, catalog: &ArmCatalog) -> Vec<IteRow> {
    ite.records
        .iter()
        .map(|r| IteRow {
            perm: r.key.perm,
            arm_code: r.key.arm_code,
            arm_label: catalog.display_label(r.key.arm_code),
            percentile: r.percentile,
            treatment_value: r.treatment_value,
            placebo_value: r.placebo_value,
            ite: r.ite,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, GroupKey, Observation};
    use crate::ite::IteRecord;

    fn catalog() -> ArmCatalog {
        let rows = vec![
            Observation::new("Placebo", 1, 0.0),
            Observation::new("Drug A", 2, 1.0),
        ];
        Dataset::new(rows).unwrap().catalog().clone()
    }

    #[test]
    fn test_arm_line_format() {
        let mut stats = ArmStatistics::default();
        stats.sigmas.insert(2, 0.123456);
        stats.normalized_effect_sizes.insert(2, 1.23456);
        stats.p_values.insert(2, 0.0456);
        let lines = render_arm_lines(&stats, &catalog());
        assert_eq!(
            lines,
            vec!["treatment: Drug A, σ: 0.12346, eHTE: 1.235, p-value: 0.046".to_string()]
        );
    }

    #[test]
    fn test_missing_arm_shows_reason() {
        let mut stats = ArmStatistics::default();
        stats.record_missing(2, "arm 2 has no observations");
        let lines = render_arm_lines(&stats, &catalog());
        assert!(lines[0].contains("σ: NaN"), "{}", lines[0]);
        assert!(lines[0].ends_with("(arm 2 has no observations)"));
    }

    #[test]
    fn test_summary_table_has_row_per_arm() {
        let rows = vec![
            Observation::new("Placebo", 1, 0.0),
            Observation::new("Placebo", 1, 2.0),
            Observation::new("Drug A", 2, 1.0),
        ];
        let table = render_summary_table(&Dataset::new(rows).unwrap().summaries());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Arm"));
        assert!(lines[2].starts_with("Placebo"));
        assert!(lines[2].contains("1.0000"));
    }

    #[test]
    fn test_ite_rows_flatten_keys() {
        let table = IteTable {
            records: vec![IteRecord {
                key: GroupKey::observed(2),
                percentile: 40,
                treatment_value: 1.5,
                placebo_value: None,
                ite: None,
            }],
        };
        let rows = ite_rows(&table, &catalog());
        assert_eq!(rows[0].perm, 0);
        assert_eq!(rows[0].arm_label, "Drug A");
        assert_eq!(rows[0].placebo_value, None);
    }

    #[test]
    fn test_policy_headings() {
        assert_eq!(policy_heading(Policy::AllData), "3-97% percentiles based on actual");
        assert_eq!(policy_heading(Policy::Percentiles48), "Fixed 48 percentiles");
    }
}
