use std::path::Path;

use ehte_core::{Dataset, GroupKey, PercentileGrid, PercentileTable};
use serde::Serialize;

pub struct PercentilesCommandConfig<'a> {
    pub input_path: &'a str,
    pub grid: &'a str,
    pub output_path: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PercentileRow {
    arm_code: i64,
    arm_label: String,
    percentile: i32,
    mark: f64,
    value: f64,
}

pub fn run(cfg: PercentilesCommandConfig<'_>) {
    let dataset = super::load_dataset(cfg.input_path).unwrap_or_else(|e| super::fail(e));
    let grid = super::parse_grid(cfg.grid);

    let rows = percentile_rows(&dataset, &grid);
    print_table(&dataset, &rows);

    if let Some(path) = cfg.output_path {
        match write_csv(path, &rows) {
            Ok(()) => println!("\n{} row(s) written to {path}", rows.len()),
            Err(e) => eprintln!("\nFailed to write {path}: {e}"),
        }
    }
}

fn percentile_rows(dataset: &Dataset, grid: &PercentileGrid) -> Vec<PercentileRow> {
    let codes: Vec<i64> = dataset.catalog().codes().collect();
    let aggregation = ehte_core::percentile_tables(&dataset.tagged_observed(&codes), grid);
    for err in aggregation.failures.values() {
        eprintln!("  skipped: {err}");
    }
    codes
        .iter()
        .filter_map(|&code| aggregation.table(&GroupKey::observed(code)))
        .flat_map(|table| rows_of(dataset, table))
        .collect()
}

fn rows_of(dataset: &Dataset, table: &PercentileTable) -> Vec<PercentileRow> {
    let label = dataset.catalog().display_label(table.key.arm_code);
    table
        .rows
        .iter()
        .map(|p| PercentileRow {
            arm_code: table.key.arm_code,
            arm_label: label.clone(),
            percentile: p.percentile(),
            mark: p.mark,
            value: p.value,
        })
        .collect()
}

fn print_table(dataset: &Dataset, rows: &[PercentileRow]) {
    for code in dataset.catalog().codes() {
        let arm_rows: Vec<_> = rows.iter().filter(|r| r.arm_code == code).collect();
        if arm_rows.is_empty() {
            continue;
        }
        println!("{} (code {code}, {} mark(s))", arm_rows[0].arm_label, arm_rows.len());
        for r in arm_rows {
            println!("  {:>3}  {:>12.5}", r.percentile, r.value);
        }
        println!();
    }
}

fn write_csv(path: impl AsRef<Path>, rows: &[PercentileRow]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| e.to_string())?;
    for row in rows {
        writer.serialize(row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}
