//! Group tagged values by (permutation, arm) and reduce each group to a
//! percentile table.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::{GroupKey, TaggedValue};
use crate::error::EhteError;
use crate::quantile::{self, PercentileGrid, PercentilePoint};

/// Percentile rows of one group, ascending by mark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileTable {
    pub key: GroupKey,
    pub rows: Vec<PercentilePoint>,
}

impl PercentileTable {
    pub fn percentiles(&self) -> impl Iterator<Item = i32> + '_ {
        self.rows.iter().map(PercentilePoint::percentile)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Tables for every group that had enough data, plus per-group failures.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub tables: BTreeMap<GroupKey, PercentileTable>,
    pub failures: BTreeMap<GroupKey, EhteError>,
}

impl Aggregation {
    pub fn table(&self, key: &GroupKey) -> Option<&PercentileTable> {
        self.tables.get(key)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(PercentileTable::len).sum()
    }
}

/// Group values in one pass, keeping input order within each group.
pub fn group_values(values: &[TaggedValue]) -> BTreeMap<GroupKey, Vec<f64>> {
    let mut groups: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for tv in values {
        groups.entry(tv.key).or_default().push(tv.value);
    }
    groups
}

/// Group values and sort each group ascending.
pub fn group_sorted(values: &[TaggedValue]) -> BTreeMap<GroupKey, Vec<f64>> {
    let mut groups = group_values(values);
    for group in groups.values_mut() {
        quantile::sort_ascending(group);
    }
    groups
}

/// Tag a bare sample as observed data (permutation 0) for one arm.
pub fn tag_observed(arm_code: i64, values: &[f64]) -> Vec<TaggedValue> {
    let key = GroupKey::observed(arm_code);
    values.iter().map(|&v| TaggedValue::new(key, v)).collect()
}

/// Percentile table per (permutation, arm) group over `grid`.
///
/// Groups with fewer than two values land in [`Aggregation::failures`] as
/// [`EhteError::InsufficientData`]; the remaining groups are unaffected.
pub fn percentile_tables(values: &[TaggedValue], grid: &PercentileGrid) -> Aggregation {
    let mut out = Aggregation::default();
    for (key, sorted) in group_sorted(values) {
        match quantile::sas_percentiles(&sorted, grid) {
            Ok(points) => {
                out.tables.insert(
                    key,
                    PercentileTable {
                        key,
                        rows: points.collect(),
                    },
                );
            }
            Err(e) => {
                log::debug!("{key}: percentiles skipped: {e}");
                out.failures.insert(key, e.in_group(key));
            }
        }
    }
    log::debug!(
        "aggregated {} group(s), {} row(s), {} failure(s)",
        out.tables.len(),
        out.total_rows(),
        out.failures.len()
    );
    out
}
