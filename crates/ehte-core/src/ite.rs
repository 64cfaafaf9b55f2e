//! Individualized treatment effects by quantile alignment against placebo.
//!
//! Two alignment modes feed the same join:
//!
//! - **Rank-based** ([`rank_based`]): every treatment observation gets an
//!   integer percentile rank within its group and is paired with the placebo
//!   value at that percentile. One record per observation.
//! - **Grid-based** ([`grid_based`]): treatment percentile tables are paired
//!   row by row with placebo tables. One record per emitted grid mark.
//!
//! The join is a left join on (permutation, percentile). A treatment row with
//! no placebo counterpart keeps `placebo_value = None` and is excluded from
//! sigma; [`IteTable::unaligned`] reports those rows per group.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::dataset::{GroupKey, TaggedValue};
use crate::error::EhteError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inclusive percentile band retained before sigma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralInterval {
    pub low: i32,
    pub high: i32,
}

impl CentralInterval {
    /// Percentiles 3 through 97.
    pub const CENTRAL_95: Self = Self { low: 3, high: 97 };

    pub fn contains(&self, percentile: i32) -> bool {
        (self.low..=self.high).contains(&percentile)
    }
}

/// One treatment row aligned to its placebo counterfactual.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IteRecord {
    pub key: GroupKey,
    pub percentile: i32,
    pub treatment_value: f64,
    pub placebo_value: Option<f64>,
    pub ite: Option<f64>,
}

impl IteRecord {
    fn join(key: GroupKey, percentile: i32, treatment_value: f64, placebo: &PlaceboLookup) -> Self {
        let placebo_value = placebo.get(key.perm, percentile);
        Self {
            key,
            percentile,
            treatment_value,
            placebo_value,
            ite: placebo_value.map(|p| treatment_value - p),
        }
    }
}

/// ITE records of one computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IteTable {
    pub records: Vec<IteRecord>,
}

impl IteTable {
    /// Keep only rows whose percentile lies inside `interval`.
    pub fn restrict(mut self, interval: CentralInterval) -> Self {
        self.records.retain(|r| interval.contains(r.percentile));
        self
    }

    /// Rows without a placebo match, counted per group.
    pub fn unmatched_by_group(&self) -> BTreeMap<GroupKey, usize> {
        let mut counts = BTreeMap::new();
        for r in self.records.iter().filter(|r| r.placebo_value.is_none()) {
            *counts.entry(r.key).or_insert(0) += 1;
        }
        counts
    }

    pub fn total_unmatched(&self) -> usize {
        self.records.iter().filter(|r| r.placebo_value.is_none()).count()
    }

    /// One [`EhteError::UnalignedGroup`] per group with unmatched rows.
    pub fn unaligned(&self) -> Vec<EhteError> {
        self.unmatched_by_group()
            .into_iter()
            .map(|(key, unmatched)| EhteError::UnalignedGroup { key, unmatched })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Placebo side of the join
// ---------------------------------------------------------------------------

/// Placebo percentile values keyed by (permutation, percentile).
#[derive(Debug, Clone, Default)]
struct PlaceboLookup {
    values: HashMap<(u32, i32), f64>,
}

impl PlaceboLookup {
    fn from_aggregation(placebo: &Aggregation) -> Self {
        let mut values = HashMap::new();
        for table in placebo.tables.values() {
            for row in &table.rows {
                values
                    .entry((table.key.perm, row.percentile()))
                    .or_insert(row.value);
            }
        }
        Self { values }
    }

    fn get(&self, perm: u32, percentile: i32) -> Option<f64> {
        self.values.get(&(perm, percentile)).copied()
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Integer percentile rank of each value: `trunc(average_rank / n * 100)`.
///
/// Tied values share the mean of their 1-based ranks. Output is in input order.
pub fn percentile_ranks(values: &[f64]) -> Vec<i32> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0i32; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // 1-based positions start+1 ..= end share their mean rank.
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let percentile = (average_rank / n as f64 * 100.0) as i32;
        for &idx in &order[start..end] {
            ranks[idx] = percentile;
        }
        start = end;
    }
    ranks
}

// ---------------------------------------------------------------------------
// Alignment
// ---------------------------------------------------------------------------

/// Rank-based alignment: one record per treatment observation, in input order.
pub fn rank_based(placebo: &Aggregation, treatment: &[TaggedValue]) -> IteTable {
    let lookup = PlaceboLookup::from_aggregation(placebo);

    let mut positions: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for (i, tv) in treatment.iter().enumerate() {
        positions.entry(tv.key).or_default().push(i);
    }

    let mut percentiles = vec![0i32; treatment.len()];
    for idxs in positions.values() {
        let group: Vec<f64> = idxs.iter().map(|&i| treatment[i].value).collect();
        for (&i, rank) in idxs.iter().zip(percentile_ranks(&group)) {
            percentiles[i] = rank;
        }
    }

    let records = treatment
        .iter()
        .zip(percentiles)
        .map(|(tv, pct)| IteRecord::join(tv.key, pct, tv.value, &lookup))
        .collect();
    finish(IteTable { records })
}

/// Grid-based alignment: one record per treatment percentile row.
pub fn grid_based(placebo: &Aggregation, treatment: &Aggregation) -> IteTable {
    let lookup = PlaceboLookup::from_aggregation(placebo);
    let records = treatment
        .tables
        .values()
        .flat_map(|table| {
            let lookup = &lookup;
            table
                .rows
                .iter()
                .map(move |row| IteRecord::join(table.key, row.percentile(), row.value, lookup))
        })
        .collect();
    finish(IteTable { records })
}

fn finish(table: IteTable) -> IteTable {
    let unmatched = table.total_unmatched();
    if unmatched > 0 {
        log::warn!(
            "{unmatched} of {} ITE row(s) have no placebo percentile",
            table.len()
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{percentile_tables, tag_observed};
    use crate::quantile::PercentileGrid;

    fn placebo_one_to(n: usize) -> Aggregation {
        let values: Vec<f64> = (1..=n).map(|v| v as f64).collect();
        percentile_tables(&tag_observed(1, &values), &PercentileGrid::FULL)
    }

    #[test]
    fn test_percentile_ranks_distinct() {
        let ranks = percentile_ranks(&[30.0, 10.0, 20.0, 40.0]);
        assert_eq!(ranks, vec![75, 25, 50, 100]);
    }

    #[test]
    fn test_percentile_ranks_ties_share_average() {
        // Sorted: 1, 2, 2, 5 -> ranks 1, 2.5, 2.5, 4 over n = 4.
        let ranks = percentile_ranks(&[2.0, 5.0, 1.0, 2.0]);
        assert_eq!(ranks, vec![62, 100, 25, 62]);
    }

    #[test]
    fn test_percentile_ranks_truncate_toward_zero() {
        // 29 / 100 * 100 = 28.999999999999996 -> 28.
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let ranks = percentile_ranks(&values);
        assert_eq!(ranks[28], 28);
        assert_eq!(ranks[49], 50);
        assert_eq!(ranks[99], 100);
    }

    #[test]
    fn test_rank_based_one_record_per_observation() {
        let placebo = placebo_one_to(4);
        let treatment = tag_observed(2, &[13.0, 11.0, 14.0, 12.0]);
        let table = rank_based(&placebo, &treatment);
        assert_eq!(table.len(), 4);
        assert_eq!(table.total_unmatched(), 0);
        // 13 ranks 3/4 -> 75th placebo percentile: n p = 3 -> mean(x[2], x[3]) = 3.5.
        let first = table.records[0];
        assert_eq!(first.percentile, 75);
        assert_eq!(first.placebo_value, Some(3.5));
        assert_eq!(first.ite, Some(9.5));
        // Input order preserved.
        assert_eq!(table.records[1].treatment_value, 11.0);
    }

    #[test]
    fn test_grid_based_one_record_per_mark() {
        let placebo = placebo_one_to(10);
        let values: Vec<f64> = (1..=10).map(|v| v as f64 + 2.0).collect();
        let treatment = percentile_tables(&tag_observed(2, &values), &PercentileGrid::FULL);
        let table = grid_based(&placebo, &treatment);
        assert_eq!(table.len(), 101);
        assert!(table.records.iter().all(|r| r.ite == Some(2.0)));
    }

    #[test]
    fn test_unmatched_rows_kept_as_missing() {
        // Placebo only exists for permutation 0; treatment rows in permutation 1 have no match.
        let placebo = placebo_one_to(10);
        let treatment = vec![
            TaggedValue::new(GroupKey::new(1, 2), 1.0),
            TaggedValue::new(GroupKey::new(1, 2), 2.0),
        ];
        let table = rank_based(&placebo, &treatment);
        assert_eq!(table.len(), 2);
        assert!(table.records.iter().all(|r| r.ite.is_none()));
        assert_eq!(
            table.unaligned(),
            vec![EhteError::UnalignedGroup {
                key: GroupKey::new(1, 2),
                unmatched: 2
            }]
        );
    }

    #[test]
    fn test_restrict_to_central_interval() {
        let placebo = placebo_one_to(10);
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let treatment = percentile_tables(&tag_observed(2, &values), &PercentileGrid::FULL);
        let table = grid_based(&placebo, &treatment).restrict(CentralInterval::CENTRAL_95);
        assert_eq!(table.len(), 95);
        assert!(table.records.iter().all(|r| (3..=97).contains(&r.percentile)));
    }

    #[test]
    fn test_central_interval_bounds_inclusive() {
        let band = CentralInterval::CENTRAL_95;
        assert!(band.contains(3));
        assert!(band.contains(97));
        assert!(!band.contains(2));
        assert!(!band.contains(98));
    }
}
