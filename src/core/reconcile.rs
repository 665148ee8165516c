//! Cell-level diff of two record collections describing the same entities.
//!
//! Rows are paired by position unless an identity column is given. Only
//! columns present on both sides are compared; the remainders are listed in
//! the [`ColumnAlignment`]. Equality is exact and type-aware, so an absent
//! cell, a null cell and an empty string are three different things.

use crate::core::flatten::flatten_all;
use crate::core::tabular::cell_text;
use crate::domain::model::{FlatRecord, Record};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// Rows compared by default, matching the size of a manual spot check.
pub const DEFAULT_ROW_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnAlignment {
    pub common: Vec<String>,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
}

/// Sorted column sets of two flat collections.
pub fn align(a: &[FlatRecord], b: &[FlatRecord]) -> ColumnAlignment {
    let columns_a = column_set(a);
    let columns_b = column_set(b);

    ColumnAlignment {
        common: columns_a.intersection(&columns_b).cloned().collect(),
        only_in_a: columns_a.difference(&columns_b).cloned().collect(),
        only_in_b: columns_b.difference(&columns_a).cloned().collect(),
    }
}

fn column_set(records: &[FlatRecord]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|record| record.columns().cloned())
        .collect()
}

/// One differing cell. `None` means the column is absent from that row.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrepancy {
    /// Position of the row in collection A.
    pub row: usize,
    pub column: String,
    pub a: Option<Value>,
    pub b: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub delimiter: String,
    pub labels: (String, String),
    /// Maximum number of row pairs compared; `None` compares all.
    pub row_limit: Option<usize>,
    /// Flattened column used to pair rows instead of position.
    pub identity_column: Option<String>,
    /// Crosstabs are only built for columns with at most this many distinct pairs.
    pub crosstab_max_cardinality: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            delimiter: ".".to_string(),
            labels: ("a".to_string(), "b".to_string()),
            row_limit: None,
            identity_column: None,
            crosstab_max_cardinality: 20,
        }
    }
}

impl ReconcileOptions {
    pub fn with_labels(mut self, a: &str, b: &str) -> Self {
        self.labels = (a.to_string(), b.to_string());
        self
    }

    pub fn with_row_limit(mut self, limit: Option<usize>) -> Self {
        self.row_limit = limit;
        self
    }

    pub fn with_identity_column(mut self, column: Option<String>) -> Self {
        self.identity_column = column;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullCounts {
    pub a: usize,
    pub b: usize,
}

/// Counts of `(value in A, value in B)` among the discrepancies of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crosstab {
    pub column: String,
    pub pairs: BTreeMap<(String, String), usize>,
}

/// A value found in A under `from_column` and in B only under `to_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub from_column: String,
    pub to_column: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub labels: (String, String),
    pub rows_a: usize,
    pub rows_b: usize,
    pub compared_rows: usize,
    /// Paired rows left uncompared because of `row_limit`.
    pub beyond_limit: usize,
    /// Rows with no counterpart on the other side.
    pub unmatched_a: usize,
    pub unmatched_b: usize,
    pub alignment: ColumnAlignment,
    pub discrepancies: Vec<Discrepancy>,
    /// Absent or null cells per column, over every row of each side.
    pub null_counts: BTreeMap<String, NullCounts>,
    pub crosstabs: Vec<Crosstab>,
    pub migrations: Vec<Migration>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
            && self.alignment.only_in_a.is_empty()
            && self.alignment.only_in_b.is_empty()
            && self.rows_a == self.rows_b
    }

    pub fn discrepancy_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for discrepancy in &self.discrepancies {
            *counts.entry(discrepancy.column.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn discrepancies_in<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Discrepancy> {
        self.discrepancies.iter().filter(move |d| d.column == column)
    }

    pub fn crosstab(&self, column: &str) -> Option<&Crosstab> {
        self.crosstabs.iter().find(|c| c.column == column)
    }
}

pub struct Reconciler {
    options: ReconcileOptions,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileOptions::default())
    }
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Flattens both collections, then compares them.
    pub fn reconcile(&self, a: &[Record], b: &[Record]) -> ReconciliationReport {
        let flat_a = flatten_all(a, &self.options.delimiter);
        let flat_b = flatten_all(b, &self.options.delimiter);
        self.reconcile_flat(&flat_a, &flat_b)
    }

    pub fn reconcile_flat(&self, a: &[FlatRecord], b: &[FlatRecord]) -> ReconciliationReport {
        let alignment = align(a, b);
        let all_pairs = self.pair_rows(a, b);
        let matched_a: HashSet<usize> = all_pairs.iter().map(|(i, _)| *i).collect();
        let matched_b: HashSet<usize> = all_pairs.iter().map(|(_, j)| *j).collect();

        let limit = self.options.row_limit.unwrap_or(usize::MAX);
        let pairs = &all_pairs[..all_pairs.len().min(limit)];
        let beyond_limit = all_pairs.len() - pairs.len();

        tracing::debug!(
            "Comparing {} row pair(s) over {} common column(s)",
            pairs.len(),
            alignment.common.len()
        );
        if beyond_limit > 0 {
            tracing::info!("Row limit {} leaves {} pair(s) uncompared", limit, beyond_limit);
        }

        let mut discrepancies = Vec::new();
        let mut moved: BTreeMap<(String, String), usize> = BTreeMap::new();

        for &(i, j) in pairs {
            let (row_a, row_b) = (&a[i], &b[j]);
            for column in &alignment.common {
                let value_a = row_a.get(column);
                let value_b = row_b.get(column);
                if value_a == value_b {
                    continue;
                }

                if let Some(value) = value_a.filter(|v| is_traceable(v)) {
                    if value_b.map_or(true, Value::is_null) {
                        for (other, _) in row_b
                            .data
                            .iter()
                            .filter(|(other, candidate)| *other != column && *candidate == value)
                        {
                            *moved.entry((column.clone(), other.clone())).or_insert(0) += 1;
                        }
                    }
                }

                discrepancies.push(Discrepancy {
                    row: i,
                    column: column.clone(),
                    a: value_a.cloned(),
                    b: value_b.cloned(),
                });
            }
        }

        let crosstabs = self.crosstabs(&discrepancies);
        let migrations = moved
            .into_iter()
            .map(|((from_column, to_column), count)| Migration {
                from_column,
                to_column,
                count,
            })
            .collect();

        let report = ReconciliationReport {
            labels: self.options.labels.clone(),
            rows_a: a.len(),
            rows_b: b.len(),
            compared_rows: pairs.len(),
            beyond_limit,
            unmatched_a: a.len() - matched_a.len(),
            unmatched_b: b.len() - matched_b.len(),
            null_counts: null_counts(a, b, &alignment),
            alignment,
            discrepancies,
            crosstabs,
            migrations,
        };

        if !report.is_consistent() {
            tracing::warn!(
                "⚠️ {} discrepancies between {} and {}",
                report.discrepancies.len(),
                report.labels.0,
                report.labels.1
            );
        }
        report
    }

    /// Every row pair, in A's order; the row limit is applied by the caller.
    fn pair_rows(&self, a: &[FlatRecord], b: &[FlatRecord]) -> Vec<(usize, usize)> {
        let Some(identity) = &self.options.identity_column else {
            return (0..a.len().min(b.len())).map(|i| (i, i)).collect();
        };

        let mut index_b: HashMap<String, usize> = HashMap::new();
        for (j, row) in b.iter().enumerate() {
            if let Some(key) = identity_key(row, identity) {
                index_b.entry(key).or_insert(j);
            }
        }

        a.iter()
            .enumerate()
            .filter_map(|(i, row)| {
                identity_key(row, identity)
                    .and_then(|key| index_b.remove(&key))
                    .map(|j| (i, j))
            })
            .collect()
    }

    fn crosstabs(&self, discrepancies: &[Discrepancy]) -> Vec<Crosstab> {
        let mut by_column: BTreeMap<&str, BTreeMap<(String, String), usize>> = BTreeMap::new();
        for discrepancy in discrepancies {
            let pair = (render(discrepancy.a.as_ref()), render(discrepancy.b.as_ref()));
            *by_column
                .entry(discrepancy.column.as_str())
                .or_default()
                .entry(pair)
                .or_insert(0) += 1;
        }

        by_column
            .into_iter()
            .filter(|(column, pairs)| {
                let bounded = pairs.len() <= self.options.crosstab_max_cardinality;
                if !bounded {
                    tracing::debug!(
                        "Skipping crosstab for {}: {} distinct pairs",
                        column,
                        pairs.len()
                    );
                }
                bounded
            })
            .map(|(column, pairs)| Crosstab {
                column: column.to_string(),
                pairs,
            })
            .collect()
    }
}

fn identity_key(row: &FlatRecord, column: &str) -> Option<String> {
    row.get(column)
        .filter(|value| !value.is_null())
        .map(cell_text)
}

/// Values distinctive enough to follow into another column.
fn is_traceable(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.is_empty(),
        Value::Number(_) => true,
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

/// JSON text of a cell, so `1` and `"1"` stay apart.
fn render(value: Option<&Value>) -> String {
    match value {
        None => "<absent>".to_string(),
        Some(Value::Null) => "<null>".to_string(),
        Some(value) => value.to_string(),
    }
}

fn null_counts(
    a: &[FlatRecord],
    b: &[FlatRecord],
    alignment: &ColumnAlignment,
) -> BTreeMap<String, NullCounts> {
    let missing = |records: &[FlatRecord], column: &str| {
        records
            .iter()
            .filter(|row| row.get(column).map_or(true, Value::is_null))
            .count()
    };

    alignment
        .common
        .iter()
        .chain(&alignment.only_in_a)
        .chain(&alignment.only_in_b)
        .map(|column| {
            (
                column.clone(),
                NullCounts {
                    a: missing(a, column),
                    b: missing(b, column),
                },
            )
        })
        .collect()
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label_a, label_b) = (&self.labels.0, &self.labels.1);

        writeln!(f, "Number of items in {}: {}", label_a, self.rows_a)?;
        writeln!(f, "Number of items in {}: {}", label_b, self.rows_b)?;
        writeln!(
            f,
            "Compared rows: {} (unmatched: {} in {}, {} in {})",
            self.compared_rows, self.unmatched_a, label_a, self.unmatched_b, label_b
        )?;
        if self.beyond_limit > 0 {
            writeln!(f, "Not compared (row limit): {} pair(s)", self.beyond_limit)?;
        }
        writeln!(f, "Extra columns in {}: {:?}", label_a, self.alignment.only_in_a)?;
        writeln!(f, "Extra columns in {}: {:?}", label_b, self.alignment.only_in_b)?;

        let counts = self.discrepancy_counts();
        writeln!(
            f,
            "Differing cells: {} across {} column(s)",
            self.discrepancies.len(),
            counts.len()
        )?;
        for (column, count) in &counts {
            writeln!(f, "  {}: {}", column, count)?;
        }

        let missing: Vec<_> = self
            .null_counts
            .iter()
            .filter(|(_, n)| n.a > 0 || n.b > 0)
            .collect();
        if !missing.is_empty() {
            writeln!(f, "Missing or null values:")?;
            for (column, n) in missing {
                writeln!(f, "  {}: {} in {}, {} in {}", column, n.a, label_a, n.b, label_b)?;
            }
        }

        for crosstab in &self.crosstabs {
            writeln!(f, "Value pairs in {} ({} -> {}):", crosstab.column, label_a, label_b)?;
            for ((value_a, value_b), count) in &crosstab.pairs {
                writeln!(f, "  {} -> {}: {}", value_a, value_b, count)?;
            }
        }

        if !self.migrations.is_empty() {
            writeln!(f, "Values found under another column in {}:", label_b)?;
            for migration in &self.migrations {
                writeln!(
                    f,
                    "  {} -> {}: {}",
                    migration.from_column, migration.to_column, migration.count
                )?;
            }
        }
        Ok(())
    }
}
