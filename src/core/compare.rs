//! Cross-checks of files saved by the different retrieval paths.
//!
//! A data directory holds at most one file per `(prefix, extension)`:
//! `ui*` for dashboard exports, `report*` for `/report` downloads and
//! `messages*` for the paginated harvest.

use crate::core::reconcile::{ReconcileOptions, Reconciler, ReconciliationReport, DEFAULT_ROW_LIMIT};
use crate::domain::model::{FlatRecord, Record};
use crate::domain::ports::TabularLoader;
use crate::utils::error::{HarvestError, Result};
use std::path::{Path, PathBuf};

/// Files in `dir` named `<prefix>*.<extension>`, sorted.
pub fn find_matching(dir: &Path, prefix: &str, extension: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let mut matches = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(&suffix) {
            matches.push(entry.path());
        }
    }

    matches.sort();
    Ok(matches)
}

/// Exactly one match, or `Precondition`.
pub fn locate_unique(dir: &Path, prefix: &str, extension: &str) -> Result<PathBuf> {
    let mut matches = find_matching(dir, prefix, extension)?;
    if matches.len() != 1 {
        return Err(HarvestError::precondition(format!(
            "expected exactly one {}*.{} in {}, found {}",
            prefix,
            extension,
            dir.display(),
            matches.len()
        )));
    }
    let path = matches.remove(0);
    tracing::info!("Filename: {}", path.display());
    Ok(path)
}

pub fn load_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// A JSON file holding an array of objects.
pub fn load_json_records(path: &Path) -> Result<Vec<Record>> {
    match load_json(path)? {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                Record::from_value(item).ok_or_else(|| {
                    HarvestError::processing(format!(
                        "item {} of {} is not an object",
                        index,
                        path.display()
                    ))
                })
            })
            .collect(),
        _ => Err(HarvestError::processing(format!(
            "{} does not hold a JSON array",
            path.display()
        ))),
    }
}

/// Structural equality of two JSON documents.
pub fn compare_json_files(a: &Path, b: &Path) -> Result<bool> {
    Ok(load_json(a)? == load_json(b)?)
}

/// Same rows, same column order, same cells.
pub fn compare_tabular_files<L: TabularLoader>(loader: &L, a: &Path, b: &Path) -> Result<bool> {
    let rows_a = loader.load(a)?;
    let rows_b = loader.load(b)?;
    Ok(tables_equal(&rows_a, &rows_b))
}

fn tables_equal(a: &[FlatRecord], b: &[FlatRecord]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(row_a, row_b)| {
            row_a.columns().eq(row_b.columns()) && row_a.data == row_b.data
        })
}

/// Reconciles the paginated messages (A) against a report download (B).
pub fn compare_report_and_messages(
    messages: &Path,
    report: &Path,
    options: ReconcileOptions,
) -> Result<ReconciliationReport> {
    let message_records = load_json_records(messages)?;
    let report_records = load_json_records(report)?;
    tracing::info!(
        "Number of items in report: {}, in messages: {}",
        report_records.len(),
        message_records.len()
    );

    Ok(Reconciler::new(options).reconcile(&message_records, &report_records))
}

/// Results of a full data-directory comparison.
#[derive(Debug)]
pub struct ComparisonSummary {
    /// `None` when no dashboard export was found to compare against.
    pub tabular_equal: Option<bool>,
    pub json_equal: Option<bool>,
    pub reconciliation: ReconciliationReport,
}

/// UI vs API tables, UI vs API JSON, then messages vs report.
pub fn compare_outputs<L: TabularLoader>(
    dir: &Path,
    loader: &L,
    table_extension: &str,
    options: Option<ReconcileOptions>,
) -> Result<ComparisonSummary> {
    let tabular_equal = match optional_pair(dir, "ui", "report", table_extension)? {
        Some((ui, api)) => Some(compare_tabular_files(loader, &ui, &api)?),
        None => None,
    };

    let json_equal = match optional_pair(dir, "ui", "report", "json")? {
        Some((ui, api)) => Some(compare_json_files(&ui, &api)?),
        None => None,
    };

    let messages = locate_unique(dir, "messages", "json")?;
    let report = locate_unique(dir, "report", "json")?;
    let options = options.unwrap_or_else(|| {
        ReconcileOptions::default()
            .with_labels("message", "report")
            .with_row_limit(Some(DEFAULT_ROW_LIMIT))
    });
    let reconciliation = compare_report_and_messages(&messages, &report, options)?;

    Ok(ComparisonSummary {
        tabular_equal,
        json_equal,
        reconciliation,
    })
}

/// Skips the comparison when the UI export is missing.
fn optional_pair(
    dir: &Path,
    ui_prefix: &str,
    api_prefix: &str,
    extension: &str,
) -> Result<Option<(PathBuf, PathBuf)>> {
    if find_matching(dir, ui_prefix, extension)?.is_empty() {
        tracing::warn!("⚠️ No {}*.{} in {}, skipping", ui_prefix, extension, dir.display());
        return Ok(None);
    }
    Ok(Some((
        locate_unique(dir, ui_prefix, extension)?,
        locate_unique(dir, api_prefix, extension)?,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tabular::CsvLoader;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_locate_unique() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "report_2022-01-01_2022-02-01.json", "[]");
        write(temp_dir.path(), "report_2022-01-01_2022-02-01.csv", "");
        write(temp_dir.path(), "messages_20220301-1200.json", "[]");
        write(temp_dir.path(), "messages_20220302-1200.json", "[]");

        let found = locate_unique(temp_dir.path(), "report", "json").unwrap();
        assert!(found.ends_with("report_2022-01-01_2022-02-01.json"));

        assert!(matches!(
            locate_unique(temp_dir.path(), "messages", "json"),
            Err(HarvestError::Precondition { .. })
        ));
        assert!(matches!(
            locate_unique(temp_dir.path(), "ui", "json"),
            Err(HarvestError::Precondition { .. })
        ));
    }

    #[test]
    fn test_compare_json_files_is_structural() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(temp_dir.path(), "a.json", r#"[{"x": 1, "y": [1, 2]}]"#);
        let b = write(temp_dir.path(), "b.json", "[\n  {\"y\": [1, 2], \"x\": 1}\n]");
        let c = write(temp_dir.path(), "c.json", r#"[{"x": 1, "y": [2, 1]}]"#);

        assert!(compare_json_files(&a, &b).unwrap());
        assert!(!compare_json_files(&a, &c).unwrap());
    }

    #[test]
    fn test_compare_tabular_files_checks_column_order() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(temp_dir.path(), "a.csv", "id,doi\n1,10.1/a\n");
        let b = write(temp_dir.path(), "b.csv", "id,doi\n1,10.1/a\n");
        let c = write(temp_dir.path(), "c.csv", "doi,id\n10.1/a,1\n");
        let loader = CsvLoader::default();

        assert!(compare_tabular_files(&loader, &a, &b).unwrap());
        assert!(!compare_tabular_files(&loader, &a, &c).unwrap());
    }

    #[test]
    fn test_load_json_records_rejects_non_objects() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(temp_dir.path(), "bad.json", r#"[{"a": 1}, 2]"#);
        assert!(load_json_records(&path).is_err());
    }

    #[test]
    fn test_compare_outputs_without_ui_exports() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "messages_20220301-1200.json",
            r#"[{"header": {"version": "v2"}, "data": {"license": "non-CC"}}]"#,
        );
        write(
            temp_dir.path(),
            "report.json",
            r#"[{"header": {}, "data": {"license": "non-CC BY"}}]"#,
        );

        let summary =
            compare_outputs(temp_dir.path(), &CsvLoader::default(), "csv", None).unwrap();

        assert_eq!(summary.tabular_equal, None);
        assert_eq!(summary.json_equal, None);
        let report = summary.reconciliation;
        assert_eq!(report.labels.0, "message");
        assert_eq!(report.alignment.only_in_a, vec!["header.version"]);
        assert_eq!(report.discrepancy_counts()["data.license"], 1);
    }
}
