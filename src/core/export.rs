// NetGather - core/export.rs
//
// CSV and JSON export of row-sets.
// The writers take any `Write`; `write_row_set` names and creates the file.

use crate::core::table::RowSet;
use crate::util::constants;
use crate::util::error::ExportError;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Output format for exported row-sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Export a row-set to CSV. Header row first; missing cells are empty.
pub fn export_csv<W: Write>(
    set: &RowSet,
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    check_rows(set)?;
    let csv_err = |e| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(&set.columns).map_err(csv_err)?;

    let mut count = 0;
    for row in &set.rows {
        csv_writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .map_err(csv_err)?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Export a row-set to JSON: an array of objects whose keys follow the
/// row-set's column order. Missing cells are `null`.
pub fn export_json<W: Write>(
    set: &RowSet,
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    check_rows(set)?;
    serde_json::to_writer_pretty(writer, &JsonRows(set)).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(set.rows.len())
}

/// Write `set` to `<dir>/<stem>.<ext>` and return the path written.
pub fn write_row_set(
    dir: &Path,
    set: &RowSet,
    format: ExportFormat,
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir).map_err(|e| ExportError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let path = dir.join(format!("{}.{}", set.kind.file_stem(), format.extension()));
    let file = File::create(&path).map_err(|e| ExportError::Io {
        path: path.clone(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);

    let count = match format {
        ExportFormat::Csv => export_csv(set, &mut writer, &path)?,
        ExportFormat::Json => export_json(set, &mut writer, &path)?,
    };
    writer.flush().map_err(|e| ExportError::Io {
        path: path.clone(),
        source: e,
    })?;

    tracing::info!(path = %path.display(), rows = count, kind = ?set.kind, "Exported");
    Ok(path)
}

fn check_rows(set: &RowSet) -> Result<(), ExportError> {
    if set.rows.len() > constants::MAX_EXPORT_ROWS {
        return Err(ExportError::TooManyRows {
            count: set.rows.len(),
            max: constants::MAX_EXPORT_ROWS,
        });
    }
    Ok(())
}

struct JsonRows<'a>(&'a RowSet);

struct JsonRow<'a> {
    columns: &'a [String],
    cells: &'a [Option<String>],
}

impl Serialize for JsonRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.rows.len()))?;
        for cells in &self.0.rows {
            seq.serialize_element(&JsonRow {
                columns: &self.0.columns,
                cells,
            })?;
        }
        seq.end()
    }
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (idx, column) in self.columns.iter().enumerate() {
            map.serialize_entry(column, &self.cells.get(idx).cloned().flatten())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::RowSetKind;

    fn sample() -> RowSet {
        RowSet {
            kind: RowSetKind::Split,
            columns: vec!["host".into(), "c1".into(), "c0".into()],
            rows: vec![
                vec![Some("r1".into()), Some("up".into()), Some("Gi0/1".into())],
                vec![Some("r2".into()), None, Some("Gi0/2, \"quoted\"".into())],
            ],
        }
    }

    #[test]
    fn test_csv_export() {
        let mut buf = Vec::new();
        let count = export_csv(&sample(), &mut buf, Path::new("out.csv")).unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], "host,c1,c0");
        assert_eq!(lines[1], "r1,up,Gi0/1");
        assert_eq!(lines[2], "r2,,\"Gi0/2, \"\"quoted\"\"\"");
    }

    #[test]
    fn test_json_export_keeps_column_order() {
        let mut buf = Vec::new();
        let count = export_json(&sample(), &mut buf, Path::new("out.json")).unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        let host = output.find("\"host\"").unwrap();
        let c1 = output.find("\"c1\"").unwrap();
        let c0 = output.find("\"c0\"").unwrap();
        assert!(host < c1 && c1 < c0);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[1]["c1"], serde_json::Value::Null);
        assert_eq!(parsed[0]["c0"], "Gi0/1");
    }

    #[test]
    fn test_write_row_set_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_row_set(dir.path(), &sample(), ExportFormat::Csv).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "show_results_split_columns.csv"
        );
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("host,"));
    }
}
