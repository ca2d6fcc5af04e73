// records.rs

//! CSV input/output and the small text helpers the commands share.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use color_eyre::eyre::{Result, WrapErr};
use log::*;
use serde_json::Value;

pub type Row = HashMap<String, String>;

/// Reads a CSV file with a header line into rows keyed by column name.
///
/// Rows whose every cell is blank are dropped. Short rows get empty cells.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .wrap_err_with(|| format!("cannot open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.wrap_err_with(|| format!("{}: bad row {}", path.display(), line + 2))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_string(), record.get(i).unwrap_or_default().to_string()))
            .collect();
        rows.push(row);
    }
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Reads a headerless two column CSV such as `old name,new name`.
pub fn read_pairs(path: &Path) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .wrap_err_with(|| format!("cannot open {}", path.display()))?;
    let mut pairs = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.wrap_err_with(|| format!("{}: bad row {}", path.display(), line + 1))?;
        match (record.get(0).map(str::trim), record.get(1).map(str::trim)) {
            (Some(first), Some(second)) if !first.is_empty() && !second.is_empty() => {
                pairs.push((first.to_string(), second.to_string()))
            }
            _ if record.iter().all(|cell| cell.trim().is_empty()) => {}
            _ => warn!("{}: row {} needs two values, skipped", path.display(), line + 1),
        }
    }
    Ok(pairs)
}

/// Writes `rows` under `headers`, creating parent directories.
pub fn write_rows<R, S>(path: &Path, headers: &[&str], rows: R) -> Result<()>
where
    R: IntoIterator<Item = Vec<S>>,
    S: AsRef<str>,
{
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .wrap_err_with(|| format!("cannot create {}", path.display()))?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.iter().map(|c| c.as_ref()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes maps as CSV. Columns are the sorted union of all keys.
pub fn write_maps(path: &Path, rows: &[BTreeMap<String, String>]) -> Result<Vec<String>> {
    let columns: Vec<String> = rows
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let headers: Vec<&str> = columns.iter().map(String::as_str).collect();
    write_rows(
        path,
        &headers,
        rows.iter().map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).map(String::as_str).unwrap_or(""))
                .collect::<Vec<_>>()
        }),
    )?;
    Ok(columns)
}

/// Flattens nested objects into `parent_child` keys. Arrays become a
/// `", "` separated list, `null` an empty cell.
pub fn flatten_json(value: &Value) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    flatten_into(&mut flat, None, value);
    flat
}

fn flatten_into(flat: &mut BTreeMap<String, String>, prefix: Option<&str>, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = match prefix {
                    Some(prefix) => format!("{prefix}_{key}"),
                    None => key.clone(),
                };
                flatten_into(flat, Some(&key), child);
            }
        }
        other => {
            if let Some(prefix) = prefix {
                flat.insert(prefix.to_string(), cell(other));
            }
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Comma separated command line list, blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Local time as `YYYYmmdd_HHMMSS`, used in output file names.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// `dir/{prefix}_{timestamp}.{extension}`, never an existing file.
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    unused_path(dir, &format!("{prefix}_{}", timestamp()), extension)
}

/// `dir/{stem}.{extension}`, or `dir/{stem}_N.{extension}` for the first
/// free `N` from 2 when runs in the same second collide.
fn unused_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{extension}"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| dir.join(format!("{stem}_{n}.{extension}")))
        .find(|path| !path.exists())
        .unwrap_or(first)
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("cannot create directory {}", parent.display()))?;
    }
    Ok(())
}
