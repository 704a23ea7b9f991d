use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use log::{debug, info};
use serde_json::{Map, Number, Value};
use std::path::Path;

use crate::models::CaseField;

/// Sheet holding the interview rows in the survey workbook.
pub const DEFAULT_SHEET: &str = "code";

/// Converts one cell to the JSON scalar the record decoder expects.
/// Whole-number floats become integers so ids like `12` do not turn into `12.0`.
fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Value::from(*f as i64),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

/// Column key for a header cell: known column labels map to record keys,
/// anything else is kept verbatim and ignored by the decoder.
fn column_key(header: &Data) -> Option<String> {
    let label = header.to_string();
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    Some(match label.parse::<CaseField>() {
        Ok(field) => field.key().to_string(),
        Err(_) => label.to_string(),
    })
}

/// Turns a sheet range into one JSON object per non-empty row, keyed by the
/// header row.
pub fn rows_from_range(range: &Range<Data>) -> Vec<Value> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let keys: Vec<Option<String>> = header.iter().map(column_key).collect();
    debug!("Sheet columns: {:?}", keys);

    rows.filter_map(|cells| {
        let object: Map<String, Value> = keys
            .iter()
            .zip(cells)
            .filter_map(|(key, cell)| key.as_ref().map(|k| (k.clone(), cell_to_value(cell))))
            .filter(|(_, value)| !value.is_null())
            .collect();
        (!object.is_empty()).then_some(Value::Object(object))
    })
    .collect()
}

/// Reads `sheet` from an `.xlsx`/`.xls`/`.ods` workbook.
pub fn read_sheet_rows(path: &Path, sheet: &str) -> Result<Vec<Value>> {
    info!("Opening workbook {:?}, sheet '{}'", path, sheet);
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Failed to open workbook {:?}", path))?;
    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Failed to read sheet '{}' from {:?}", sheet, path))?;
    let rows = rows_from_range(&range);
    info!("Read {} rows from sheet '{}'", rows.len(), sheet);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sheet(cells: &[&[Data]]) -> Range<Data> {
        let height = cells.len() as u32;
        let width = cells.iter().map(|row| row.len()).max().unwrap_or(0) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn header_labels_become_record_keys() {
        let range = sheet(&[
            &[text("事例"), text("発言内容"), text("緯度"), text("備考")],
            &[text("R1"), text("道を広げた"), Data::Float(34.25), text("x")],
            &[Data::Empty, Data::Empty, Data::Empty, Data::Empty],
            &[Data::Int(12), Data::Empty, Data::Float(3.0), Data::Empty],
        ]);
        let rows = rows_from_range(&range);
        assert_eq!(
            rows,
            vec![
                json!({"case_id": "R1", "statement": "道を広げた", "latitude": 34.25, "備考": "x"}),
                json!({"case_id": 12, "latitude": 3}),
            ]
        );
    }

    #[test]
    fn header_only_sheet_has_no_rows() {
        let range = sheet(&[&[text("事例"), text("整備")]]);
        assert!(rows_from_range(&range).is_empty());
    }
}
