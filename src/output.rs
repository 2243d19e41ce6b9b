use crate::error::Result;
use crate::filter::FilteredView;
use crate::loader::resolve_encoding;
use crate::types::{AgeBucket, PyramidBar};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Mirror the pyramid for a two-sided chart: male counts become negative.
/// Stored pyramid counts stay non-negative.
pub fn pyramid_bars(pyramid: &[AgeBucket]) -> Vec<PyramidBar> {
    pyramid
        .iter()
        .flat_map(|b| {
            [
                PyramidBar {
                    age_group: b.label.clone(),
                    sex: "M".to_string(),
                    value: -(b.male as i64),
                },
                PyramidBar {
                    age_group: b.label.clone(),
                    sex: "F".to_string(),
                    value: b.female as i64,
                },
            ]
        })
        .collect()
}

/// Serialize the view's source rows with the original header, delimiter and
/// text encoding, so the result can be fed back to the loader.
pub fn export_view(view: &FilteredView<'_>) -> Result<Vec<u8>> {
    let dataset = view.dataset();
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(dataset.delimiter())
        .from_writer(Vec::new());
    if !dataset.header().is_empty() {
        wtr.write_record(dataset.header().names())?;
    }
    for (row, _) in view.entries() {
        wtr.write_record(row.values())?;
    }
    let utf8 = wtr.into_inner().map_err(|e| e.into_error())?;
    let text = String::from_utf8_lossy(&utf8);

    let encoding = resolve_encoding(dataset.encoding())?;
    let (bytes, _, unmappable) = encoding.encode(&text);
    if unmappable {
        warn!(encoding = encoding.name(), "export contains characters outside the source encoding");
    }
    Ok(bytes.into_owned())
}

pub fn export_view_to_path(view: &FilteredView<'_>, path: &Path) -> Result<()> {
    let bytes = export_view(view)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
