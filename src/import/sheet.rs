//! Workbook decoding and template generation.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::import::ImportKind;
use crate::{CommerceError, Result};

/// One data row keyed by normalised header. `number` is 1-based and does not
/// count the header row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SheetRow {
    pub number: usize,
    cells: HashMap<String, String>,
}

impl SheetRow {
    pub fn new(number: usize, cells: impl IntoIterator<Item = (String, String)>) -> Self {
        Self { number, cells: cells.into_iter().collect() }
    }

    /// Trimmed, non-empty cell text.
    pub fn get(&self, column: &str) -> Option<&str> { self.cells.get(column).map(String::as_str) }

    pub fn is_blank(&self) -> bool { self.cells.is_empty() }
}

/// Lowercased, trimmed, inner whitespace as `_`: "Price Adjustment" → `price_adjustment`.
pub fn normalise_header(header: &str) -> String {
    header.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase()
}

/// Reads the first worksheet. The first row holds the headers.
pub fn read_rows(bytes: Vec<u8>) -> Result<(Vec<String>, Vec<SheetRow>)> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| CommerceError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| CommerceError::Spreadsheet("workbook has no worksheets".into()))?
        .map_err(|e| CommerceError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|cell| cell_text(cell).map(|h| normalise_header(&h)).unwrap_or_default()).collect(),
        None => return Err(CommerceError::validation("spreadsheet has no header row")),
    };

    let data = rows
        .enumerate()
        .map(|(index, cells)| {
            let cells = headers
                .iter()
                .zip(cells)
                .filter(|(header, _)| !header.is_empty())
                .filter_map(|(header, cell)| cell_text(cell).map(|text| (header.clone(), text)));
            SheetRow::new(index + 1, cells)
        })
        .collect();

    Ok((headers, data))
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        // Integral floats are how spreadsheets store whole numbers.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Blank workbook with the entity's header row in bold.
pub fn create_template(kind: ImportKind) -> Result<Vec<u8>> {
    build_template(kind).map_err(|e| CommerceError::Spreadsheet(format!("could not build template: {e}")))
}

fn build_template(kind: ImportKind) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(kind.as_str())?;

    for (col, column) in (0u16..).zip(kind.columns()) {
        sheet.write_string_with_format(0, col, column.name, &bold)?;
        sheet.set_column_width(col, 20)?;
    }
    workbook.save_to_buffer()
}
