//! Minimal OOXML spreadsheet (xlsx) support.
//!
//! An xlsx file is a ZIP package of XML parts. The reader resolves the first
//! worksheet and decodes it into a grid of strings; the writer produces small
//! workbooks with inline strings, hidden sheets and list data validations.

mod reader;
mod writer;

pub use reader::read_first_sheet;
pub use writer::{write_workbook, ListValidation, Worksheet};

use quick_xml::events::BytesStart;
use std::io;
use zip::result::ZipError;

/// Errors raised while reading or writing a workbook
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("not a valid xlsx package: {0}")]
    Zip(#[from] ZipError),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("missing workbook part: {0}")]
    MissingPart(String),

    #[error("invalid cell reference: {0}")]
    InvalidCellReference(String),

    #[error("invalid shared string index: {0}")]
    InvalidSharedString(String),

    #[error("invalid workbook layout: {0}")]
    InvalidLayout(String),
}

/// Rows in a worksheet (Excel limit)
pub const MAX_ROWS: usize = 1_048_576;

/// Columns in a worksheet (Excel limit, `XFD`)
pub const MAX_COLUMNS: usize = 16_384;

/// Convert a zero-based column index to spreadsheet letters (0 -> "A", 26 -> "AA").
pub fn column_letters(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Parse an A1-style cell reference into zero-based `(column, row)` indices.
pub fn parse_cell_ref(reference: &str) -> Result<(usize, usize), WorkbookError> {
    let invalid = || WorkbookError::InvalidCellReference(reference.to_string());

    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (letters, digits) = reference.split_at(split);

    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    let mut column: usize = 0;
    for c in letters.chars() {
        let value = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        column = column
            .checked_mul(26)
            .and_then(|n| n.checked_add(value))
            .ok_or_else(invalid)?;
    }

    let row: usize = digits.parse().map_err(|_| invalid())?;
    if row == 0 || row > MAX_ROWS || column > MAX_COLUMNS {
        return Err(invalid());
    }

    Ok((column - 1, row - 1))
}

/// Look up an attribute by local name (ignores namespace prefixes like `r:`).
pub(crate) fn attribute(e: &BytesStart, local_name: &[u8]) -> Result<Option<String>, WorkbookError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == local_name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
