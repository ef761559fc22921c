use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

use super::{attribute, parse_cell_ref, WorkbookError, MAX_COLUMNS, MAX_ROWS};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const DEFAULT_SHEET_PART: &str = "xl/worksheets/sheet1.xml";

/// Read the first worksheet of an xlsx file as rows of cell text.
///
/// Rows and cells are placed by their `r` references, so sparse sheets come
/// back with empty strings in the gaps. Trailing empty cells are not padded.
pub fn read_first_sheet(data: &[u8]) -> Result<Vec<Vec<String>>, WorkbookError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let sheet_path = first_sheet_path(&mut archive)?;
    tracing::debug!(sheet = %sheet_path, "resolved first worksheet");

    let shared_strings = match read_part(&mut archive, SHARED_STRINGS_PART)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_xml = read_part(&mut archive, &sheet_path)?
        .ok_or_else(|| WorkbookError::MissingPart(sheet_path.clone()))?;

    parse_sheet(&sheet_xml, &shared_strings)
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, WorkbookError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

/// Follow workbook.xml -> workbook.xml.rels to the first sheet's part name.
fn first_sheet_path(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, WorkbookError> {
    let Some(workbook_xml) = read_part(archive, WORKBOOK_PART)? else {
        return Ok(DEFAULT_SHEET_PART.to_string());
    };

    let Some(relationship_id) = first_sheet_relationship(&workbook_xml)? else {
        return Ok(DEFAULT_SHEET_PART.to_string());
    };

    let Some(rels_xml) = read_part(archive, WORKBOOK_RELS_PART)? else {
        return Ok(DEFAULT_SHEET_PART.to_string());
    };

    match relationship_target(&rels_xml, &relationship_id)? {
        Some(target) => Ok(resolve_target(&target)),
        None => Ok(DEFAULT_SHEET_PART.to_string()),
    }
}

fn first_sheet_relationship(workbook_xml: &str) -> Result<Option<String>, WorkbookError> {
    let mut reader = Reader::from_str(workbook_xml);

    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                return attribute(e, b"id");
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn relationship_target(rels_xml: &str, id: &str) -> Result<Option<String>, WorkbookError> {
    let mut reader = Reader::from_str(rels_xml);

    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attribute(e, b"Id")?.as_deref() == Some(id) {
                    return attribute(e, b"Target");
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Relationship targets are relative to `xl/` unless they start with `/`.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, WorkbookError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Phonetic runs (<rPh>) carry reading hints, not cell text
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => phonetic_depth += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(e) if in_text && phonetic_depth == 0 => {
                current.push_str(&e.unescape()?);
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// Cell being decoded while walking a `<c>` element
#[derive(Default)]
struct PendingCell {
    column: usize,
    cell_type: Option<String>,
    value: String,
    inline: String,
}

fn parse_sheet(xml: &str, shared_strings: &[String]) -> Result<Vec<Vec<String>>, WorkbookError> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<String>> = Vec::new();

    let mut next_row = 0usize;
    let mut row_index = 0usize;
    let mut next_column = 0usize;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = row_position(e, next_row)?;
                    next_column = 0;
                }
                b"c" => {
                    let column = cell_column(e, next_column)?;
                    cell = Some(PendingCell {
                        column,
                        cell_type: attribute(e, b"t")?,
                        ..PendingCell::default()
                    });
                }
                b"v" => in_value = true,
                b"t" if cell.is_some() => in_inline_text = true,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = row_position(e, next_row)?;
                    next_row = row_index + 1;
                }
                b"c" => {
                    // Styled but empty cell
                    next_column = cell_column(e, next_column)? + 1;
                }
                _ => {}
            },
            Event::Text(e) => {
                if let Some(pending) = cell.as_mut() {
                    if in_value {
                        pending.value.push_str(&e.unescape()?);
                    } else if in_inline_text && phonetic_depth == 0 {
                        pending.inline.push_str(&e.unescape()?);
                    }
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"row" => next_row = row_index + 1,
                b"c" => {
                    if let Some(pending) = cell.take() {
                        next_column = pending.column + 1;
                        let text = cell_text(&pending, shared_strings)?;
                        if !text.is_empty() {
                            place(&mut rows, row_index, pending.column, text)?;
                        }
                    }
                }
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

fn row_position(e: &quick_xml::events::BytesStart, fallback: usize) -> Result<usize, WorkbookError> {
    match attribute(e, b"r")? {
        Some(r) => r
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0 && *n <= MAX_ROWS)
            .map(|n| n - 1)
            .ok_or(WorkbookError::InvalidCellReference(r)),
        None => Ok(fallback),
    }
}

fn cell_column(e: &quick_xml::events::BytesStart, fallback: usize) -> Result<usize, WorkbookError> {
    match attribute(e, b"r")? {
        Some(reference) => Ok(parse_cell_ref(&reference)?.0),
        None => Ok(fallback),
    }
}

fn cell_text(cell: &PendingCell, shared_strings: &[String]) -> Result<String, WorkbookError> {
    match cell.cell_type.as_deref() {
        Some("s") => {
            let raw = cell.value.trim();
            raw.parse::<usize>()
                .ok()
                .and_then(|index| shared_strings.get(index).cloned())
                .ok_or_else(|| WorkbookError::InvalidSharedString(raw.to_string()))
        }
        Some("inlineStr") => Ok(cell.inline.clone()),
        Some("b") => Ok(if cell.value.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
        _ => Ok(cell.value.clone()),
    }
}

/// Store `text` at `(row, column)`, growing the grid as needed.
fn place(rows: &mut Vec<Vec<String>>, row: usize, column: usize, text: String) -> Result<(), WorkbookError> {
    // Positions without an `r` attribute are counted, so they can still run past the limits
    if row >= MAX_ROWS || column >= MAX_COLUMNS {
        return Err(WorkbookError::InvalidCellReference(format!(
            "{}{}",
            super::column_letters(column),
            row + 1
        )));
    }
    if rows.len() <= row {
        rows.resize_with(row + 1, Vec::new);
    }
    let cells = &mut rows[row];
    if cells.len() <= column {
        cells.resize(column + 1, String::new());
    }
    cells[column] = text;
    Ok(())
}
