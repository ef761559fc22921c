//! The `metadata.xlsx` sheet: header schema and per-design rows.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::validation::ValidationError;

/// Column names in the order the backend pipeline parses them
pub const EXPECTED_COLUMNS: [&str; 6] = [
    "folder_name",
    "title",
    "description",
    "category",
    "subcategory",
    "tags",
];

pub const FOLDER_NAME_COLUMN: usize = 0;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a header cell: drop anything from the first `(`, trim,
/// lowercase and join words with underscores.
///
/// `"Folder Name (must match the ZIP folder)"` becomes `"folder_name"`.
pub fn normalize_header(cell: &str) -> String {
    let before_instructions = cell.split('(').next().unwrap_or_default();
    let lowered = before_instructions.trim().to_lowercase();
    RE_WHITESPACE.replace_all(&lowered, "_").into_owned()
}

/// Check the header row against [`EXPECTED_COLUMNS`].
///
/// Returns every schema problem found; an empty list means the header is valid.
pub fn validate_header(header: &[String]) -> Vec<ValidationError> {
    let normalized: Vec<String> = header.iter().map(|c| normalize_header(c)).collect();
    let width = normalized
        .iter()
        .rposition(|c| !c.is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut errors = Vec::new();

    if width != EXPECTED_COLUMNS.len() {
        errors.push(ValidationError::ColumnCountMismatch {
            expected: EXPECTED_COLUMNS.len(),
            actual: width,
        });
    }

    for (index, expected) in EXPECTED_COLUMNS.iter().enumerate() {
        let actual = normalized.get(index).map(String::as_str).unwrap_or_default();
        if actual != *expected {
            errors.push(ValidationError::ColumnNameMismatch {
                position: index + 1,
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    let extra: Vec<String> = header
        .iter()
        .skip(EXPECTED_COLUMNS.len())
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if !extra.is_empty() {
        errors.push(ValidationError::ExtraColumns { columns: extra });
    }

    let folder_column = EXPECTED_COLUMNS[FOLDER_NAME_COLUMN];
    if normalized.get(FOLDER_NAME_COLUMN).map(String::as_str) != Some(folder_column) {
        match normalized.iter().position(|c| c == folder_column) {
            Some(index) => errors.push(ValidationError::FolderNameColumnMisplaced {
                position: index + 1,
            }),
            None => errors.push(ValidationError::FolderNameColumnMissing),
        }
    }

    errors
}

/// One design described in the metadata sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRow {
    /// 1-based spreadsheet row number
    pub row_number: usize,
    pub folder_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub subcategory: String,
    pub tags: Vec<String>,
}

impl MetadataRow {
    /// Build a row from raw cells laid out as [`EXPECTED_COLUMNS`].
    /// Returns `None` when the folder name cell is blank.
    pub fn from_cells(row_number: usize, cells: &[String]) -> Option<Self> {
        let cell = |index: usize| cells.get(index).map(|c| c.trim().to_string()).unwrap_or_default();

        let folder_name = cell(FOLDER_NAME_COLUMN);
        if folder_name.is_empty() {
            return None;
        }

        Some(Self {
            row_number,
            folder_name,
            title: cell(1),
            description: cell(2),
            category: cell(3),
            subcategory: cell(4),
            tags: split_tags(&cell(5)),
        })
    }
}

pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Data rows (everything below the header) that name a folder
pub fn parse_rows(rows: &[Vec<String>]) -> Vec<MetadataRow> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(index, cells)| MetadataRow::from_cells(index + 1, cells))
        .collect()
}

/// Distinct folder names in sheet order
pub fn folder_names(rows: &[MetadataRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.folder_name.as_str()))
        .map(|row| row.folder_name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_strips_instructions_and_case() {
        assert_eq!(normalize_header("folder_name"), "folder_name");
        assert_eq!(normalize_header("  Folder   Name (must match ZIP) "), "folder_name");
        assert_eq!(normalize_header("TAGS(comma separated)"), "tags");
        assert_eq!(normalize_header("Sub\tCategory"), "sub_category");
        assert_eq!(normalize_header("(only instructions)"), "");
    }

    #[test]
    fn exact_header_in_any_case_is_valid() {
        let errors = validate_header(&header(&[
            "FOLDER_NAME", "Title", "description", "Category (pick one)", "subcategory", "Tags",
        ]));
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn trailing_empty_cells_do_not_count() {
        let errors = validate_header(&header(&[
            "folder_name", "title", "description", "category", "subcategory", "tags", "", "  ",
        ]));
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_column_reports_count_and_positions() {
        let errors = validate_header(&header(&[
            "folder_name", "title", "description", "category", "tags",
        ]));

        assert_eq!(
            errors,
            vec![
                ValidationError::ColumnCountMismatch { expected: 6, actual: 5 },
                ValidationError::ColumnNameMismatch {
                    position: 5,
                    expected: "subcategory".to_string(),
                    actual: "tags".to_string(),
                },
                ValidationError::ColumnNameMismatch {
                    position: 6,
                    expected: "tags".to_string(),
                    actual: String::new(),
                },
            ]
        );
    }

    #[test]
    fn swapped_columns_report_each_position() {
        let errors = validate_header(&header(&[
            "folder_name", "description", "title", "category", "subcategory", "tags",
        ]));

        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            ValidationError::ColumnNameMismatch { position: 2, expected, actual }
                if expected == "title" && actual == "description"
        ));
        assert!(matches!(
            &errors[1],
            ValidationError::ColumnNameMismatch { position: 3, .. }
        ));
    }

    #[test]
    fn extra_columns_are_reported_separately() {
        let errors = validate_header(&header(&[
            "folder_name", "title", "description", "category", "subcategory", "tags", "price", "", "notes",
        ]));

        assert_eq!(
            errors,
            vec![
                ValidationError::ColumnCountMismatch { expected: 6, actual: 9 },
                ValidationError::ExtraColumns {
                    columns: vec!["price".to_string(), "notes".to_string()],
                },
            ]
        );
    }

    #[test]
    fn folder_name_elsewhere_is_misplaced() {
        let errors = validate_header(&header(&[
            "title", "folder_name", "description", "category", "subcategory", "tags",
        ]));

        assert!(errors.contains(&ValidationError::FolderNameColumnMisplaced { position: 2 }));
        assert!(!errors.contains(&ValidationError::FolderNameColumnMissing));
    }

    #[test]
    fn folder_name_absent_is_missing() {
        let errors = validate_header(&header(&[
            "name", "title", "description", "category", "subcategory", "tags",
        ]));

        assert_eq!(errors.last(), Some(&ValidationError::FolderNameColumnMissing));
    }

    #[test]
    fn empty_header_reports_zero_columns() {
        let errors = validate_header(&[]);
        assert_eq!(
            errors.first(),
            Some(&ValidationError::ColumnCountMismatch { expected: 6, actual: 0 })
        );
        assert_eq!(errors.last(), Some(&ValidationError::FolderNameColumnMissing));
    }

    #[test]
    fn rows_skip_header_and_blank_folder_names() {
        let rows = vec![
            header(&["folder_name", "title", "description", "category", "subcategory", "tags"]),
            header(&[" rose ", "Rose", "A rose", "Floral", "Roses", "red, flower ,, spring"]),
            header(&["", "Orphan"]),
            header(&["tulip"]),
            header(&["rose", "Duplicate"]),
        ];

        let parsed = parse_rows(&rows);

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].row_number, 2);
        assert_eq!(parsed[0].folder_name, "rose");
        assert_eq!(parsed[0].tags, vec!["red", "flower", "spring"]);
        assert_eq!(parsed[1].row_number, 4);
        assert_eq!(parsed[1].title, "");
        assert_eq!(folder_names(&parsed), vec!["rose", "tulip"]);
    }
}
