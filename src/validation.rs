//! Bulk upload validation: turns an archive into a report of actionable errors.
//!
//! Checks run in a fixed order (size, archive, metadata, header schema,
//! folder structure, completeness, minimum count, reconciliation) and each
//! stage stops the ones that would be meaningless after it.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::archive::{
    find_metadata, scan_entries, ArchiveError, DesignFolder, OpenedArchive, RequiredExtension,
    MAX_ENTRY_SIZE,
};
use crate::metadata::{folder_names, parse_rows, validate_header};
use crate::workbook::read_first_sheet;

/// Largest archive accepted for upload (1 GiB)
pub const MAX_ARCHIVE_SIZE: u64 = 1024 * 1024 * 1024;

/// Threshold used when the onboarding config cannot be fetched
pub const DEFAULT_MINIMUM_DESIGNS: usize = 50;

const MEGABYTE: u64 = 1024 * 1024;

/// How many incomplete folders are described in detail
const DETAIL_BUDGET: usize = 5;

/// How many names a reconciliation error lists
const NAME_BUDGET: usize = 10;

/// A design folder missing at least one required file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteFolder {
    pub folder: String,
    pub missing: Vec<RequiredExtension>,
    pub has: Vec<RequiredExtension>,
}

impl From<&DesignFolder> for IncompleteFolder {
    fn from(folder: &DesignFolder) -> Self {
        Self {
            folder: folder.name.clone(),
            missing: folder.missing(),
            has: folder.extensions.iter().copied().collect(),
        }
    }
}

impl fmt::Display for IncompleteFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let has = if self.has.is_empty() {
            "none".to_string()
        } else {
            join_extensions(&self.has)
        };
        write!(f, "{} (missing: {} - has: {})", self.folder, join_extensions(&self.missing), has)
    }
}

/// Every problem the validator can report, in reporting order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error(
        "File too large: {:.1} MB. The maximum allowed size is {} MB. Split your designs into smaller ZIP files.",
        megabytes(.actual_bytes),
        whole_megabytes(.limit_bytes)
    )]
    SizeExceeded { actual_bytes: u64, limit_bytes: u64 },

    #[error("Invalid or corrupted ZIP file: {detail}")]
    CorruptArchive { detail: String },

    #[error("metadata.xlsx file not found in ZIP. Place metadata.xlsx at the root of the archive or inside the main folder.")]
    MetadataNotFound,

    #[error("Failed to read metadata.xlsx: {detail}")]
    MetadataUnreadable { detail: String },

    #[error(
        "Column count mismatch: metadata.xlsx must have exactly {expected} columns (folder_name, title, description, category, subcategory, tags) but has {actual}."
    )]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("Column {position} must be \"{expected}\" but found \"{}\".", or_empty(.actual))]
    ColumnNameMismatch {
        position: usize,
        expected: String,
        actual: String,
    },

    #[error(
        "Extra columns found after \"tags\": {}. Remove them; extra columns corrupt metadata parsing.",
        quoted_list(.columns)
    )]
    ExtraColumns { columns: Vec<String> },

    #[error("Required column \"folder_name\" is missing entirely. It must be the first column.")]
    FolderNameColumnMissing,

    #[error("Column \"folder_name\" found at position {position} but must be the first column.")]
    FolderNameColumnMisplaced { position: usize },

    #[error(
        "Incorrect folder structure: {} folder(s) are nested too deeply: {}. Use folder_name/file.ext or root_folder/folder_name/file.ext.",
        count(.paths),
        truncated(.paths, DETAIL_BUDGET)
    )]
    NestedTooDeep { paths: Vec<String> },

    #[error(
        "No design folders found in ZIP. Expected structure: folder_name/design.eps, folder_name/design.cdr, folder_name/design.jpg, folder_name/design.png (optionally inside a single root folder)."
    )]
    NoDesignFolders,

    #[error(
        "None of the {} design folder(s) contain all required files (.eps, .cdr, .jpg, .png): {}. Every folder must include all four file types.",
        count(.folders),
        truncated(.folders, DETAIL_BUDGET)
    )]
    AllFoldersIncomplete { folders: Vec<IncompleteFolder> },

    #[error(
        "{} folder(s) missing required files: {}. Add the missing files or remove these folders.",
        count(.folders),
        truncated(.folders, DETAIL_BUDGET)
    )]
    SomeFoldersIncomplete { folders: Vec<IncompleteFolder> },

    #[error(
        "Insufficient design folders: found {found} complete folder(s) but at least {minimum} are required. Add {} more.",
        shortfall(.found, .minimum)
    )]
    InsufficientDesigns { found: usize, minimum: usize },

    /// Sheet names with no folder of that name anywhere in the archive.
    /// A listed folder that exists but lacks files is reported by the
    /// completeness errors and never appears here.
    #[error(
        "{} folder(s) listed in metadata.xlsx are missing from the ZIP: {}. Make sure these folders exist with all required files (.eps, .cdr, .jpg, .png).",
        count(.names),
        truncated(.names, NAME_BUDGET)
    )]
    MissingInArchive { names: Vec<String> },

    #[error(
        "{} folder(s) in the ZIP are not listed in metadata.xlsx: {}. Add a row for each of these folders to metadata.xlsx.",
        count(.names),
        truncated(.names, NAME_BUDGET)
    )]
    MissingInMetadata { names: Vec<String> },
}

fn megabytes(bytes: &u64) -> f64 {
    *bytes as f64 / MEGABYTE as f64
}

fn whole_megabytes(bytes: &u64) -> u64 {
    bytes / MEGABYTE
}

fn shortfall(found: &usize, minimum: &usize) -> usize {
    minimum.saturating_sub(*found)
}

fn or_empty(value: &str) -> &str {
    if value.is_empty() {
        "(empty)"
    } else {
        value
    }
}

fn count<T>(items: &[T]) -> usize {
    items.len()
}

fn join_extensions(extensions: &[RequiredExtension]) -> String {
    extensions
        .iter()
        .map(RequiredExtension::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn quoted_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("\"{}\"", item))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Join the first `budget` items and append `(+N more)` for the rest.
fn truncated<T: fmt::Display>(items: &[T], budget: usize) -> String {
    let shown = items
        .iter()
        .take(budget)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > budget {
        format!("{} (+{} more)", shown, items.len() - budget)
    } else {
        shown
    }
}

/// Outcome of validating one archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// Number of complete design folders
    pub design_count: usize,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ValidationError>, design_count: usize) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            design_count,
        }
    }

    fn failed(error: ValidationError) -> Self {
        Self::from_errors(vec![error], 0)
    }

    /// Rendered error messages in reporting order
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            valid: self.valid,
            errors: self.messages(),
            design_count: self.design_count,
        }
    }
}

/// Report shape with rendered messages, as consumed by the upload form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub valid: bool,
    pub errors: Vec<String>,
    pub design_count: usize,
}

pub fn check_archive_size(size: u64) -> Option<ValidationError> {
    (size > MAX_ARCHIVE_SIZE).then_some(ValidationError::SizeExceeded {
        actual_bytes: size,
        limit_bytes: MAX_ARCHIVE_SIZE,
    })
}

/// Validate an archive on disk. The size gate runs on file metadata, so an
/// oversized file is never read into memory.
pub fn validate_archive_file(path: &Path, minimum_designs: usize) -> ValidationReport {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            return ValidationReport::failed(ValidationError::CorruptArchive {
                detail: format!("cannot read {}: {}", path.display(), e),
            })
        }
    };

    if let Some(error) = check_archive_size(size) {
        tracing::info!(path = %path.display(), size, "archive rejected by size limit");
        return ValidationReport::failed(error);
    }

    match fs::read(path) {
        Ok(data) => validate_archive(&data, minimum_designs),
        Err(e) => ValidationReport::failed(ValidationError::CorruptArchive {
            detail: format!("cannot read {}: {}", path.display(), e),
        }),
    }
}

/// Validate an in-memory archive against `minimum_designs`.
pub fn validate_archive(data: &[u8], minimum_designs: usize) -> ValidationReport {
    if let Some(error) = check_archive_size(data.len() as u64) {
        return ValidationReport::failed(error);
    }

    let mut archive = match OpenedArchive::open(data) {
        Ok(archive) => archive,
        Err(e) => {
            tracing::debug!(error = %e, "archive could not be opened");
            return ValidationReport::failed(ValidationError::CorruptArchive {
                detail: zip_detail(&e),
            });
        }
    };

    let Some(metadata_path) = find_metadata(archive.names()).map(str::to_string) else {
        return ValidationReport::failed(ValidationError::MetadataNotFound);
    };
    tracing::debug!(path = %metadata_path, "found metadata workbook");

    let rows = match archive
        .read(&metadata_path, MAX_ENTRY_SIZE)
        .map_err(|e| e.to_string())
        .and_then(|bytes| read_first_sheet(&bytes).map_err(|e| e.to_string()))
    {
        Ok(rows) => rows,
        Err(detail) => {
            return ValidationReport::failed(ValidationError::MetadataUnreadable { detail })
        }
    };

    let header = rows.first().cloned().unwrap_or_default();
    let schema_errors = validate_header(&header);
    if !schema_errors.is_empty() {
        tracing::debug!(errors = schema_errors.len(), "metadata header rejected");
        return ValidationReport::from_errors(schema_errors, 0);
    }

    let sheet_names = folder_names(&parse_rows(&rows));
    let scan = scan_entries(archive.names(), Some(&metadata_path));

    let mut errors = Vec::new();

    if !scan.nested_too_deep.is_empty() {
        errors.push(ValidationError::NestedTooDeep {
            paths: scan.nested_too_deep.clone(),
        });
    }

    let complete: Vec<&DesignFolder> = scan.complete_folders().collect();
    let incomplete: Vec<IncompleteFolder> = scan.incomplete_folders().map(IncompleteFolder::from).collect();
    let design_count = complete.len();

    if scan.folders.is_empty() {
        errors.push(ValidationError::NoDesignFolders);
    } else if complete.is_empty() {
        errors.push(ValidationError::AllFoldersIncomplete { folders: incomplete });
    } else if !incomplete.is_empty() {
        errors.push(ValidationError::SomeFoldersIncomplete { folders: incomplete });
    }

    if design_count > 0 && design_count < minimum_designs {
        errors.push(ValidationError::InsufficientDesigns {
            found: design_count,
            minimum: minimum_designs,
        });
    }

    if design_count > 0 {
        // Incomplete folders are already reported above, so only names with
        // no folder at all count as missing from the archive.
        let present: HashSet<&str> = scan.folders.iter().map(|f| f.name.as_str()).collect();
        let listed: HashSet<&str> = sheet_names.iter().map(String::as_str).collect();

        let missing_in_archive: Vec<String> = sheet_names
            .iter()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect();
        if !missing_in_archive.is_empty() {
            errors.push(ValidationError::MissingInArchive {
                names: missing_in_archive,
            });
        }

        let missing_in_metadata: Vec<String> = complete
            .iter()
            .filter(|folder| !listed.contains(folder.name.as_str()))
            .map(|folder| folder.name.clone())
            .collect();
        if !missing_in_metadata.is_empty() {
            errors.push(ValidationError::MissingInMetadata {
                names: missing_in_metadata,
            });
        }
    }

    let report = ValidationReport::from_errors(errors, design_count);
    tracing::info!(
        valid = report.valid,
        designs = report.design_count,
        errors = report.errors.len(),
        "validated archive"
    );
    report
}

fn zip_detail(error: &ArchiveError) -> String {
    match error {
        ArchiveError::Corrupt(zip) => zip.to_string(),
        other => other.to_string(),
    }
}
