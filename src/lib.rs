//! Bulk design upload toolkit for the WeDesignz marketplace.
//!
//! Validates designer upload archives (a ZIP of design folders plus a
//! `metadata.xlsx` sheet) before they are sent to the backend, and generates
//! a ready-to-fill template archive.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod metadata;
pub mod session;
pub mod template;
pub mod validation;
pub mod workbook;

pub use archive::{scan_archive, ArchiveError, ArchiveScan, DesignFolder, RequiredExtension};
pub use catalog::{CatalogError, CatalogSource, HttpCatalog, MinimumDesigns, StaticCatalog};
pub use config::Config;
pub use session::{Ticket, ValidationSession};
pub use template::{generate_template, TemplateError, DEFAULT_TEMPLATE_NAME};
pub use validation::{
    validate_archive, validate_archive_file, ValidationError, ValidationReport, ValidationSummary,
    DEFAULT_MINIMUM_DESIGNS, MAX_ARCHIVE_SIZE,
};
pub use workbook::WorkbookError;
