//! CLI interface for the bulk upload toolkit
//!
//! Checks upload archives before they are sent to the marketplace and
//! produces the template archive designers start from.

use bulk_upload_lib::archive::ArchiveScan;
use bulk_upload_lib::{
    generate_template, scan_archive, validate_archive_file, CatalogSource, Config, HttpCatalog,
    MinimumDesigns, StaticCatalog, Ticket, ValidationError, ValidationReport, ValidationSession,
    DEFAULT_TEMPLATE_NAME, MAX_ARCHIVE_SIZE,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode};

// Exit codes with clear semantics
mod exit_codes {
    /// Operation completed successfully (archive is valid)
    pub const SUCCESS: i32 = 0;
    /// Operation failed or the archive is invalid
    pub const ERROR: i32 = 1;
    /// Invalid usage or arguments
    pub const USAGE_ERROR: i32 = 2;
}

/// Debounce window for watch mode
const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Bulk upload toolkit - validate design archives and generate templates
#[derive(Parser)]
#[command(name = "bulk-upload")]
#[command(author, version, about)]
#[command(after_help = "\
EXAMPLES:
    Validate an archive using the threshold from the API:
        bulk-upload validate ./designs.zip

    Validate offline with an explicit threshold:
        bulk-upload validate ./designs.zip --offline --min-designs 10

    Print the report as JSON:
        bulk-upload validate ./designs.zip --offline --json

    Show the folders detected in an archive:
        bulk-upload inspect ./designs.zip

    Generate a template using categories from the API:
        bulk-upload template --output ./bulk_upload_template.zip

    Generate a template from a local catalog file:
        bulk-upload template --catalog ./categories.json --overwrite

    Re-validate every time the archive changes:
        bulk-upload watch ./designs.zip --offline

ENVIRONMENT:
    WEDESIGNZ_API_URL       Marketplace API base URL (default http://localhost:8000)
    WEDESIGNZ_MIN_DESIGNS   Fixed minimum number of complete designs
    RUST_LOG                Log filter (default warn)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a bulk upload archive
    Validate {
        /// Path to the ZIP archive
        archive: PathBuf,

        #[command(flatten)]
        threshold: ThresholdArgs,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the design folders detected in an archive
    Inspect {
        /// Path to the ZIP archive
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a template archive with a pre-filled metadata.xlsx
    Template {
        /// Output file path
        #[arg(short, long, default_value = DEFAULT_TEMPLATE_NAME)]
        output: PathBuf,

        /// Overwrite existing output file
        #[arg(long)]
        overwrite: bool,

        /// Load categories from a JSON file instead of the API
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Marketplace API base URL
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Validate an archive and re-validate it whenever it changes
    Watch {
        /// Path to the ZIP archive
        archive: PathBuf,

        #[command(flatten)]
        threshold: ThresholdArgs,
    },
}

/// Options that decide the minimum number of complete designs
#[derive(clap::Args)]
struct ThresholdArgs {
    /// Minimum number of complete design folders required
    #[arg(long)]
    min_designs: Option<usize>,

    /// Marketplace API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Do not contact the API; use the default threshold unless --min-designs is set
    #[arg(long)]
    offline: bool,
}

/// CLI execution result
enum CliResult {
    Success,
    Error(String),
    UsageError(String),
}

/// Report layout for `--json`: rendered messages plus the tagged errors
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    valid: bool,
    errors: Vec<String>,
    design_count: usize,
    details: &'a [ValidationError],
}

impl<'a> From<&'a ValidationReport> for JsonReport<'a> {
    fn from(report: &'a ValidationReport) -> Self {
        Self {
            valid: report.valid,
            errors: report.messages(),
            design_count: report.design_count,
            details: &report.errors,
        }
    }
}

/// Print to stderr (for status messages)
macro_rules! status {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

/// Install the log subscriber. `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Check that `path` names an existing regular file.
fn require_file(path: &Path) -> Result<(), CliResult> {
    if !path.exists() {
        return Err(CliResult::UsageError(format!(
            "File does not exist: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(CliResult::UsageError(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Validate that the output path's parent directory exists and is writable.
fn validate_output_path(path: &Path) -> Result<(), String> {
    let parent = path.parent().unwrap_or(Path::new("."));
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    if !parent.exists() {
        return Err(format!("Parent directory does not exist: {}", parent.display()));
    }

    match std::fs::metadata(parent) {
        Ok(meta) if meta.permissions().readonly() => Err(format!(
            "Parent directory is read-only: {}",
            parent.display()
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(format!(
            "Cannot access parent directory {}: {}",
            parent.display(),
            e
        )),
    }
}

/// Resolve the design threshold: flag, then environment, then API, then default.
fn resolve_minimum(threshold: &ThresholdArgs, quiet: bool) -> Result<usize, CliResult> {
    let config = Config::from_env().with_overrides(threshold.api_url.clone(), threshold.min_designs);
    let minimum = MinimumDesigns::new(config.minimum_designs);

    if threshold.offline || config.minimum_designs.is_some() {
        return Ok(minimum.resolve(None));
    }

    let catalog = HttpCatalog::new(&config.api_url)
        .map_err(|e| CliResult::UsageError(format!("Invalid API URL '{}': {}", config.api_url, e)))?;
    status!(quiet, "Fetching onboarding threshold from {}", catalog.base_url());
    Ok(minimum.resolve(Some(&catalog)))
}

fn print_report(report: &ValidationReport, json_output: bool, quiet: bool) -> CliResult {
    if json_output {
        match serde_json::to_string_pretty(&JsonReport::from(report)) {
            Ok(json) => println!("{}", json),
            Err(e) => return CliResult::Error(format!("Failed to serialize report: {}", e)),
        }
    } else if report.valid {
        println!(
            "Valid: {} design folder(s) ready for upload.",
            report.design_count
        );
    } else {
        println!(
            "Invalid: {} problem(s) found ({} complete design folder(s)).",
            report.errors.len(),
            report.design_count
        );
        for message in report.messages() {
            println!("  ! {}", message);
        }
    }

    if report.valid {
        CliResult::Success
    } else {
        status!(quiet || json_output, "Fix the problems above and validate again.");
        CliResult::Error("Archive failed validation".to_string())
    }
}

fn print_scan(scan: &ArchiveScan, json_output: bool) -> CliResult {
    if json_output {
        return match serde_json::to_string_pretty(scan) {
            Ok(json) => {
                println!("{}", json);
                CliResult::Success
            }
            Err(e) => CliResult::Error(format!("Failed to serialize scan: {}", e)),
        };
    }

    println!("Entries: {}", scan.entry_count);
    println!(
        "Metadata: {}",
        scan.metadata_path.as_deref().unwrap_or("(not found)")
    );
    println!("Folders: {}", scan.folders.folders.len());
    for folder in &scan.folders.folders {
        let marker = if folder.is_complete() { "+" } else { "!" };
        let extensions: Vec<&str> = folder.extensions.iter().map(|e| e.as_str()).collect();
        let mut line = format!("  {} {} [{}]", marker, folder.name, extensions.join(" "));
        if folder.has_mockup {
            line.push_str(" (mockup)");
        }
        println!("{}", line);
    }
    if !scan.folders.nested_too_deep.is_empty() {
        println!("Nested too deeply:");
        for path in &scan.folders.nested_too_deep {
            println!("  ? {}", path);
        }
    }
    CliResult::Success
}

fn cmd_validate(archive: &Path, threshold: &ThresholdArgs, json_output: bool, quiet: bool) -> CliResult {
    if let Err(e) = require_file(archive) {
        return e;
    }
    let minimum = match resolve_minimum(threshold, quiet || json_output) {
        Ok(m) => m,
        Err(e) => return e,
    };

    status!(
        quiet || json_output,
        "Validating {} (minimum {} designs)",
        archive.display(),
        minimum
    );
    let report = validate_archive_file(archive, minimum);
    print_report(&report, json_output, quiet)
}

fn cmd_inspect(archive: &Path, json_output: bool) -> CliResult {
    if let Err(e) = require_file(archive) {
        return e;
    }

    match std::fs::metadata(archive) {
        Ok(meta) if meta.len() > MAX_ARCHIVE_SIZE => {
            return CliResult::Error(format!(
                "Archive is larger than {} MB",
                MAX_ARCHIVE_SIZE / (1024 * 1024)
            ))
        }
        Ok(_) => {}
        Err(e) => return CliResult::Error(format!("Failed to access archive: {}", e)),
    }

    let data = match std::fs::read(archive) {
        Ok(d) => d,
        Err(e) => return CliResult::Error(format!("Failed to read archive: {}", e)),
    };

    match scan_archive(&data) {
        Ok(scan) => print_scan(&scan, json_output),
        Err(e) => CliResult::Error(e.to_string()),
    }
}

fn cmd_template(
    output: &Path,
    overwrite: bool,
    catalog_file: Option<&Path>,
    api_url: Option<String>,
    quiet: bool,
) -> CliResult {
    if let Err(e) = validate_output_path(output) {
        return CliResult::UsageError(e);
    }
    if output.exists() && !overwrite {
        return CliResult::Error(format!(
            "Output file already exists: {}. Use --overwrite to replace it.",
            output.display()
        ));
    }

    let catalog: Box<dyn CatalogSource> = match catalog_file {
        Some(path) => match StaticCatalog::from_file(path) {
            Ok(c) => {
                status!(quiet, "Using categories from {}", path.display());
                Box::new(c)
            }
            Err(e) => return CliResult::Error(format!("Failed to load catalog: {}", e)),
        },
        None => {
            let config = Config::from_env().with_overrides(api_url, None);
            match HttpCatalog::new(&config.api_url) {
                Ok(c) => {
                    status!(quiet, "Fetching categories from {}", c.base_url());
                    Box::new(c)
                }
                Err(e) => {
                    return CliResult::UsageError(format!(
                        "Invalid API URL '{}': {}",
                        config.api_url, e
                    ))
                }
            }
        }
    };

    let bytes = match generate_template(catalog.as_ref()) {
        Ok(b) => b,
        Err(e) => return CliResult::Error(format!("Failed to generate template: {}", e)),
    };

    if let Err(e) = std::fs::write(output, &bytes) {
        return CliResult::Error(format!("Failed to write file: {}", e));
    }

    status!(quiet, "Template written to {}", output.display());
    CliResult::Success
}

/// Start the watch worker. It validates once per received ticket, skipping
/// tickets that were superseded while it was busy, and prints only results
/// that are still current.
fn spawn_worker(
    session: Arc<ValidationSession>,
    archive: PathBuf,
    minimum: usize,
    quiet: bool,
) -> (mpsc::Sender<Ticket>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Ticket>();

    let handle = thread::spawn(move || {
        while let Ok(mut ticket) = rx.recv() {
            // Only the newest queued request matters
            while let Ok(newer) = rx.try_recv() {
                ticket = newer;
            }
            if !session.is_current(ticket) {
                continue;
            }

            let report = validate_archive_file(&archive, minimum);
            if !session.commit(ticket, report.clone()) {
                continue;
            }
            match print_report(&report, false, quiet) {
                CliResult::Success => {
                    tracing::info!(designs = report.design_count, "archive is valid")
                }
                CliResult::Error(e) | CliResult::UsageError(e) => {
                    tracing::info!(problems = report.errors.len(), "{}", e)
                }
            }
        }
    });

    (tx, handle)
}

fn cmd_watch(archive: &Path, threshold: &ThresholdArgs, quiet: bool) -> CliResult {
    if let Err(e) = require_file(archive) {
        return e;
    }
    let minimum = match resolve_minimum(threshold, quiet) {
        Ok(m) => m,
        Err(e) => return e,
    };

    let session = Arc::new(ValidationSession::new());
    let (requests, worker) =
        spawn_worker(Arc::clone(&session), archive.to_path_buf(), minimum, quiet);
    status!(quiet, "Validating {} (minimum {} designs)", archive.display(), minimum);
    if requests.send(session.begin()).is_err() {
        return CliResult::Error("Validation worker stopped".to_string());
    }

    // Watch the parent directory; single-file watches miss editors that replace the file
    let watch_dir = archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (tx, rx) = mpsc::channel();
    let mut debouncer = match new_debouncer(WATCH_DEBOUNCE, tx) {
        Ok(d) => d,
        Err(e) => return CliResult::Error(format!("Failed to create file watcher: {}", e)),
    };
    if let Err(e) = debouncer
        .watcher()
        .watch(&watch_dir, RecursiveMode::NonRecursive)
    {
        return CliResult::Error(format!("Failed to watch directory: {}", e));
    }

    status!(quiet, "Watching {} for changes (Ctrl+C to stop)", archive.display());

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(events)) => {
                let relevant = events.iter().any(|event| {
                    event
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy() == file_name)
                        .unwrap_or(false)
                });
                if relevant && archive.is_file() {
                    status!(quiet, "{} changed, validating again", archive.display());
                    if requests.send(session.begin()).is_err() {
                        tracing::warn!("validation worker stopped");
                        break;
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = ?e, "watch error");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(requests);
    if worker.join().is_err() {
        return CliResult::Error("Validation worker panicked".to_string());
    }
    CliResult::Success
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let quiet = cli.quiet;

    let result = match cli.command {
        Commands::Validate {
            archive,
            threshold,
            json,
        } => cmd_validate(&archive, &threshold, json, quiet),

        Commands::Inspect { archive, json } => cmd_inspect(&archive, json),

        Commands::Template {
            output,
            overwrite,
            catalog,
            api_url,
        } => cmd_template(&output, overwrite, catalog.as_deref(), api_url, quiet),

        Commands::Watch { archive, threshold } => cmd_watch(&archive, &threshold, quiet),
    };

    match result {
        CliResult::Success => std::process::exit(exit_codes::SUCCESS),
        CliResult::Error(e) => {
            // Errors always print, regardless of --quiet
            eprintln!("Error: {}", e);
            std::process::exit(exit_codes::ERROR);
        }
        CliResult::UsageError(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_codes::USAGE_ERROR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watch_worker_commits_current_request() {
        let session = Arc::new(ValidationSession::new());
        let (requests, worker) = spawn_worker(
            Arc::clone(&session),
            PathBuf::from("/nonexistent/upload.zip"),
            1,
            true,
        );

        requests.send(session.begin()).unwrap();
        drop(requests);
        worker.join().unwrap();

        let report = session.latest().expect("report committed");
        assert!(!report.valid);
        assert!(matches!(report.errors[0], ValidationError::CorruptArchive { .. }));
    }

    #[test]
    fn watch_worker_skips_superseded_request() {
        let session = Arc::new(ValidationSession::new());
        let (requests, worker) = spawn_worker(
            Arc::clone(&session),
            PathBuf::from("/nonexistent/upload.zip"),
            1,
            true,
        );

        let stale = session.begin();
        let _newer = session.begin();
        requests.send(stale).unwrap();
        drop(requests);
        worker.join().unwrap();

        assert!(session.latest().is_none());
    }

    #[test]
    fn template_output_defaults_to_standard_name() {
        let cli = Cli::try_parse_from(["bulk-upload", "template"]).unwrap();
        match cli.command {
            Commands::Template { output, overwrite, .. } => {
                assert_eq!(output, PathBuf::from("bulk_upload_template.zip"));
                assert!(!overwrite);
            }
            _ => panic!("expected template command"),
        }
    }

    #[test]
    fn validate_parses_threshold_flags() {
        let cli = Cli::try_parse_from([
            "bulk-upload",
            "validate",
            "a.zip",
            "--min-designs",
            "7",
            "--offline",
            "--json",
            "-q",
        ])
        .unwrap();

        assert!(cli.quiet);
        match cli.command {
            Commands::Validate { archive, threshold, json } => {
                assert_eq!(archive, PathBuf::from("a.zip"));
                assert_eq!(threshold.min_designs, Some(7));
                assert!(threshold.offline);
                assert!(json);
            }
            _ => panic!("expected validate command"),
        }
    }

    #[test]
    fn min_designs_must_be_a_number() {
        assert!(Cli::try_parse_from(["bulk-upload", "validate", "a.zip", "--min-designs", "many"]).is_err());
    }

    #[test]
    fn explicit_minimum_skips_api() {
        let threshold = ThresholdArgs {
            min_designs: Some(4),
            api_url: Some("not a url".to_string()),
            offline: false,
        };
        assert!(matches!(resolve_minimum(&threshold, true), Ok(4)));
    }

    #[test]
    fn output_path_in_missing_directory_is_rejected() {
        let result = validate_output_path(Path::new("/definitely/not/here/template.zip"));
        assert!(result.unwrap_err().contains("Parent directory does not exist"));
        assert!(validate_output_path(Path::new("template.zip")).is_ok());
    }

    #[test]
    fn json_report_includes_messages_and_details() {
        let report = bulk_upload_lib::validate_archive(b"nope", 1);
        let json = serde_json::to_value(JsonReport::from(&report)).unwrap();

        assert_eq!(json["valid"], false);
        assert_eq!(json["designCount"], 0);
        assert!(json["errors"][0].as_str().unwrap().starts_with("Invalid or corrupted ZIP file"));
        assert_eq!(json["details"][0]["kind"], "corrupt_archive");
    }
}
