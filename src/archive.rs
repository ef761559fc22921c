//! Archive scanning: turns ZIP entry paths into design folders.
//!
//! Accepted layouts are `folder/file.ext` and `root/folder/file.ext`. Anything
//! deeper that looks like a design file is recorded as a structure violation
//! instead of being silently merged into a folder.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

/// Name of the metadata workbook expected inside every bulk upload
pub const METADATA_FILE_NAME: &str = "metadata.xlsx";

/// Folder or file names produced by archivers and operating systems (lowercase)
pub const SYSTEM_FOLDERS: [&str; 5] = ["__macosx", ".ds_store", "rar", ".rar", "thumbs.db"];

/// Largest uncompressed entry [`OpenedArchive::read`] will load (100 MB)
pub const MAX_ENTRY_SIZE: u64 = 100 * 1024 * 1024;

/// Optional preview images (lowercase)
pub const MOCKUP_FILE_NAMES: [&str; 2] = ["mockup.jpg", "mockup.png"];

/// A file type every design folder must contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequiredExtension {
    #[serde(rename = ".eps")]
    Eps,
    #[serde(rename = ".cdr")]
    Cdr,
    #[serde(rename = ".jpg")]
    Jpg,
    #[serde(rename = ".png")]
    Png,
}

impl RequiredExtension {
    pub const ALL: [RequiredExtension; 4] = [
        RequiredExtension::Eps,
        RequiredExtension::Cdr,
        RequiredExtension::Jpg,
        RequiredExtension::Png,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredExtension::Eps => ".eps",
            RequiredExtension::Cdr => ".cdr",
            RequiredExtension::Jpg => ".jpg",
            RequiredExtension::Png => ".png",
        }
    }

    /// Match a file name by its last extension, case-insensitively.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let dot = file_name.rfind('.')?;
        let extension = file_name[dot..].to_lowercase();
        Self::ALL.into_iter().find(|ext| ext.as_str() == extension)
    }
}

impl fmt::Display for RequiredExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One design folder detected in the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignFolder {
    pub name: String,
    pub extensions: BTreeSet<RequiredExtension>,
    pub has_mockup: bool,
}

impl DesignFolder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            extensions: BTreeSet::new(),
            has_mockup: false,
        }
    }

    /// A folder is complete when it holds every required extension.
    pub fn is_complete(&self) -> bool {
        RequiredExtension::ALL
            .iter()
            .all(|ext| self.extensions.contains(ext))
    }

    pub fn missing(&self) -> Vec<RequiredExtension> {
        RequiredExtension::ALL
            .into_iter()
            .filter(|ext| !self.extensions.contains(ext))
            .collect()
    }
}

/// Folders and structure violations found by walking the entry list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderScan {
    /// Folders in order of first appearance
    pub folders: Vec<DesignFolder>,
    /// Parent paths of design files nested deeper than `root/folder/file`
    pub nested_too_deep: Vec<String>,
}

impl FolderScan {
    pub fn complete_folders(&self) -> impl Iterator<Item = &DesignFolder> {
        self.folders.iter().filter(|f| f.is_complete())
    }

    pub fn incomplete_folders(&self) -> impl Iterator<Item = &DesignFolder> {
        self.folders.iter().filter(|f| !f.is_complete())
    }
}

/// Everything `inspect` reports about an archive
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveScan {
    pub entry_count: usize,
    pub metadata_path: Option<String>,
    #[serde(flatten)]
    pub folders: FolderScan,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Invalid or corrupted ZIP file: {0}")]
    Corrupt(#[from] ZipError),

    #[error("Failed to read archive entry {name}: {source}")]
    EntryRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive entry {name} is larger than {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },
}

/// An opened archive plus its entry names in central-directory order
pub struct OpenedArchive<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    names: Vec<String>,
}

impl<'a> OpenedArchive<'a> {
    pub fn open(data: &'a [u8]) -> Result<Self, ArchiveError> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            names.push(entry.name().to_string());
        }
        Ok(Self { archive, names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Read an entry, failing once more than `limit` bytes come out of it.
    pub fn read(&mut self, name: &str, limit: u64) -> Result<Vec<u8>, ArchiveError> {
        let file = self.archive.by_name(name)?;
        let too_large = || ArchiveError::EntryTooLarge {
            name: name.to_string(),
            limit,
        };
        // The declared size comes from the archive header and is only a hint
        if file.size() > limit {
            return Err(too_large());
        }

        let mut content = Vec::with_capacity(file.size() as usize);
        file.take(limit + 1)
            .read_to_end(&mut content)
            .map_err(|source| ArchiveError::EntryRead {
                name: name.to_string(),
                source,
            })?;

        if content.len() as u64 > limit {
            return Err(too_large());
        }
        Ok(content)
    }
}

/// Open an archive and describe its folders without validating metadata.
pub fn scan_archive(data: &[u8]) -> Result<ArchiveScan, ArchiveError> {
    let archive = OpenedArchive::open(data)?;
    let metadata_path = find_metadata(archive.names()).map(str::to_string);
    let folders = scan_entries(archive.names(), metadata_path.as_deref());

    Ok(ArchiveScan {
        entry_count: archive.names().len(),
        metadata_path,
        folders,
    })
}

/// First entry whose basename is `metadata.xlsx`, case-insensitively.
pub fn find_metadata(names: &[String]) -> Option<&str> {
    names
        .iter()
        .filter(|name| !is_directory(name))
        .find(|name| {
            basename(name).to_lowercase() == METADATA_FILE_NAME
        })
        .map(String::as_str)
}

pub fn is_system_folder(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    SYSTEM_FOLDERS.contains(&lower.as_str())
}

pub fn is_mockup(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    MOCKUP_FILE_NAMES.contains(&lower.as_str())
}

fn is_directory(name: &str) -> bool {
    name.ends_with('/')
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// How a file was attached to its folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Flat,
    Rooted,
}

/// Group entry paths into design folders.
///
/// A folder name reached through both layouts (`a/x.eps` and `root/a/x.cdr`)
/// is treated as one folder and its files are merged.
pub fn scan_entries(names: &[String], metadata_path: Option<&str>) -> FolderScan {
    let mut scan = FolderScan::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut layouts: HashMap<String, Layout> = HashMap::new();
    let mut merged: HashSet<String> = HashSet::new();

    for name in names {
        if is_directory(name) || Some(name.as_str()) == metadata_path {
            continue;
        }

        let parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
        let Some(file_name) = parts.last().copied() else {
            continue;
        };

        if file_name.starts_with("._") {
            continue;
        }
        if parts.iter().any(|p| is_system_folder(p)) {
            continue;
        }

        let extension = RequiredExtension::from_file_name(file_name);
        let mockup = is_mockup(file_name);

        let (folder, layout) = match parts.len() {
            2 => (parts[0], Layout::Flat),
            3 => (parts[1], Layout::Rooted),
            n if n > 3 => {
                if extension.is_some() || mockup {
                    let parent = parts[..n - 1].join("/");
                    if !scan.nested_too_deep.contains(&parent) {
                        scan.nested_too_deep.push(parent);
                    }
                }
                continue;
            }
            _ => continue,
        };

        match layouts.get(folder) {
            Some(previous) if *previous != layout => {
                if merged.insert(folder.to_string()) {
                    tracing::warn!(folder, "design folder appears at two nesting levels; merging its files");
                }
            }
            Some(_) => {}
            None => {
                layouts.insert(folder.to_string(), layout);
            }
        }

        let slot = *index.entry(folder.to_string()).or_insert_with(|| {
            scan.folders.push(DesignFolder::new(folder));
            scan.folders.len() - 1
        });
        let entry = &mut scan.folders[slot];

        if mockup {
            entry.has_mockup = true;
        } else if let Some(ext) = extension {
            entry.extensions.insert(ext);
        }
    }

    tracing::debug!(
        folders = scan.folders.len(),
        nested = scan.nested_too_deep.len(),
        "scanned archive entries"
    );

    scan
}
