//! Content indexing for deployment.
//!
//! Walks a project root, fingerprints every regular file with SHA-256,
//! and produces a path-sorted [`Manifest`]. Indexing is atomic: the first
//! unreadable file fails the whole operation and no partial manifest is
//! produced.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use stratus_protocol::messages::FileEntry;
use stratus_transfer::calculate_file_checksum;

/// Errors produced while indexing a project tree.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl From<stratus_transfer::TransferError> for IndexError {
    fn from(e: stratus_transfer::TransferError) -> Self {
        match e {
            stratus_transfer::TransferError::Io(io) => IndexError::Io(io),
            stratus_transfer::TransferError::InvalidPath(p) => IndexError::InvalidPath(p),
        }
    }
}

/// Options controlling the tree walk.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Directory/file names excluded from the walk.
    pub ignore_names: Vec<String>,
    /// Resolve symbolic links instead of skipping them.
    ///
    /// When enabled, the walker tracks visited directory identities so
    /// link cycles terminate instead of recursing forever.
    pub follow_symlinks: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            ignore_names: [".git", ".hg", ".svn", "node_modules", "target"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            follow_symlinks: false,
        }
    }
}

/// Full listing of local files proposed for a deployment.
///
/// Entries are sorted by relative path. Created fresh per invocation and
/// never persisted.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<FileEntry>,
    total_size: i64,
}

impl Manifest {
    /// Builds a manifest from pre-computed entries.
    ///
    /// Entries are sorted by relative path; the total size is derived.
    pub fn from_entries(mut entries: Vec<FileEntry>) -> Self {
        entries.sort_unstable_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let total_size = entries.iter().map(|e| e.size).sum();
        Self {
            entries,
            total_size,
        }
    }

    /// All file entries, sorted by relative path.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Sum of all file sizes in bytes.
    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One entry per distinct fingerprint, first occurrence in path order.
    ///
    /// Duplicate local paths with identical content collapse to a single
    /// entry here; this is the unit of upload.
    pub fn unique_entries(&self) -> Vec<&FileEntry> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.checksum.as_str()))
            .collect()
    }

    /// Looks up the entry carrying the given fingerprint, if any.
    pub fn entry_for_checksum(&self, checksum: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.checksum == checksum)
    }
}

/// Indexes every regular file under `root` into a [`Manifest`].
///
/// Fails with [`IndexError`] if any file becomes unreadable mid-walk; no
/// partial manifest is returned.
pub fn index_tree(root: &Path, options: &IndexOptions) -> Result<Manifest, IndexError> {
    let ignore: HashSet<String> = options.ignore_names.iter().cloned().collect();

    let mut builder = ignore::WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(options.follow_symlinks)
        .filter_entry(move |entry| {
            // Never prune the root itself.
            if entry.depth() == 0 {
                return true;
            }
            entry
                .file_name()
                .to_str()
                .is_none_or(|name| !ignore.contains(name))
        });

    let mut entries = Vec::new();
    let mut total_size: i64 = 0;

    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            // A link cycle is not fatal: the walker already refuses to
            // descend into it, so the looping entry is simply dropped.
            Err(err) if is_symlink_loop(&err) => {
                tracing::debug!(error = %err, "skipping symlink cycle");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let Some(file_type) = entry.file_type() else {
            continue; // stdin — cannot occur for a path walk.
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        let rel = relative_path(root, path)?;
        stratus_transfer::validate_relative_path(&rel)?;

        let size = entry.metadata()?.len() as i64;
        let checksum = calculate_file_checksum(path)?;

        entries.push(FileEntry {
            relative_path: rel,
            size,
            checksum,
        });
        total_size += size;
    }

    tracing::debug!(
        files = entries.len(),
        total_bytes = total_size,
        root = %root.display(),
        "indexed project tree"
    );

    Ok(Manifest::from_entries(entries))
}

/// True when `err` is a symlink-loop report, possibly wrapped in the
/// walker's path/depth context variants.
fn is_symlink_loop(err: &ignore::Error) -> bool {
    match err {
        ignore::Error::Loop { .. } => true,
        ignore::Error::WithDepth { err, .. }
        | ignore::Error::WithPath { err, .. }
        | ignore::Error::WithLineNumber { err, .. } => is_symlink_loop(err),
        _ => false,
    }
}

/// Root-relative path normalized to forward slashes.
fn relative_path(root: &Path, path: &Path) -> Result<String, IndexError> {
    let rel: PathBuf = path
        .strip_prefix(root)
        .map_err(|_| IndexError::InvalidPath(format!("outside root: {}", path.display())))?
        .to_path_buf();
    Ok(rel.to_string_lossy().replace('\\', "/"))
}
