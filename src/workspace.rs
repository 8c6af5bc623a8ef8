//! Project file discovery
//!
//! Walks a project root with gitignore awareness and filters the result down
//! to indexable source files. Build output, dependency trees, lockfiles, and
//! binary assets are excluded up front so the indexer never reads them.
//!
//! Paths are reported relative to the scanned root with forward slashes, so
//! index records and graph node keys stay stable across platforms.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use once_cell::sync::Lazy;

use crate::error::{CtxError, Result};
use crate::schema::FileMetadata;

/// Directory names that are never worth indexing
static IGNORED_DIRS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "node_modules",
        "dist",
        "build",
        ".git",
        ".next",
        "target",
        "out",
        ".turbo",
        "coverage",
        ".cache",
        ".vscode",
        ".idea",
        "__pycache__",
        "venv",
        "env",
    ]
});

/// Extensions for generated or binary content
static IGNORED_EXTENSIONS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2", "ttf", "eot", "otf",
        "mp3", "mp4", "wav", "avi", "mov", "zip", "tar", "gz", "rar", "7z", "exe", "dll", "so",
        "dylib", "bin", "lock", "log", "map",
    ]
});

/// Specific filenames excluded regardless of extension
static IGNORED_FILES: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "Cargo.lock"]);

/// Should this path be indexed at all?
pub fn should_index(path: &Path) -> bool {
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if IGNORED_DIRS.iter().any(|d| *d == name) {
            return false;
        }
    }

    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return false,
    };
    if IGNORED_FILES.iter().any(|f| *f == file_name) {
        return false;
    }
    if file_name.ends_with(".min.js") || file_name.ends_with(".min.css") {
        return false;
    }

    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            !IGNORED_EXTENSIONS.iter().any(|e| *e == ext)
        }
        // Extensionless files (Makefile, Dockerfile, ...) are fine
        None => true,
    }
}

/// Filesystem access used by the indexer.
///
/// A trait seam so indexing logic can be tested against fixture directories
/// without touching global state.
pub trait Workspace: Send + Sync {
    /// Root-relative paths (forward-slash form) of all indexable files
    fn scan(&self) -> Result<Vec<String>>;

    /// Read a file's content by root-relative path
    fn read(&self, rel_path: &str) -> Result<String>;

    /// Metadata for a file by root-relative path
    fn stat(&self, rel_path: &str) -> Result<FileMetadata>;
}

/// Workspace backed by a real directory tree
pub struct OsWorkspace {
    root: PathBuf,
}

impl OsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }
}

impl Workspace for OsWorkspace {
    fn scan(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(CtxError::FileNotFound {
                path: self.root.display().to_string(),
            });
        }

        let mut builder = WalkBuilder::new(&self.root);
        builder.git_ignore(true);
        builder.git_global(true);
        builder.git_exclude(true);
        builder.follow_links(false);
        builder.hidden(false);

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if !should_index(path) {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(&self.root) {
                files.push(normalize_rel_path(rel));
            }
        }

        files.sort();
        Ok(files)
    }

    fn read(&self, rel_path: &str) -> Result<String> {
        let path = self.absolute(rel_path);
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CtxError::FileNotFound {
                    path: rel_path.to_string(),
                }
            } else {
                CtxError::Io(e)
            }
        })
    }

    fn stat(&self, rel_path: &str) -> Result<FileMetadata> {
        let path = self.absolute(rel_path);
        let meta = fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CtxError::FileNotFound {
                    path: rel_path.to_string(),
                }
            } else {
                CtxError::Io(e)
            }
        })?;

        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(FileMetadata {
            path: rel_path.to_string(),
            last_modified,
            size: meta.len(),
            hash: None,
        })
    }
}

/// Normalize a relative path to forward-slash form
fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
