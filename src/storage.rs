//! Storage boundary - file access confined to a single workspace root
//!
//! Every read, write and listing goes through [`Workspace::resolve`], which
//! rejects any path whose resolved form leaves the root. The workspace holds
//! no state beyond its root, so one instance is shared by every unit.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorKind;

/// Errors raised by the storage boundary
#[derive(Debug, Error)]
pub enum StorageError {
    /// Nothing exists at the requested path
    #[error("'{0}' not found in workspace")]
    NotFound(String),

    /// Path exists but is not a regular file
    #[error("'{0}' is not a file")]
    NotAFile(String),

    /// Path exists but is not a directory
    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    /// Path resolves outside the workspace root
    #[error("access denied: '{0}' resolves outside the workspace")]
    PathEscape(String),

    /// Underlying filesystem failure
    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: impl Into<String>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::NotAFile(_) => ErrorKind::NotAFile,
            StorageError::NotADirectory(_) => ErrorKind::NotADirectory,
            StorageError::PathEscape(_) => ErrorKind::PathEscape,
            StorageError::Io { .. } => ErrorKind::IoFailure,
        }
    }
}

/// Kind of a listed directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// File name without directories
    pub name: String,
    /// Path relative to the workspace root, `/`-separated
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

/// Ordered listing of a workspace directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Path as requested (empty for the root)
    pub path: String,
    pub entries: Vec<DirEntry>,
}

impl Listing {
    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "Directory '{}' is empty.", self.path);
        }
        let lines: Vec<String> = self
            .entries
            .iter()
            .map(|entry| match entry.kind {
                EntryKind::Dir => format!("[DIR]  {}/", entry.path),
                EntryKind::File => format!("[FILE] {} ({} bytes)", entry.path, entry.size),
            })
            .collect();
        f.write_str(&lines.join("\n"))
    }
}

/// Confirmation of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    /// Path relative to the workspace root
    pub path: String,
    pub bytes: usize,
    pub chars: usize,
}

impl fmt::Display for WriteReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File '{}' written successfully ({} characters).",
            self.path, self.chars
        )
    }
}

/// File access confined to a workspace root
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open a workspace, creating the root directory if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let label = root.display().to_string();
        fs::create_dir_all(root).map_err(|e| StorageError::io(label.clone(), e))?;
        let root = root
            .canonicalize()
            .map_err(|e| StorageError::io(label, e))?;

        debug!(root = %root.display(), "Opened workspace");
        Ok(Self { root })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical file name to an absolute path strictly inside the root
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        self.resolve_within(name, false)
    }

    fn resolve_within(&self, name: &str, allow_root: bool) -> Result<PathBuf, StorageError> {
        let requested = Path::new(name);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };

        let normalized =
            normalize(&joined).ok_or_else(|| StorageError::PathEscape(name.to_string()))?;
        // Relative names are joined onto the canonical root, so a lexical
        // escape is final. Absolute names may spell the root through an
        // alias and are only judged once canonicalized.
        if !requested.is_absolute() {
            self.ensure_contained(name, &normalized, allow_root)?;
        }

        let resolved = match canonicalize_existing(&normalized) {
            Ok(resolved) => resolved,
            Err(e) => {
                return Err(match dangling_target(&normalized) {
                    Some(target) if !target.starts_with(&self.root) => {
                        warn!(
                            requested = name,
                            target = %target.display(),
                            "Rejected dangling link outside workspace"
                        );
                        StorageError::PathEscape(name.to_string())
                    }
                    _ => StorageError::io(name, e),
                });
            }
        };
        self.ensure_contained(name, &resolved, allow_root)?;
        Ok(resolved)
    }

    fn ensure_contained(
        &self,
        name: &str,
        path: &Path,
        allow_root: bool,
    ) -> Result<(), StorageError> {
        let inside = if path == self.root {
            allow_root
        } else {
            path.starts_with(&self.root)
        };
        if inside {
            Ok(())
        } else {
            warn!(requested = name, resolved = %path.display(), "Rejected path outside workspace");
            Err(StorageError::PathEscape(name.to_string()))
        }
    }

    /// Read a whole file as UTF-8 text
    pub fn read(&self, name: &str) -> Result<String, StorageError> {
        let path = self.resolve(name)?;
        let meta = fs::metadata(&path).map_err(|e| not_found_or_io(name, e))?;
        if !meta.is_file() {
            return Err(StorageError::NotAFile(name.to_string()));
        }
        let content = fs::read_to_string(&path).map_err(|e| StorageError::io(name, e))?;

        debug!(file = name, bytes = content.len(), "Read file");
        Ok(content)
    }

    /// Write a file, creating parent directories as needed
    pub fn write(&self, name: &str, content: &str) -> Result<WriteReceipt, StorageError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(name, e))?;
        }
        fs::write(&path, content).map_err(|e| StorageError::io(name, e))?;

        let receipt = WriteReceipt {
            path: self.relative(&path),
            bytes: content.len(),
            chars: content.chars().count(),
        };
        debug!(file = %receipt.path, bytes = receipt.bytes, "Wrote file");
        Ok(receipt)
    }

    /// List a directory; the empty path lists the root
    pub fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let dir = self.resolve_within(path, true)?;
        let meta = fs::metadata(&dir).map_err(|e| not_found_or_io(path, e))?;
        if !meta.is_dir() {
            return Err(StorageError::NotADirectory(path.to_string()));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| StorageError::io(path, e))? {
            let entry = entry.map_err(|e| StorageError::io(path, e))?;
            let meta = entry.metadata().map_err(|e| StorageError::io(path, e))?;
            let kind = if meta.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: self.relative(&entry.path()),
                kind,
                size: if kind == EntryKind::Dir { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Listing {
            path: path.to_string(),
            entries,
        })
    }

    /// Path relative to the root, `/`-separated
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn not_found_or_io(name: &str, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::io(name, err)
    }
}

/// Resolve `.` and `..` without touching the filesystem. `None` when `..`
/// climbs above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Canonicalize the deepest existing ancestor and re-append the rest, so
/// symlinks along the existing part of the path are followed.
fn canonicalize_existing(path: &Path) -> io::Result<PathBuf> {
    for ancestor in path.ancestors() {
        match ancestor.canonicalize() {
            Ok(canonical) => {
                let rest = path.strip_prefix(ancestor).unwrap_or_else(|_| Path::new(""));
                return Ok(if rest.as_os_str().is_empty() {
                    canonical
                } else {
                    canonical.join(rest)
                });
            }
            // Dangling symlink: it exists but its target cannot be resolved.
            Err(e) if ancestor.symlink_metadata().is_ok() => return Err(e),
            Err(_) => continue,
        }
    }
    Ok(path.to_path_buf())
}

/// Lexical target of the first dangling symlink along `path`
///
/// A target climbing above the filesystem root comes back empty, which no
/// workspace contains.
fn dangling_target(path: &Path) -> Option<PathBuf> {
    let link = path.ancestors().find(|a| {
        a.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
            && a.canonicalize().is_err()
    })?;
    let target = fs::read_link(link).ok()?;
    let base = link.parent()?.canonicalize().ok()?;
    Some(normalize(&base.join(target)).unwrap_or_default())
}
