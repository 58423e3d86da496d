//! Read-only access to a job's output tree.
//!
//! Every client path is resolved against the job's output directory and
//! rejected if it would leave it, first lexically and then again after
//! symlinks are resolved.

use std::cmp::Ordering;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use encoding_rs::UTF_8;
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_MAX_KB: u64 = 256;
pub const MAX_KB_LIMIT: u64 = 4096;

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("path {0:?} escapes the job output directory")]
    Traversal(String),
    #[error("path {0:?} not found")]
    NotFound(String),
    #[error("path {0:?} is not a regular file")]
    NotAFile(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Listing {
    Directory { path: String, entries: Vec<EntryInfo> },
    File { path: String, entry: EntryInfo },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileContent {
    pub path: String,
    pub size_bytes: u64,
    pub truncated: bool,
    pub content: String,
}

/// Resolves `rel` inside `root`. Leading slashes are read as relative to
/// `root`; `..` may not climb above it and symlinks may not point out of it.
pub fn resolve_within(root: &Path, rel: &str) -> Result<PathBuf, BrowseError> {
    let mut normalized = PathBuf::new();
    for component in Path::new(rel.trim()).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(BrowseError::Traversal(rel.to_string()));
                }
            }
            Component::Prefix(_) => return Err(BrowseError::Traversal(rel.to_string())),
        }
    }

    let canonical_root = canonicalize(root, rel)?;
    let resolved = canonicalize(&root.join(&normalized), rel)?;
    if !resolved.starts_with(&canonical_root) {
        return Err(BrowseError::Traversal(rel.to_string()));
    }
    Ok(resolved)
}

fn canonicalize(path: &Path, rel: &str) -> Result<PathBuf, BrowseError> {
    path.canonicalize().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => BrowseError::NotFound(rel.to_string()),
        _ => BrowseError::Io(err),
    })
}

/// Lists a directory (directories first, then by name) or describes a file.
pub fn browse(root: &Path, rel: &str) -> Result<Listing, BrowseError> {
    let target = resolve_within(root, rel)?;
    let meta = fs::metadata(&target)?;
    let path = display_path(rel);

    if !meta.is_dir() {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(Listing::File {
            path,
            entry: EntryInfo {
                name,
                kind: kind_of(&meta),
                size_bytes: meta.len(),
            },
        });
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&target)? {
        let entry = entry?;
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            // Vanished between listing and stat.
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        let kind = kind_of(&meta);
        entries.push(EntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind,
            size_bytes: if kind == EntryKind::File { meta.len() } else { 0 },
        });
    }
    entries.sort_by(|a, b| match (a.kind == EntryKind::Dir, b.kind == EntryKind::Dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    Ok(Listing::Directory { path, entries })
}

/// Reads at most `max_kb` KiB of a file as text. Invalid UTF-8 is replaced,
/// never reported as an error.
pub fn read_file(root: &Path, rel: &str, max_kb: u64) -> Result<FileContent, BrowseError> {
    let target = resolve_within(root, rel)?;
    let meta = fs::metadata(&target)?;
    if !meta.is_file() {
        return Err(BrowseError::NotAFile(rel.to_string()));
    }

    let limit = max_kb.clamp(1, MAX_KB_LIMIT) * 1024;
    let mut buf = Vec::with_capacity(meta.len().min(limit) as usize);
    fs::File::open(&target)?.take(limit).read_to_end(&mut buf)?;
    let (text, _, _) = UTF_8.decode(&buf);

    Ok(FileContent {
        path: display_path(rel),
        size_bytes: meta.len(),
        truncated: meta.len() > buf.len() as u64,
        content: text.into_owned(),
    })
}

fn kind_of(meta: &fs::Metadata) -> EntryKind {
    if meta.is_dir() {
        EntryKind::Dir
    } else if meta.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

fn display_path(rel: &str) -> String {
    let trimmed = rel.trim().trim_start_matches('/');
    trimmed.to_string()
}
