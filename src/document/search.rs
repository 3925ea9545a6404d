//! Recursive relinking of missing media.
//!
//! The folder tree is walked once; candidates of the right size are hashed
//! in parallel with the same head/tail fingerprint the registry stores. A
//! content match wins over a file that only shares the name.

use log::{trace, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::timeline::hash::file_hash;

/// What is known about a missing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    /// File name of the missing path
    pub name: String,
    pub size: Option<u64>,
    pub hash: Option<String>,
}

impl SearchTarget {
    pub fn new(path: &str, size: Option<u64>, hash: Option<String>) -> Self {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, size, hash }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: PathBuf,
    /// Matched on size and content hash, not just the name
    pub exact: bool,
}

struct Candidate {
    path: PathBuf,
    name: String,
    size: u64,
}

fn collect(root: &Path) -> Vec<Candidate> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let size = match entry.metadata() {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        warn!("Cannot stat {}: {}", entry.path().display(), e);
                        continue;
                    }
                };
                files.push(Candidate {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.into_path(),
                    size,
                });
            }
            Ok(_) => {}
            Err(e) => warn!("Error accessing entry: {}", e),
        }
    }
    trace!("Search in {}: {} files", root.display(), files.len());
    files
}

fn find_one(files: &[Candidate], target: &SearchTarget) -> Option<SearchHit> {
    if let (Some(size), Some(hash)) = (target.size, target.hash.as_deref()) {
        let exact = files
            .par_iter()
            .filter(|c| c.size == size)
            .find_first(|c| match file_hash(&c.path) {
                Ok(digest) => digest == hash,
                Err(e) => {
                    warn!("Cannot hash {}: {}", c.path.display(), e);
                    false
                }
            });
        if let Some(c) = exact {
            return Some(SearchHit {
                path: c.path.clone(),
                exact: true,
            });
        }
    }
    if target.name.is_empty() {
        return None;
    }
    files.iter().find(|c| c.name == target.name).map(|c| SearchHit {
        path: c.path.clone(),
        exact: false,
    })
}

/// Look for every target under `root`; results are in target order.
pub fn search(root: &Path, targets: &[SearchTarget]) -> Vec<Option<SearchHit>> {
    let files = collect(root);
    targets
        .iter()
        .map(|target| {
            let hit = find_one(&files, target);
            trace!("Search {:?}: {:?}", target.name, hit.as_ref().map(|h| &h.path));
            hit
        })
        .collect()
}
