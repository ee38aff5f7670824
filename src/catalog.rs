//! Recursive file catalog of a source folder, naturally sorted.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("folder not found: {0}")]
    NotFound(PathBuf),
    #[error("not a folder: {0}")]
    NotADirectory(PathBuf),
}

/// Files found under a root folder, plus the paths that could not be resolved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub files: Vec<PathBuf>,
    pub errors: Vec<PathBuf>,
}

/// Walk every descendant of `root`.
///
/// An entry that cannot be resolved, such as a broken link or an overlong path, is
/// recorded in [`Catalog::errors`] instead of aborting the scan.
/// With `sort`, both lists are put in natural order, see [`natural_sort`].
pub fn build_catalog(root: &Path, sort: bool) -> Result<Catalog, CatalogError> {
    if !root.exists() {
        error!(root = %root.display(), "Folder does not exist");
        return Err(CatalogError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        error!(root = %root.display(), "Path is not a folder");
        return Err(CatalogError::NotADirectory(root.to_path_buf()));
    }

    info!(root = %root.display(), "Scanning folder");
    let mut catalog = Catalog::default();

    for entry in WalkDir::new(root).min_depth(1).follow_links(true) {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if !path.exists() {
                    error!(path = %path.display(), "Path cannot be resolved (path too long?)");
                    catalog.errors.push(path.to_path_buf());
                } else if !entry.file_type().is_dir() {
                    catalog.files.push(entry.into_path());
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read entry");
                if let Some(path) = e.path() {
                    catalog.errors.push(path.to_path_buf());
                }
            }
        }
    }

    if sort {
        natural_sort(&mut catalog.files);
        natural_sort(&mut catalog.errors);
    }

    debug!(
        files = catalog.files.len(),
        errors = catalog.errors.len(),
        "Scan finished"
    );
    Ok(catalog)
}

/// Sort paths the way a person would: `f2` before `f10`, case and diacritics ignored.
pub fn natural_sort(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|p| NaturalKey::of(p));
}

/// Lower-cased, diacritic-free form of a path, ordered by [`natural_cmp`].
#[derive(Debug, PartialEq, Eq)]
struct NaturalKey(String);

impl NaturalKey {
    fn of(path: &Path) -> Self {
        Self(deunicode::deunicode(&path.to_string_lossy().to_lowercase()))
    }
}

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two strings chunk by chunk, digit runs by numeric value.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = compare_chunks(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_chunks(l: &str, r: &str) -> Ordering {
    let l_digits = l.starts_with(|c: char| c.is_ascii_digit());
    let r_digits = r.starts_with(|c: char| c.is_ascii_digit());
    match (l_digits, r_digits) {
        (true, true) => {
            let l_trim = l.trim_start_matches('0');
            let r_trim = r.trim_start_matches('0');
            l_trim
                .len()
                .cmp(&r_trim.len())
                .then_with(|| l_trim.cmp(r_trim))
                .then_with(|| l.len().cmp(&r.len()))
        }
        // numbers sort before text
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => l.cmp(r),
    }
}

/// Splits a string into alternating runs of ASCII digits and everything else.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}
