use std::fs;
use std::string::FromUtf8Error;

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::banner::Banner;

/// How file bytes are interpreted as text.
///
/// `Lossy` replaces invalid UTF-8 sequences with U+FFFD and never fails;
/// `Strict` rejects invalid UTF-8, which is the one recoverable error of a
/// run: the file is skipped and the walk continues.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    #[default]
    Lossy,
    Strict,
}

#[derive(Clone, Copy, Debug)]
pub struct StampOptions {
    pub policy: DecodePolicy,
    /// Leave files alone when their content already starts with the banner.
    /// Off by default: re-running the tool prepends the banner again.
    pub skip_stamped: bool,
    pub dry_run: bool,
}

/// A file left untouched because its bytes could not be decoded.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: Utf8PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct StampOutcome {
    pub stamped: Vec<Utf8PathBuf>,
    pub already_stamped: Vec<Utf8PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Default)]
pub struct CheckOutcome {
    pub scanned: usize,
    pub missing: Vec<Utf8PathBuf>,
}

/// Prepend `banner` to every file under `dir`, recursively and without
/// depth limit or name filtering. Files are rewritten in place with a
/// single truncating write; there is no backup and no atomicity. Only
/// decode failures are recoverable, any other I/O error aborts the run.
pub fn stamp_tree(dir: &Utf8Path, banner: &Banner, opts: &StampOptions) -> Result<StampOutcome> {
    let mut outcome = StampOutcome::default();
    stamp_directory(dir, banner, opts, &mut outcome)?;
    Ok(outcome)
}

fn stamp_directory(
    dir: &Utf8Path,
    banner: &Banner,
    opts: &StampOptions,
    outcome: &mut StampOutcome,
) -> Result<()> {
    for (path, file_type) in sorted_entries(dir)? {
        if file_type.is_dir() {
            stamp_directory(&path, banner, opts, outcome)?;
        } else if file_type.is_symlink() && path.is_dir() {
            // Symlinked directories are never descended; following them
            // would stamp files outside the target tree.
            debug!("not following directory symlink {}", path);
        } else {
            stamp_file(&path, banner, opts, outcome)?;
        }
    }
    Ok(())
}

fn stamp_file(
    path: &Utf8Path,
    banner: &Banner,
    opts: &StampOptions,
    outcome: &mut StampOutcome,
) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path))?;

    let content = match decode(bytes, opts.policy) {
        Ok(content) => content,
        Err(err) => {
            warn!("skipping {}: {}", path, err);
            outcome.skipped.push(SkippedFile {
                path: path.to_owned(),
                reason: err.to_string(),
            });
            return Ok(());
        }
    };

    if opts.skip_stamped && banner.matches(&content) {
        debug!("already stamped: {}", path);
        outcome.already_stamped.push(path.to_owned());
        return Ok(());
    }

    if !opts.dry_run {
        let mut stamped = String::with_capacity(banner.text().len() + content.len());
        stamped.push_str(banner.text());
        stamped.push_str(&content);
        fs::write(path, stamped).with_context(|| format!("writing {}", path))?;
    }

    debug!("stamped {}", path);
    outcome.stamped.push(path.to_owned());
    Ok(())
}

/// Walk the same tree read-only and report files whose content does not
/// begin with the banner. Reads are always lossy, so nothing is skipped.
pub fn check_tree(dir: &Utf8Path, banner: &Banner) -> Result<CheckOutcome> {
    let mut outcome = CheckOutcome::default();
    check_directory(dir, banner, &mut outcome)?;
    Ok(outcome)
}

fn check_directory(dir: &Utf8Path, banner: &Banner, outcome: &mut CheckOutcome) -> Result<()> {
    for (path, file_type) in sorted_entries(dir)? {
        if file_type.is_dir() {
            check_directory(&path, banner, outcome)?;
        } else if file_type.is_symlink() && path.is_dir() {
            debug!("not following directory symlink {}", path);
        } else {
            let bytes = fs::read(&path).with_context(|| format!("reading {}", path))?;
            let content = String::from_utf8_lossy(&bytes);
            outcome.scanned += 1;
            if !banner.matches(&content) {
                outcome.missing.push(path);
            }
        }
    }
    Ok(())
}

fn decode(bytes: Vec<u8>, policy: DecodePolicy) -> Result<String, FromUtf8Error> {
    match policy {
        DecodePolicy::Lossy => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        DecodePolicy::Strict => String::from_utf8(bytes),
    }
}

/// Directory entries in sorted order, for stable diagnostics across runs.
/// File types come from the entries themselves, without following symlinks.
fn sorted_entries(dir: &Utf8Path) -> Result<Vec<(Utf8PathBuf, fs::FileType)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading directory {}", dir))? {
        let entry = entry.with_context(|| format!("reading directory {}", dir))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|p| anyhow!("path {} is not valid UTF-8", p.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("reading directory {}", dir))?;
        entries.push((path, file_type));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
