//! Reading raw CSV inputs and writing pipeline artifacts.
//!
//! Raw inputs are read with every column as String so all typing happens in
//! the schema enforcer. Outputs go through [`StagedOutputs`], which writes
//! each artifact next to its destination and renames them into place only
//! once every write has succeeded.

use crate::error::{EtlError, Result, ResultExt};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read a CSV file with a header row, keeping every column as String.
pub fn read_csv_as_strings(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(EtlError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", path.display()),
        )));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("Opening {}", path.display()))?
        .finish()
        .context(format!("Reading {}", path.display()))?;

    info!("Loaded {}: {:?}", path.display(), df.shape());
    Ok(df)
}

pub fn read_orders_csv(path: &Path) -> Result<DataFrame> {
    read_csv_as_strings(path).context("Extracting orders")
}

pub fn read_users_csv(path: &Path) -> Result<DataFrame> {
    read_csv_as_strings(path).context("Extracting users")
}

/// Write a DataFrame as Parquet, creating parent directories.
pub fn write_parquet(df: &DataFrame, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let file = File::create(path)?;
    let mut df = df.clone();
    ParquetWriter::new(file).finish(&mut df)?;
    debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Write a DataFrame as CSV with a header row, creating parent directories.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut file = File::create(path)?;
    let mut df = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)?;
    debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Write a value as pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Hidden sibling path an artifact is staged at before being committed.
fn staging_path(path: &Path) -> PathBuf {
    hidden_sibling(path, "staged")
}

/// Hidden sibling path the previous artifact is parked at during a commit.
fn backup_path(path: &Path) -> PathBuf {
    hidden_sibling(path, "previous")
}

fn hidden_sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}", file_name, suffix))
}

#[derive(Debug)]
struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

/// All-or-nothing writer for a set of output artifacts.
///
/// Each `stage_*` call writes to a hidden sibling of the destination.
/// [`commit`](Self::commit) renames all staged files into place. Dropping
/// the writer without committing removes whatever was staged, so a failed
/// run leaves no partial outputs behind.
#[derive(Debug, Default)]
pub struct StagedOutputs {
    files: Vec<StagedFile>,
}

impl StagedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_parquet(&mut self, df: &DataFrame, target: &Path) -> Result<()> {
        let staged = self.reserve(target);
        write_parquet(df, &staged).map_err(|e| persistence_error(target, &e))
    }

    pub fn stage_json<T: Serialize>(&mut self, value: &T, target: &Path) -> Result<()> {
        let staged = self.reserve(target);
        write_json(value, &staged).map_err(|e| persistence_error(target, &e))
    }

    /// Number of artifacts staged so far.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Rename every staged file to its destination.
    ///
    /// Existing destinations are parked at a hidden sibling first. If any
    /// rename fails, every destination of this commit is restored to what it
    /// held before, so the directory never mixes outputs of two runs.
    pub fn commit(mut self) -> Result<Vec<PathBuf>> {
        let files = std::mem::take(&mut self.files);
        let mut replaced: Vec<ReplacedTarget> = Vec::with_capacity(files.len());

        for (i, file) in files.iter().enumerate() {
            match replace_target(file) {
                Ok(target) => replaced.push(target),
                Err(e) => {
                    let error = persistence_error(&file.target, &EtlError::Io(e));
                    for target in replaced.iter().rev() {
                        target.restore();
                    }
                    for rest in &files[i..] {
                        remove_quietly(&rest.staged);
                    }
                    return Err(error);
                }
            }
        }

        let committed: Vec<PathBuf> = replaced
            .into_iter()
            .map(|target| {
                if let Some(backup) = &target.backup {
                    remove_quietly(backup);
                }
                target.target
            })
            .collect();

        info!("Committed {} artifacts", committed.len());
        Ok(committed)
    }

    fn reserve(&mut self, target: &Path) -> PathBuf {
        let staged = staging_path(target);
        self.files.push(StagedFile {
            staged: staged.clone(),
            target: target.to_path_buf(),
        });
        staged
    }
}

impl Drop for StagedOutputs {
    fn drop(&mut self) {
        if self.files.is_empty() {
            return;
        }
        warn!("Discarding {} staged artifacts", self.files.len());
        for file in self.files.drain(..) {
            remove_quietly(&file.staged);
        }
    }
}

/// A destination swapped in by a commit, with where its old content went.
struct ReplacedTarget {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl ReplacedTarget {
    fn restore(&self) {
        remove_quietly(&self.target);
        if let Some(backup) = &self.backup
            && let Err(e) = fs::rename(backup, &self.target)
        {
            warn!(
                "Failed to restore {} from {}: {}",
                self.target.display(),
                backup.display(),
                e
            );
        }
    }
}

fn replace_target(file: &StagedFile) -> std::io::Result<ReplacedTarget> {
    let backup = if file.target.exists() {
        let backup = backup_path(&file.target);
        fs::rename(&file.target, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(&file.staged, &file.target) {
        if let Some(backup) = &backup
            && let Err(restore_err) = fs::rename(backup, &file.target)
        {
            warn!(
                "Failed to restore {}: {}",
                file.target.display(),
                restore_err
            );
        }
        return Err(e);
    }

    Ok(ReplacedTarget {
        target: file.target.clone(),
        backup,
    })
}

fn remove_quietly(path: &Path) {
    if path.exists()
        && let Err(e) = fs::remove_file(path)
    {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

fn persistence_error(target: &Path, error: &EtlError) -> EtlError {
    EtlError::PersistenceFailed {
        artifact: target.display().to_string(),
        reason: error.to_string(),
    }
}
