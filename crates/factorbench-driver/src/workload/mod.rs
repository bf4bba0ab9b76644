//! Workload source: the base sequence of numbers every worker permutes.
//!
//! The source is a plain text file with one base-10 signed integer per line.
//! Validation is advisory: a line that does not parse is logged and skipped,
//! and only a failure to open or read the source itself is an error. An empty
//! result is returned as-is; whether that aborts a run is the coordinator's
//! call.

pub mod generate;

use crate::error::WorkloadError;
use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
};

/// Immutable, cheaply cloneable sequence of input numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSet {
    numbers: Arc<[i64]>,
}

impl WorkloadSet {
    pub fn as_slice(&self) -> &[i64] {
        &self.numbers
    }
}

impl Deref for WorkloadSet {
    type Target = [i64];

    fn deref(&self) -> &Self::Target {
        &self.numbers
    }
}

impl From<Vec<i64>> for WorkloadSet {
    fn from(numbers: Vec<i64>) -> Self {
        Self {
            numbers: numbers.into(),
        }
    }
}

/// Loads the workload stored at `path`.
///
/// # Errors
///
/// Returns [`WorkloadError::Open`] if the file cannot be opened and
/// [`WorkloadError::Read`] if reading fails part-way through.
pub async fn load(path: impl AsRef<Path>) -> Result<WorkloadSet, WorkloadError> {
    let path = path.as_ref();
    let file = File::open(path)
        .await
        .map_err(|source| WorkloadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    from_reader(BufReader::new(file), path).await
}

/// Parses a workload from any buffered reader. `origin` names the source in
/// logs and errors.
///
/// # Errors
///
/// Returns [`WorkloadError::Read`] if the reader fails, including on invalid
/// UTF-8.
pub async fn from_reader<R>(reader: R, origin: &Path) -> Result<WorkloadSet, WorkloadError>
where
    R: AsyncBufRead + Unpin,
{
    let read_error = |source| WorkloadError::Read {
        path: PathBuf::from(origin),
        source,
    };

    let mut lines = reader.lines();
    let mut numbers = Vec::new();
    let mut line_number = 0_usize;
    let mut skipped = 0_usize;

    while let Some(line) = lines.next_line().await.map_err(read_error)? {
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<i64>() {
            Ok(number) => numbers.push(number),
            Err(_) => {
                skipped += 1;
                tracing::warn!(
                    line = line_number,
                    "Invalid number in {}: {trimmed:?}",
                    origin.display()
                );
            }
        }
    }

    tracing::info!(
        count = numbers.len(),
        skipped,
        "Loaded workload from {}",
        origin.display()
    );
    Ok(WorkloadSet::from(numbers))
}
