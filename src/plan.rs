//! # plan: the persisted upload plan
//!
//! The plan is a CSV table with one row per file to upload. Required columns are
//! `file_output` (the row's identity key) and `description` (the caption). The
//! `sent` column is added on load when missing, and an optional `file_path`
//! column points at the file to actually read when it differs from `file_output`.
//! Any other column is kept untouched.
//!
//! Every mutation rewrites the whole table through a temporary file renamed over
//! the original, so a crash leaves either the old or the new table on disk.
//! One process owns the plan at a time; there is no locking.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const FILE_OUTPUT_COLUMN: &str = "file_output";
pub const DESCRIPTION_COLUMN: &str = "description";
pub const SENT_COLUMN: &str = "sent";
pub const FILE_PATH_COLUMN: &str = "file_path";

/// Default file name of a plan inside its project folder.
pub const PLAN_FILE_NAME: &str = "upload_plan.csv";

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("cannot access plan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt plan {path}: {reason}")]
    CorruptPlan { path: PathBuf, reason: String },
    #[error("expected exactly one row for {output_path}, found {matches}")]
    AmbiguousKey { output_path: PathBuf, matches: usize },
}

/// One row of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// File read when sending. May no longer exist on disk.
    pub source_path: PathBuf,
    /// Stable identity of the row.
    pub output_path: PathBuf,
    pub caption: String,
    pub sent: bool,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    file_output: usize,
    description: usize,
    sent: usize,
    file_path: Option<usize>,
}

/// The ordered rows of a plan, bound to the file they persist to.
#[derive(Debug, Clone)]
pub struct WorkPlan {
    path: PathBuf,
    headers: StringRecord,
    rows: Vec<StringRecord>,
    columns: Columns,
}

impl WorkPlan {
    /// Build a fresh plan for `paths`: caption is the file name, nothing sent.
    ///
    /// The plan is not written until [`WorkPlan::save`].
    pub fn create<I, P>(path: impl Into<PathBuf>, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let headers = StringRecord::from(vec![FILE_OUTPUT_COLUMN, DESCRIPTION_COLUMN, SENT_COLUMN]);
        let rows: Vec<StringRecord> = paths
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                let caption = p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                StringRecord::from(vec![p.to_string_lossy().into_owned(), caption, "0".to_string()])
            })
            .collect();
        let path = path.into();
        info!(plan = %path.display(), rows = rows.len(), "Created upload plan");
        Self {
            path,
            headers,
            rows,
            columns: Columns {
                file_output: 0,
                description: 1,
                sent: 2,
                file_path: None,
            },
        }
    }

    /// Read a plan from disk.
    ///
    /// A plan without a `sent` column gets one with every row unsent, and the
    /// migrated table is written back before returning.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PlanError> {
        let path = path.into();
        let content = fs::read(&path).map_err(|source| {
            error!(plan = %path.display(), error = %source, "Failed to read plan");
            PlanError::Io {
                path: path.clone(),
                source,
            }
        })?;

        let corrupt = |reason: String| {
            error!(plan = %path.display(), %reason, "Plan cannot be parsed");
            PlanError::CorruptPlan {
                path: path.clone(),
                reason,
            }
        };

        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(content.as_slice());
        let mut headers = reader.headers().map_err(|e| corrupt(e.to_string()))?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record.map_err(|e| corrupt(e.to_string()))?);
        }

        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let file_output = find(FILE_OUTPUT_COLUMN)
            .ok_or_else(|| corrupt(format!("missing column '{FILE_OUTPUT_COLUMN}'")))?;
        let description = find(DESCRIPTION_COLUMN)
            .ok_or_else(|| corrupt(format!("missing column '{DESCRIPTION_COLUMN}'")))?;
        let file_path = find(FILE_PATH_COLUMN);

        let (sent, migrated) = match find(SENT_COLUMN) {
            Some(idx) => (idx, false),
            None => {
                headers.push_field(SENT_COLUMN);
                for row in &mut rows {
                    row.push_field("0");
                }
                (headers.len() - 1, true)
            }
        };

        for (idx, row) in rows.iter().enumerate() {
            parse_sent(row.get(sent).unwrap_or(""))
                .map_err(|cell| corrupt(format!("row {idx}: invalid sent value '{cell}'")))?;
        }

        let plan = Self {
            path,
            headers,
            rows,
            columns: Columns {
                file_output,
                description,
                sent,
                file_path,
            },
        };

        if migrated {
            warn!(plan = %plan.path.display(), "Plan had no 'sent' column, adding it");
            plan.save()?;
        }
        info!(
            plan = %plan.path.display(),
            rows = plan.len(),
            pending = plan.pending_count(),
            "Loaded upload plan"
        );
        Ok(plan)
    }

    /// Persist the whole table, replacing the file atomically.
    pub fn save(&self) -> Result<(), PlanError> {
        let io_err = |source: io::Error| PlanError::Io {
            path: self.path.clone(),
            source,
        };
        let tmp = NamedTempFile::new_in(self.project_dir()).map_err(io_err)?;
        {
            let mut writer = WriterBuilder::new().from_writer(tmp.as_file());
            writer
                .write_record(&self.headers)
                .map_err(|e| io_err(e.into()))?;
            for row in &self.rows {
                writer.write_record(row).map_err(|e| io_err(e.into()))?;
            }
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        debug!(plan = %self.path.display(), rows = self.rows.len(), "Saved upload plan");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Folder holding the plan, its channel metadata and its send logs.
    pub fn project_dir(&self) -> PathBuf {
        project_dir_of(&self.path)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sent_count(&self) -> usize {
        self.rows.iter().filter(|r| self.is_sent(r)).count()
    }

    pub fn pending_count(&self) -> usize {
        self.len() - self.sent_count()
    }

    /// Row at `index`, in stored order.
    pub fn item(&self, index: usize) -> Option<WorkItem> {
        self.rows.get(index).map(|r| self.to_item(r))
    }

    pub fn items(&self) -> impl Iterator<Item = WorkItem> + '_ {
        self.rows.iter().map(|r| self.to_item(r))
    }

    /// First unsent row, with its index. `None` once everything is sent.
    pub fn next_unsent(&self) -> Option<(usize, WorkItem)> {
        self.next_unsent_from(0)
    }

    /// First unsent row at or after `start`.
    pub fn next_unsent_from(&self, start: usize) -> Option<(usize, WorkItem)> {
        self.rows
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, r)| !self.is_sent(r))
            .map(|(idx, r)| (idx, self.to_item(r)))
    }

    /// Flag the row keyed by `output_path` as sent and persist the table.
    ///
    /// Zero or several matching rows mean the plan is corrupt; nothing is changed
    /// and [`PlanError::AmbiguousKey`] is returned.
    pub fn mark_sent(&mut self, output_path: &Path) -> Result<(), PlanError> {
        let key = output_path.to_string_lossy();
        let matches: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.get(self.columns.file_output) == Some(key.as_ref()))
            .map(|(idx, _)| idx)
            .collect();

        if matches.len() != 1 {
            error!(
                output_path = %output_path.display(),
                matches = matches.len(),
                "Cannot mark row as sent"
            );
            return Err(PlanError::AmbiguousKey {
                output_path: output_path.to_path_buf(),
                matches: matches.len(),
            });
        }

        let idx = matches[0];
        let sent_col = self.columns.sent;
        let updated: StringRecord = self.rows[idx]
            .iter()
            .enumerate()
            .map(|(col, field)| if col == sent_col { "1" } else { field })
            .collect();
        self.rows[idx] = updated;
        debug!(row = idx, output_path = %output_path.display(), "Marked row as sent");
        self.save()
    }

    fn is_sent(&self, row: &StringRecord) -> bool {
        parse_sent(row.get(self.columns.sent).unwrap_or("")).unwrap_or(false)
    }

    fn to_item(&self, row: &StringRecord) -> WorkItem {
        let output_path = PathBuf::from(row.get(self.columns.file_output).unwrap_or(""));
        let source_path = self
            .columns
            .file_path
            .and_then(|idx| row.get(idx))
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| output_path.clone());
        WorkItem {
            source_path,
            output_path,
            caption: row.get(self.columns.description).unwrap_or("").to_string(),
            sent: self.is_sent(row),
        }
    }
}

fn parse_sent(cell: &str) -> Result<bool, String> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "0.0" | "false" => Ok(false),
        "1" | "1.0" | "true" => Ok(true),
        other => Err(other.to_string()),
    }
}

/// Folder a plan at `plan_path` keeps its side files in.
pub fn project_dir_of(plan_path: &Path) -> PathBuf {
    match plan_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
