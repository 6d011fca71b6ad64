//! Append-only answer trace, one JSON object per line.
//!
//! The log is written alongside the `results` table but is never reconciled
//! with it: each line is a self-contained snapshot of the answer event.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rocket::tokio;
use rocket::tokio::io::{AsyncBufReadExt, BufReader};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::auth::{AccessContext, Permission};
use crate::db::users::visible_usernames;
use crate::error::AppError;
use crate::quiz::{genre_tags, is_correct_verdict};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActivityLogEntry {
    pub date: NaiveDate,
    pub name: String,
    pub genre: String,
    pub question_id: i64,
    pub question_title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(rename = "elapsed_time")]
    pub elapsed_seconds: f64,
    pub user_choice: Vec<String>,
    pub correct_answers: Vec<String>,
    pub result: String,
    #[serde(rename = "kaisetsu", default)]
    pub explanation: String,
}

/// Per-genre tally for one user.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GenreTally {
    pub correct: u32,
    pub total: u32,
    /// Questions answered incorrectly at least once, in first-seen order.
    pub errors: Vec<i64>,
}

/// username -> genre tag -> tally
pub type ActivitySummary = BTreeMap<String, BTreeMap<String, GenreTally>>;

#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `entry` as a single line with one `write_all` on an
    /// `O_APPEND` handle, so concurrent writers never interleave.
    #[instrument(skip(self, entry), fields(question_id = entry.question_id))]
    pub async fn append(&self, entry: &ActivityLogEntry) -> Result<(), AppError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(line.as_bytes())
        })
        .await
        .map_err(|err| AppError::Internal(format!("Activity log writer panicked: {}", err)))?
        .map_err(|err| {
            AppError::Internal(format!(
                "Failed to append to {}: {}",
                self.path.display(),
                err
            ))
        })
    }

    /// Reads every well-formed entry, one line at a time. A missing file is
    /// an empty log.
    #[instrument(skip(self))]
    pub async fn read_all(&self) -> Result<Vec<ActivityLogEntry>, AppError> {
        let file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.read_error(err)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut entries = Vec::new();
        let mut number = 0;
        while let Some(line) = lines.next_line().await.map_err(|err| self.read_error(err))? {
            number += 1;
            if let Some(entry) = parse_line(number, &line) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn read_error(&self, err: std::io::Error) -> AppError {
        AppError::Internal(format!("Failed to read {}: {}", self.path.display(), err))
    }
}

fn parse_line(number: usize, line: &str) -> Option<ActivityLogEntry> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<ActivityLogEntry>(line) {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!(line = number, error = %err, "Skipping malformed activity log line");
            None
        }
    }
}

pub fn summarize(entries: &[ActivityLogEntry]) -> ActivitySummary {
    let mut summary = ActivitySummary::new();

    for entry in entries {
        let correct = is_correct_verdict(&entry.result);
        let per_user = summary.entry(entry.name.clone()).or_default();

        for tag in genre_tags(&entry.genre) {
            let tally = per_user.entry(tag).or_default();
            tally.total += 1;
            if correct {
                tally.correct += 1;
            } else if !tally.errors.contains(&entry.question_id) {
                tally.errors.push(entry.question_id);
            }
        }
    }

    summary
}

/// Log entries whose `name` falls inside the caller's scope.
#[instrument(skip(pool, log))]
pub async fn activity_logs(
    pool: &SqlitePool,
    log: &ActivityLog,
    ctx: &AccessContext,
) -> Result<Vec<ActivityLogEntry>, AppError> {
    ctx.require_permission(Permission::ViewOwnResults)?;
    info!("Reading activity log");

    let entries = log.read_all().await?;

    if !ctx.has_permission(Permission::ViewTenantActivity) {
        return Ok(entries
            .into_iter()
            .filter(|entry| entry.name == ctx.username)
            .collect());
    }

    match visible_usernames(pool, ctx).await? {
        None => Ok(entries),
        Some(usernames) => Ok(entries
            .into_iter()
            .filter(|entry| usernames.contains(&entry.name))
            .collect()),
    }
}

#[instrument(skip(pool, log))]
pub async fn activity_summary(
    pool: &SqlitePool,
    log: &ActivityLog,
    ctx: &AccessContext,
) -> Result<ActivitySummary, AppError> {
    let entries = activity_logs(pool, log, ctx).await?;
    Ok(summarize(&entries))
}
