//! All-time course dataset persisted as one sorted JSON array

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::types::CourseRecord;

/// When the repository writes itself back to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Rewrite the file after every upsert so an interrupted scan loses nothing
    EveryUpsert,
    /// Only write on an explicit `flush`
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
}

/// In-memory course dataset keyed by course identifier
pub struct CourseRepository {
    path: PathBuf,
    policy: FlushPolicy,
    courses: HashMap<String, CourseRecord>,
}

impl CourseRepository {
    /// Load the dataset at `path`. A missing or corrupt file starts an empty dataset.
    pub fn load(path: impl Into<PathBuf>, policy: FlushPolicy) -> Self {
        let path = path.into();
        let courses = match read_courses(&path) {
            Ok(records) => records
                .into_iter()
                .filter_map(|record| {
                    let id = record.course_id.clone()?;
                    Some((id, record))
                })
                .collect(),
            Err(e) => {
                if path.exists() {
                    warn!("Starting with an empty dataset: {:#}", e);
                }
                HashMap::new()
            }
        };

        Self {
            path,
            policy,
            courses,
        }
    }

    /// Insert or overwrite a record by course identifier
    pub fn upsert(&mut self, record: CourseRecord) -> Result<UpsertOutcome> {
        let Some(id) = record.course_id.clone() else {
            bail!("Refusing to store a course without a course identifier");
        };

        let outcome = match self.courses.insert(id, record) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Added,
        };

        if self.policy == FlushPolicy::EveryUpsert {
            self.flush()?;
        }
        Ok(outcome)
    }

    /// Rewrite the whole dataset to disk, sorted by course identifier
    pub fn flush(&self) -> Result<()> {
        write_courses(&self.path, &self.records())
    }

    /// All records sorted by course identifier
    pub fn records(&self) -> Vec<CourseRecord> {
        let mut records: Vec<CourseRecord> = self.courses.values().cloned().collect();
        sort_courses(&mut records);
        records
    }

    pub fn get(&self, course_id: &str) -> Option<&CourseRecord> {
        self.courses.get(course_id)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

/// Stable sort by course identifier; records without one go last
pub fn sort_courses(records: &mut [CourseRecord]) {
    records.sort_by(|a, b| {
        a.course_id
            .is_none()
            .cmp(&b.course_id.is_none())
            .then_with(|| a.course_id.cmp(&b.course_id))
    });
}

/// Read a JSON array of course records
pub fn read_courses(path: &Path) -> Result<Vec<CourseRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write course records as a four-space indented JSON array with a trailing newline
pub fn write_courses(path: &Path, records: &[CourseRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut serializer)?;
    buf.push(b'\n');

    fs::write(path, buf).with_context(|| format!("Failed to write {}", path.display()))
}
