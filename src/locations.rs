//! Static training-location table and the longest-substring location join

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::types::{is_available, CourseRecord, LocationRecord};

pub const LOCATIONS_FILE: &str = "mfri_locations.json";

/// Known locations in file order, unique by canonical name
#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    entries: Vec<LocationRecord>,
}

impl LocationTable {
    /// Build a table keeping the first record seen for each canonical name
    pub fn from_records(records: impl IntoIterator<Item = LocationRecord>) -> Self {
        let mut seen = HashSet::new();
        let entries = records
            .into_iter()
            .filter(|r| !r.location.is_empty())
            .filter(|r| seen.insert(r.location.clone()))
            .collect();
        Self { entries }
    }

    /// Load the table from disk; a missing or unreadable file yields an empty table
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!(
                "{} not found. Location details will not be added to courses.",
                path.display()
            );
            return Self::default();
        }

        match Self::read(path) {
            Ok(table) => {
                info!(
                    "Loaded {} unique locations from {}",
                    table.len(),
                    path.display()
                );
                table
            }
            Err(e) => {
                warn!(
                    "Failed to load {}: {:#}. Location details will not be added.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let records = raw.into_iter().filter_map(|value| {
            match serde_json::from_value::<LocationRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping location entry without a usable name: {}", e);
                    None
                }
            }
        });

        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationRecord> {
        self.entries.iter()
    }
}

/// Find the location whose canonical name is the longest substring of `location_text`.
///
/// Length is counted in characters. On equal length the first entry in table
/// order wins, since a later candidate must be strictly longer to replace it.
pub fn best_match<'a>(location_text: &str, table: &'a LocationTable) -> Option<&'a LocationRecord> {
    if !is_available(location_text) {
        return None;
    }

    let mut best: Option<(&LocationRecord, usize)> = None;
    for record in table.iter() {
        if !location_text.contains(record.location.as_str()) {
            continue;
        }
        let len = record.location.chars().count();
        if best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((record, len));
        }
    }
    best.map(|(record, _)| record)
}

/// Copy the best-matching location's metadata onto the course. Returns true on a match.
pub fn join_location(course: &mut CourseRecord, table: &LocationTable) -> bool {
    match best_match(&course.location, table) {
        Some(record) => {
            course.location_details = record.details();
            true
        }
        None => {
            if is_available(&course.location) {
                info!(
                    "Location '{}' for course '{}' not found in {} with substring match",
                    course.location,
                    course.id_or_placeholder(),
                    LOCATIONS_FILE
                );
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocationDetails;

    fn location(name: &str, display: &str) -> LocationRecord {
        LocationRecord {
            location: name.to_string(),
            display_name: Some(display.to_string()),
            location_latitude_longitude: Some("39.4, -76.6".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_longest_match_wins() {
        let table = LocationTable::from_records(vec![
            location("Baltimore", "City"),
            location("Baltimore County Fire Academy", "Academy"),
        ]);
        let found = best_match("Baltimore County Fire Academy, Room 2", &table).unwrap();
        assert_eq!(found.location, "Baltimore County Fire Academy");
    }

    #[test]
    fn test_equal_length_tie_keeps_first_seen() {
        let table = LocationTable::from_records(vec![
            location("Station 12", "First"),
            location("Station 21", "Second"),
        ]);
        let found = best_match("Joint class at Station 21 and Station 12", &table).unwrap();
        assert_eq!(found.display_name.as_deref(), Some("First"));
    }

    #[test]
    fn test_duplicate_names_keep_first_record() {
        let table = LocationTable::from_records(vec![
            location("Easton", "First"),
            location("Easton", "Second"),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(
            best_match("Easton", &table).unwrap().display_name.as_deref(),
            Some("First")
        );
    }

    #[test]
    fn test_sentinel_never_matches() {
        let table = LocationTable::from_records(vec![location("N/A", "Bogus")]);
        assert!(best_match("N/A", &table).is_none());
    }

    #[test]
    fn test_join_copies_metadata() {
        let table = LocationTable::from_records(vec![location("La Plata", "La Plata VFD")]);
        let mut course = CourseRecord::empty("https://example.org/");
        course.location = "La Plata Volunteer Fire Department".to_string();
        assert!(join_location(&mut course, &table));
        assert_eq!(
            course.location_details.location_display_name.as_deref(),
            Some("La Plata VFD")
        );

        let mut unmatched = CourseRecord::empty("https://example.org/");
        unmatched.location = "Somewhere Else".to_string();
        assert!(!join_location(&mut unmatched, &table));
        assert_eq!(unmatched.location, "Somewhere Else");
        assert_eq!(unmatched.location_details, LocationDetails::default());
    }

    #[test]
    fn test_load_missing_or_corrupt_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocationTable::load(&dir.path().join("missing.json")).is_empty());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(LocationTable::load(&corrupt).is_empty());
    }

    #[test]
    fn test_load_reads_numeric_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");
        fs::write(
            &path,
            r#"[{"location": "Easton", "id": 4, "displayName": "Easton VFD"}, {"id": 5}]"#,
        )
        .unwrap();
        let table = LocationTable::load(&path);
        assert_eq!(table.len(), 1);
        let record = table.iter().next().unwrap();
        assert_eq!(record.id, Some(Value::from(4)));
    }
}
