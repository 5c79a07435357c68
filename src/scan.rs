//! Brute-force scan of candidate course pages into the all-time dataset

use std::ops::Range;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, Local};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::dataset::{CourseRepository, FlushPolicy, UpsertOutcome};
use crate::extract::extract_course;
use crate::locations::LocationTable;
use crate::net::{HttpClient, RetryPolicy};
use crate::probe::{candidate_url, probe};
use crate::utils::{osc8_file_link, osc8_link};
use crate::{ALL_COURSES_FILE, BASE_URL, LOCATIONS_FILE, SCAN_USER_AGENT};

const S_CODE_RANGE: Range<u32> = 0..1000;
const REQUEST_DELAY: Duration = Duration::from_millis(500);
const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub base_url: String,
    /// Numeric part of the course code, formatted as `S000`..`S999`
    pub s_range: Range<u32>,
    pub years: Vec<i32>,
    /// Pause between consecutive requests
    pub delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let year = Local::now().year();
        Self {
            base_url: BASE_URL.to_string(),
            s_range: S_CODE_RANGE,
            years: vec![year - 1, year, year + 1],
            delay: REQUEST_DELAY,
        }
    }
}

impl ScanConfig {
    /// Every candidate URL in scan order: course codes outer, years inner
    pub fn candidates(&self) -> Vec<String> {
        self.s_range
            .clone()
            .flat_map(|n| {
                let code = s_code(n);
                self.years
                    .iter()
                    .map(move |&year| candidate_url(&self.base_url, &code, year))
            })
            .collect()
    }
}

pub fn s_code(n: u32) -> String {
    format!("S{:03}", n)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub probed: usize,
    pub active: usize,
    pub added: usize,
    pub updated: usize,
    pub rejected: usize,
}

/// Probe every candidate, extracting and storing each active page
pub fn scan(
    config: &ScanConfig,
    client: &HttpClient,
    locations: &LocationTable,
    repository: &mut CourseRepository,
) -> Result<ScanStats> {
    let candidates = config.candidates();
    let pb = ProgressBar::new(candidates.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg} (eta {eta})")?
            .progress_chars("=> "),
    );

    let mut stats = ScanStats::default();
    for (i, url) in candidates.iter().enumerate() {
        if i > 0 {
            thread::sleep(config.delay);
        }
        pb.set_message(url.clone());
        stats.probed += 1;

        if let Some(page) = probe(client, url) {
            stats.active += 1;
            pb.println(format!("Active: {}", osc8_link(&page.final_url, &page.final_url)));

            match extract_course(&page.body, &page.final_url, locations) {
                // A failed write keeps the record in memory for the final flush
                Ok(record) => match repository.upsert(record) {
                    Ok(UpsertOutcome::Added) => stats.added += 1,
                    Ok(UpsertOutcome::Updated) => stats.updated += 1,
                    Err(e) => warn!("{:#}", e),
                },
                Err(e) => {
                    warn!("{}", e);
                    stats.rejected += 1;
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(stats)
}

pub fn run_scan() -> Result<()> {
    let config = ScanConfig::default();
    let locations = LocationTable::load(Path::new(LOCATIONS_FILE));
    let client = HttpClient::new(SCAN_USER_AGENT, PROBE_TIMEOUT, RetryPolicy::default())?;
    let mut repository = CourseRepository::load(ALL_COURSES_FILE, FlushPolicy::EveryUpsert);
    info!(
        "Scanning S{:03}..S{:03} for years {:?} ({} existing courses)",
        config.s_range.start,
        config.s_range.end.saturating_sub(1),
        config.years,
        repository.len()
    );

    let stats = scan(&config, &client, &locations, &mut repository)?;
    repository.flush()?;

    info!(
        "Probed {} candidates: {} active, {} added, {} updated, {} rejected",
        stats.probed, stats.active, stats.added, stats.updated, stats.rejected
    );
    println!(
        "{} courses saved to {}",
        repository.len(),
        osc8_file_link(ALL_COURSES_FILE, ALL_COURSES_FILE)
    );
    Ok(())
}
