//! Field extraction for individual course detail pages
//!
//! Most fields live in a `<p class="intro">` that follows a labeled `<h4>`/`<h5>`
//! heading ("Date:", "Registration:", ...). Each field is described by a
//! `FieldRule`: the heading it hangs off, a regex with one capture group run
//! over the section text, and a normalizer for the captured value.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Node, Selector};

use crate::error::ExtractError;
use crate::locations::{join_location, LocationTable};
use crate::types::{is_available, CourseRecord, NOT_AVAILABLE};
use crate::utils::{collapse_whitespace, format_date_mdy, join_text_parts};

/// Only Firefighter I offerings are kept
pub const COURSE_PREFIX: &str = "FIRE-101";

const WEEKDAY_ABBREVIATIONS: &[&str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

static HEADING_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h4, h5").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h4.red.bold.uppercase").unwrap());
static INTRO_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p.intro").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static H5_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h5").unwrap());
static COORD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h5.mt-2.body-color").unwrap());
static OFFICE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a.intro-item[href*="/office/"]"#).unwrap());
static MAILTO_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a.intro-item[href^="mailto:"]"#).unwrap());

static LOG_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Log Number:\s*([A-Z0-9\-S]+)").unwrap());
static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Instructional Hours:\s*([\d.]+)").unwrap());
static REGISTER_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*Register\s*$").unwrap());
static TRAILING_TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+\d{1,2}:\d{2}.*$").unwrap());
static COORD_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Coordinated by:\s*(.*?)(?:\s*\.\s*If you have any questions|\s*If you have any questions|$)")
        .unwrap()
});
static OFFICE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^the\s+MFRI\s+").unwrap());
static OFFICE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:Office|Regional\s+Training\s+Center)$").unwrap());

/// Fields recovered from heading-anchored sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    StartDate,
    EndDate,
    SessionStartTime,
    SessionEndTime,
    Days,
    ScheduleRange,
    ScheduleTime,
    RegistrationOpens,
    RegistrationCloses,
    Location,
}

/// Heading label → capture regex → normalizer
pub struct FieldRule {
    pub field: Field,
    pub heading: &'static str,
    pub pattern: &'static str,
    pub normalize: fn(&str) -> String,
}

pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: Field::StartDate,
        heading: "Date:",
        pattern: r"(?i)Start:\s*([A-Za-z]+\s+\d{1,2},\s+\d{4})",
        normalize: format_date_mdy,
    },
    FieldRule {
        field: Field::EndDate,
        heading: "Date:",
        pattern: r"(?i)End:\s*([A-Za-z]+\s+\d{1,2},\s+\d{4})",
        normalize: format_date_mdy,
    },
    FieldRule {
        field: Field::SessionStartTime,
        heading: "Date:",
        pattern: r"(?i)First Session Start Time:\s*(\d{1,2}:\d{2})",
        normalize: trimmed,
    },
    FieldRule {
        field: Field::SessionEndTime,
        heading: "Date:",
        pattern: r"(?i)End Time:\s*(\d{1,2}:\d{2})",
        normalize: trimmed,
    },
    FieldRule {
        field: Field::Days,
        heading: "Days and Times:",
        pattern: r"^(.+)$",
        normalize: days_from_section,
    },
    FieldRule {
        field: Field::ScheduleRange,
        heading: "Days and Times:",
        pattern: r"(\d{1,2}:\d{2}\s*(?:-|to)\s*\d{1,2}:\d{2})",
        normalize: trimmed,
    },
    FieldRule {
        field: Field::ScheduleTime,
        heading: "Days and Times:",
        pattern: r"(\d{1,2}:\d{2})",
        normalize: trimmed,
    },
    FieldRule {
        field: Field::RegistrationOpens,
        heading: "Registration:",
        pattern: r"(?i)Registration Opens:\s*([A-Za-z]+\s+\d{1,2},\s+\d{4}|\d{2}-\d{2}-\d{4})",
        normalize: format_date_mdy,
    },
    FieldRule {
        field: Field::RegistrationCloses,
        heading: "Registration:",
        pattern: r"(?i)Registration Closes:\s*([A-Za-z]+\s+\d{1,2},\s+\d{4}|\d{2}-\d{2}-\d{4})",
        normalize: format_date_mdy,
    },
    FieldRule {
        field: Field::Location,
        heading: "Location:",
        pattern: r"^(.+)$",
        normalize: trimmed,
    },
];

struct CompiledRule {
    rule: &'static FieldRule,
    regex: Regex,
}

static COMPILED_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    FIELD_RULES
        .iter()
        .map(|rule| CompiledRule {
            rule,
            regex: Regex::new(rule.pattern).unwrap(),
        })
        .collect()
});

impl CompiledRule {
    /// Run the rule over a section's text. `None` if the pattern misses or normalizes to nothing.
    fn apply(&self, section: &str) -> Option<String> {
        let captured = self.regex.captures(section)?.get(1)?.as_str();
        let value = (self.rule.normalize)(captured);
        is_available(&value).then_some(value)
    }
}

fn trimmed(s: &str) -> String {
    s.trim().to_string()
}

/// Meeting days from a "Days and Times:" section, e.g. "Mondays, Wednesdays 18:30-22:30"
fn days_from_section(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let days = TRAILING_TIME_RE.replace(first_line, "").trim().to_string();
    let lower = days.to_lowercase();
    if WEEKDAY_ABBREVIATIONS.iter().any(|d| lower.contains(d)) {
        days
    } else {
        NOT_AVAILABLE.to_string()
    }
}

/// Strip "the MFRI" and a trailing "Office"/"Regional Training Center" from an office name
pub fn clean_office_name(name: &str) -> String {
    let name = OFFICE_PREFIX_RE.replace(name.trim(), "");
    OFFICE_SUFFIX_RE.replace(&name, "").trim().to_string()
}

fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// All text in an element, each text node trimmed, joined by `separator`
pub(crate) fn joined_text(element: &ElementRef, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Section text with `<br>` treated as a line break, whitespace collapsed onto one line
fn section_text(element: &ElementRef) -> String {
    let parts: Vec<String> = element
        .children()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(text.trim().to_string()),
            Node::Element(e) if e.name() == "br" => Some("\n".to_string()),
            Node::Element(_) => ElementRef::wrap(node).map(|el| el.text().map(str::trim).collect::<String>()),
            _ => None,
        })
        .collect();
    join_text_parts(&parts)
}

/// Text of the `p.intro` that follows the heading labeled `label`
pub fn text_after_heading(doc: &Html, label: &str) -> Option<String> {
    let heading = doc
        .select(&HEADING_SEL)
        .find(|h| h.text().collect::<String>().trim().eq_ignore_ascii_case(label))?;

    heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "p" && has_class(e, "intro"))
        .map(|p| section_text(&p))
}

/// Evaluate every rule against the page; fields whose heading or pattern is missing are absent
pub fn evaluate_rules(doc: &Html) -> HashMap<Field, String> {
    let mut sections: HashMap<&'static str, Option<String>> = HashMap::new();
    let mut values = HashMap::new();

    for compiled in COMPILED_RULES.iter() {
        let heading = compiled.rule.heading;
        let section = sections
            .entry(heading)
            .or_insert_with(|| text_after_heading(doc, heading));
        if let Some(value) = section.as_deref().and_then(|text| compiled.apply(text)) {
            values.insert(compiled.rule.field, value);
        }
    }

    values
}

/// Combine session times into "HH:MM - HH:MM", falling back to a schedule range, then a lone schedule time
fn first_class_time(values: &HashMap<Field, String>) -> String {
    match (
        values.get(&Field::SessionStartTime),
        values.get(&Field::SessionEndTime),
    ) {
        (Some(start), Some(end)) => format!("{} - {}", start, end),
        (Some(start), None) => start.clone(),
        _ => values
            .get(&Field::ScheduleRange)
            .or_else(|| values.get(&Field::ScheduleTime))
            .cloned()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    }
}

/// The paragraph holding "Log Number:", lines separated by newlines
fn log_number_text(doc: &Html) -> Option<String> {
    let after_title = doc.select(&TITLE_SEL).next().and_then(|title| {
        title
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "p" && has_class(e, "intro"))
    });

    after_title
        .filter(|p| p.text().collect::<String>().contains("Log Number:"))
        .or_else(|| {
            doc.select(&INTRO_SEL)
                .find(|p| p.text().collect::<String>().contains("Log Number:"))
        })
        .map(|p| joined_text(&p, "\n"))
}

/// Resolve `href` against the page URL, keeping it as-is if either fails to parse
pub fn absolute_url(page_url: &str, href: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}

fn register_link(doc: &Html, page_url: &str) -> Option<String> {
    let href = doc
        .select(&LINK_SEL)
        .find(|a| REGISTER_TEXT_RE.is_match(&a.text().collect::<String>()))
        .or_else(|| {
            doc.select(&H5_SEL)
                .find(|h5| joined_text(h5, "").contains("Register"))
                .and_then(|h5| h5.select(&LINK_SEL).next())
        })?
        .value()
        .attr("href")?;
    Some(absolute_url(page_url, href))
}

/// Coordinating office and contact e-mail from the "Coordinated by:" heading
fn coordinator_and_contact(doc: &Html) -> (Option<String>, Option<String>) {
    let Some(h5) = doc
        .select(&COORD_SEL)
        .find(|h| h.text().collect::<String>().to_lowercase().contains("coordinated by:"))
    else {
        return (None, None);
    };

    let coordinator = match h5.select(&OFFICE_LINK_SEL).next() {
        Some(a) => Some(clean_office_name(&joined_text(&a, ""))),
        None => COORD_TEXT_RE
            .captures(&joined_text(&h5, " "))
            .and_then(|caps| caps.get(1))
            .map(|m| clean_office_name(m.as_str())),
    };

    let contact = h5.select(&MAILTO_LINK_SEL).next().map(|a| {
        match a.value().attr("href") {
            Some(href) => href.trim_start_matches("mailto:").trim().to_string(),
            None => joined_text(&a, ""),
        }
    });

    (
        coordinator.filter(|s| !s.is_empty()),
        contact.filter(|s| !s.is_empty()),
    )
}

/// Extract a course record from a detail page and join its location.
///
/// Fails only when the Log Number is missing or names another course.
pub fn extract_course(html: &str, page_url: &str, locations: &LocationTable) -> Result<CourseRecord, ExtractError> {
    let doc = Html::parse_document(html);
    let mut record = CourseRecord::empty(page_url);

    let log_text = log_number_text(&doc);
    let course_id = log_text
        .as_deref()
        .and_then(|text| LOG_NUMBER_RE.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| ExtractError::MissingCourseId {
            url: page_url.to_string(),
        })?;

    if !course_id.starts_with(COURSE_PREFIX) {
        return Err(ExtractError::UnexpectedCourse {
            course_id,
            url: page_url.to_string(),
        });
    }

    if let Some(hours) = log_text
        .as_deref()
        .and_then(|text| HOURS_RE.captures(text))
        .and_then(|caps| caps.get(1))
    {
        record.instructional_hours = hours.as_str().trim().to_string();
    }
    record.course_id = Some(course_id);

    if let Some(link) = register_link(&doc, page_url) {
        record.register_link = link;
    }

    let mut values = evaluate_rules(&doc);
    record.first_class_time = first_class_time(&values);
    let mut take = |field: Field| values.remove(&field).unwrap_or_else(|| NOT_AVAILABLE.to_string());
    record.start_date = take(Field::StartDate);
    record.end_date = take(Field::EndDate);
    record.days = take(Field::Days);
    record.registration_opens = take(Field::RegistrationOpens);
    record.registration_closes = take(Field::RegistrationCloses);
    record.location = take(Field::Location);

    if !is_available(&record.location) {
        if let Some(p) = doc
            .select(&INTRO_SEL)
            .find(|p| p.text().collect::<String>().to_lowercase().contains("location:"))
        {
            let text = collapse_whitespace(&joined_text(&p, " ").replace("Location:", ""));
            if !text.is_empty() {
                record.location = text;
            }
        }
    }

    let (coordinator, contact) = coordinator_and_contact(&doc);
    if let Some(coordinator) = coordinator {
        record.coordinate_by = coordinator;
    }
    if let Some(contact) = contact {
        record.contact = contact;
    }

    join_location(&mut record, locations);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocationRecord;

    const PAGE_URL: &str = "https://www.mfri.org/course/msfs/FIRE/101/S001/2025/";

    const DETAIL_PAGE: &str = r#"<!DOCTYPE html>
<html><body><div class="container">
  <h4 class="red bold uppercase">Firefighter I</h4>
  <p class="intro">Log Number: FIRE-101-S001-2025<br>Instructional Hours: 131</p>
  <h5><a class="btn" href="/register/FIRE-101-S001-2025/">Register</a></h5>
  <h4>Date:</h4>
  <p class="intro">Start: March 3, 2025<br>End: March 10, 2025<br>
     First Session Start Time: 18:30 End Time: 22:30</p>
  <h4>Days and Times:</h4>
  <p class="intro">Mondays, Wednesdays&nbsp;18:30-22:30</p>
  <h4>Registration:</h4>
  <p class="intro">Registration Opens: January 2, 2025<br>Registration Closes: February 20, 2025</p>
  <h4>Location:</h4>
  <p class="intro">Baltimore County Fire Academy<br>7 Soper Ave, Baltimore</p>
  <h5 class="mt-2 body-color">Coordinated by:
    <a class="intro-item" href="/office/central/">the MFRI Central Maryland Regional Training Center</a>.
    If you have any questions contact
    <a class="intro-item" href="mailto:central@mfri.org">Central Office</a></h5>
</div></body></html>"#;

    fn table() -> LocationTable {
        LocationTable::from_records(vec![
            LocationRecord {
                location: "Baltimore".to_string(),
                display_name: Some("Baltimore City".to_string()),
                ..Default::default()
            },
            LocationRecord {
                location: "Baltimore County Fire Academy".to_string(),
                display_name: Some("Baltimore County Public Safety Training Academy".to_string()),
                location_latitude_longitude: Some("39.38, -76.66".to_string()),
                id: Some(serde_json::Value::from(3)),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn test_extract_detail_page() {
        let record = extract_course(DETAIL_PAGE, PAGE_URL, &table()).unwrap();
        assert_eq!(record.course_id.as_deref(), Some("FIRE-101-S001-2025"));
        assert_eq!(record.course_url, PAGE_URL);
        assert_eq!(record.instructional_hours, "131");
        assert_eq!(record.register_link, "https://www.mfri.org/register/FIRE-101-S001-2025/");
        assert_eq!(record.start_date, "03-03-2025");
        assert_eq!(record.end_date, "03-10-2025");
        assert_eq!(record.first_class_time, "18:30 - 22:30");
        assert_eq!(record.days, "Mondays, Wednesdays");
        assert_eq!(record.registration_opens, "01-02-2025");
        assert_eq!(record.registration_closes, "02-20-2025");
        assert_eq!(record.location, "Baltimore County Fire Academy 7 Soper Ave, Baltimore");
        assert_eq!(record.coordinate_by, "Central Maryland");
        assert_eq!(record.contact, "central@mfri.org");
    }

    #[test]
    fn test_location_metadata_from_longest_match() {
        let record = extract_course(DETAIL_PAGE, PAGE_URL, &table()).unwrap();
        let details = &record.location_details;
        assert_eq!(
            details.location_display_name.as_deref(),
            Some("Baltimore County Public Safety Training Academy")
        );
        assert_eq!(details.location_latitude_longitude.as_deref(), Some("39.38, -76.66"));
        assert_eq!(details.location_region_id, Some(serde_json::Value::from(3)));
    }

    #[test]
    fn test_missing_log_number_is_rejected() {
        let html = "<html><body><h4>Date:</h4><p class=\"intro\">Start: March 3, 2025</p></body></html>";
        assert_eq!(
            extract_course(html, PAGE_URL, &table()),
            Err(ExtractError::MissingCourseId {
                url: PAGE_URL.to_string()
            })
        );
    }

    #[test]
    fn test_other_course_is_rejected() {
        let html = r#"<p class="intro">Log Number: EMS-201-S004-2025</p>"#;
        assert!(matches!(
            extract_course(html, PAGE_URL, &table()),
            Err(ExtractError::UnexpectedCourse { .. })
        ));
    }

    #[test]
    fn test_missing_sections_fall_back_to_sentinels() {
        let html = r#"<html><body>
            <p class="intro">Log Number: FIRE-101-S002-2025</p>
            <h5>Date:</h5>
            <p class="intro">Start: April 7, 2025</p>
        </body></html>"#;
        let record = extract_course(html, PAGE_URL, &LocationTable::default()).unwrap();
        assert_eq!(record.course_id.as_deref(), Some("FIRE-101-S002-2025"));
        assert_eq!(record.start_date, "04-07-2025");
        assert_eq!(record.end_date, NOT_AVAILABLE);
        assert_eq!(record.first_class_time, NOT_AVAILABLE);
        assert_eq!(record.days, NOT_AVAILABLE);
        assert_eq!(record.register_link, NOT_AVAILABLE);
        assert_eq!(record.location, NOT_AVAILABLE);
        assert_eq!(record.coordinate_by, NOT_AVAILABLE);
        assert_eq!(record.contact, NOT_AVAILABLE);
        assert_eq!(record.instructional_hours, NOT_AVAILABLE);
        assert!(record.location_details.location_display_name.is_none());
    }

    #[test]
    fn test_first_class_time_falls_back_to_schedule() {
        let html = r#"<p class="intro">Log Number: FIRE-101-S003-2025</p>
            <h4>Days and Times:</h4>
            <p class="intro">Saturdays<br>08:00 to 17:00</p>"#;
        let record = extract_course(html, PAGE_URL, &LocationTable::default()).unwrap();
        assert_eq!(record.first_class_time, "08:00 to 17:00");
        assert_eq!(record.days, "Saturdays");
    }

    #[test]
    fn test_session_start_only() {
        let html = r#"<p class="intro">Log Number: FIRE-101-S004-2025</p>
            <h4>Date:</h4>
            <p class="intro">Start: May 1, 2025 First Session Start Time: 9:00</p>"#;
        let record = extract_course(html, PAGE_URL, &LocationTable::default()).unwrap();
        assert_eq!(record.first_class_time, "9:00");
    }

    #[test]
    fn test_days_without_weekday_are_unavailable() {
        assert_eq!(days_from_section("See schedule 18:30-22:30"), NOT_AVAILABLE);
        assert_eq!(days_from_section("Tuesdays and Thursdays 19:00"), "Tuesdays and Thursdays");
    }

    #[test]
    fn test_location_fallback_paragraph() {
        let html = r#"<p class="intro">Log Number: FIRE-101-S005-2025</p>
            <p class="intro">Location: Easton Volunteer Fire Department</p>"#;
        let record = extract_course(html, PAGE_URL, &LocationTable::default()).unwrap();
        assert_eq!(record.location, "Easton Volunteer Fire Department");
    }

    #[test]
    fn test_clean_office_name() {
        assert_eq!(clean_office_name("the MFRI Upper Eastern Shore Regional Training Center"), "Upper Eastern Shore");
        assert_eq!(clean_office_name("North East Office"), "North East");
        assert_eq!(clean_office_name("Western Maryland"), "Western Maryland");
    }

    #[test]
    fn test_coordinator_from_text_when_no_office_link() {
        let html = r#"<p class="intro">Log Number: FIRE-101-S006-2025</p>
            <h5 class="mt-2 body-color">Coordinated by: the MFRI Southern Maryland Office. If you have any questions call us.</h5>"#;
        let record = extract_course(html, PAGE_URL, &LocationTable::default()).unwrap();
        assert_eq!(record.coordinate_by, "Southern Maryland");
        assert_eq!(record.contact, NOT_AVAILABLE);
    }

    #[test]
    fn test_schedule_range_wins_over_earlier_lone_time() {
        let html = r#"<p class="intro">Log Number: FIRE-101-S007-2025</p>
            <h4>Days and Times:</h4>
            <p class="intro">Saturdays (arrive by 7:45) 08:00-17:00</p>"#;
        let record = extract_course(html, PAGE_URL, &LocationTable::default()).unwrap();
        assert_eq!(record.first_class_time, "08:00-17:00");
    }

    #[test]
    fn test_lone_schedule_time() {
        let html = r#"<p class="intro">Log Number: FIRE-101-S008-2025</p>
            <h4>Days and Times:</h4>
            <p class="intro">Sundays starting 9:00</p>"#;
        let record = extract_course(html, PAGE_URL, &LocationTable::default()).unwrap();
        assert_eq!(record.first_class_time, "9:00");
    }
}
