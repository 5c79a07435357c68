//! One-shot scrape of the live course listing page into the current snapshot

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{info, warn};

use crate::dataset::{sort_courses, write_courses};
use crate::extract::{absolute_url, clean_office_name, joined_text};
use crate::locations::{join_location, LocationTable};
use crate::net::{HttpClient, RetryPolicy};
use crate::types::{CourseRecord, NOT_AVAILABLE};
use crate::utils::{collapse_whitespace, format_date_mdy, osc8_file_link};
use crate::{BASE_URL, BROWSER_USER_AGENT, CURRENT_FILE, LOCATIONS_FILE};

const LISTING_TIMEOUT: Duration = Duration::from_secs(15);

const WEEKDAYS: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

static CARD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.row.event-item").unwrap());
static ID_H5_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.col-md-2 h5").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static DATE_DIV_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.col-md-3").unwrap());
static BODY_H5_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h5.mt-2.body-color").unwrap());
static NOBR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("nobr").unwrap());
static DAYS_SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.mt-2.body-color").unwrap());
static LOCATION_H5_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.col-md-4 h5").unwrap());
static COORD_DIV_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.col-md-11").unwrap());

static COORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Coordinated by:\s*(.*?)(?:\s*\.\s*For questions contact:|\s+For questions contact:|$)").unwrap()
});
static CONTACT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)For questions contact:\s*(.*)").unwrap());

fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn mentions_weekday(text: &str) -> bool {
    let lower = text.to_lowercase();
    WEEKDAYS.iter().any(|day| lower.contains(day))
}

fn non_empty(s: String) -> Option<String> {
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

/// Detail page URL built from the last two dash segments of a course id
fn class_url(course_id: &str) -> Option<String> {
    let mut segments = course_id.rsplit('-');
    let year = segments.next()?;
    let s_code = segments.next()?;
    Some(format!("{}/{}/{}", BASE_URL, s_code, year))
}

/// Prefer the `mailto:` target when the captured contact text matches the link's text or target
pub fn prefer_mailto<'a>(captured: &str, links: impl IntoIterator<Item = (&'a str, String)>) -> String {
    for (href, text) in links {
        let Some(email) = href.strip_prefix("mailto:") else {
            continue;
        };
        if captured.eq_ignore_ascii_case(&text) || captured.eq_ignore_ascii_case(email) {
            return email.trim().to_string();
        }
    }
    captured.to_string()
}

/// Start, end and first-class time from the date column
fn dates_and_time(h5: &ElementRef) -> (Option<String>, Option<String>, Option<String>) {
    let nobrs: Vec<String> = h5.select(&NOBR_SEL).map(|n| joined_text(&n, " ")).collect();
    let (start, end) = if nobrs.len() >= 2 {
        (non_empty(nobrs[0].clone()), non_empty(nobrs[1].clone()))
    } else {
        (None, None)
    };

    let time_parts: Option<(String, String)> = if nobrs.len() >= 4 {
        Some((nobrs[2].clone(), nobrs[3].clone()))
    } else {
        nobrs_after_label(h5, "First Class Time:")
    };
    let time = time_parts
        .filter(|(a, b)| !a.is_empty() || !b.is_empty())
        .map(|(a, b)| format!("{} - {}", a, b));

    (start, end, time)
}

/// The two `nobr` siblings following the text node that contains `label`
fn nobrs_after_label(h5: &ElementRef, label: &str) -> Option<(String, String)> {
    let label_node = h5
        .children()
        .find(|node| matches!(node.value(), Node::Text(t) if t.contains(label)))?;
    let found: Vec<String> = label_node
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "nobr")
        .take(2)
        .map(|e| joined_text(&e, " "))
        .collect();
    match found.as_slice() {
        [a, b] => Some((a.clone(), b.clone())),
        _ => None,
    }
}

/// Meeting days: the styled span, else the last text node or span naming a weekday
fn days(h5: &ElementRef) -> Option<String> {
    if let Some(span) = h5.select(&DAYS_SPAN_SEL).next() {
        if let Some(days) = non_empty(joined_text(&span, " ")) {
            return Some(days);
        }
    }

    h5.children()
        .filter_map(|node| match node.value() {
            Node::Text(t) => {
                let text = t.trim();
                (mentions_weekday(text) && !text.contains("First Class Time:")).then(|| text.to_string())
            }
            Node::Element(e) if e.name() == "span" => ElementRef::wrap(node)
                .map(|span| joined_text(&span, " "))
                .filter(|text| mentions_weekday(text)),
            _ => None,
        })
        .last()
}

fn registration_window(card: &ElementRef, date_div: Option<&ElementRef>) -> (Option<String>, Option<String>) {
    let columns: Vec<ElementRef> = card
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "div" && has_class(e, "col-md-3"))
        .collect();

    let is_date_div = |column: &ElementRef| date_div.map_or(false, |d| d.id() == column.id());
    let registration_div = columns
        .iter()
        .find(|c| !is_date_div(*c) && c.text().any(|t| t.contains("Registration Open:")))
        .or_else(|| match columns.first() {
            Some(first) if is_date_div(first) => columns.get(1),
            _ => None,
        });

    let Some(h5) = registration_div.and_then(|d| d.select(&BODY_H5_SEL).next()) else {
        return (None, None);
    };
    let nobrs: Vec<String> = h5.select(&NOBR_SEL).map(|n| joined_text(&n, " ")).collect();
    if nobrs.len() >= 2 {
        (non_empty(nobrs[0].clone()), non_empty(nobrs[1].clone()))
    } else {
        (None, None)
    }
}

/// First non-empty text node directly inside the location heading
fn location(card: &ElementRef) -> Option<String> {
    let h5 = card.select(&LOCATION_H5_SEL).next()?;
    h5.children().find_map(|node| match node.value() {
        Node::Text(t) => non_empty(collapse_whitespace(t)),
        _ => None,
    })
}

fn coordinator_and_contact(card: &ElementRef) -> (Option<String>, Option<String>) {
    let Some(h5) = card
        .select(&COORD_DIV_SEL)
        .filter_map(|div| div.select(&BODY_H5_SEL).next())
        .find(|h5| joined_text(h5, "").contains("Coordinated by:"))
    else {
        return (None, None);
    };

    let full_text = collapse_whitespace(&joined_text(&h5, " "));
    let coordinator = COORD_RE
        .captures(&full_text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| non_empty(clean_office_name(m.as_str())));

    let contact = CONTACT_RE
        .captures(&full_text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| non_empty(m.as_str().to_string()))
        .map(|captured| {
            let links = h5
                .select(&LINK_SEL)
                .filter_map(|a| Some((a.value().attr("href")?, joined_text(&a, ""))));
            prefer_mailto(&captured, links)
        });

    (coordinator, contact)
}

fn parse_card(card: &ElementRef, page_url: &str) -> CourseRecord {
    let mut record = CourseRecord::empty(NOT_AVAILABLE);
    let or_sentinel = |value: Option<String>| value.unwrap_or_else(|| NOT_AVAILABLE.to_string());

    if let Some(h5) = card.select(&ID_H5_SEL).next() {
        record.course_id = h5.children().next().and_then(|node| match node.value() {
            Node::Text(t) => non_empty(t.to_string()),
            _ => None,
        });
        if let Some(href) = h5.select(&LINK_SEL).next().and_then(|a| a.value().attr("href")) {
            record.register_link = absolute_url(page_url, href);
        }
    }
    if let Some(url) = record.course_id.as_deref().and_then(class_url) {
        record.course_url = url;
    }

    let date_div = card.select(&DATE_DIV_SEL).next();
    if let Some(h5) = date_div.and_then(|d| d.select(&BODY_H5_SEL).next()) {
        let (start, end, time) = dates_and_time(&h5);
        record.start_date = format_date_mdy(&or_sentinel(start));
        record.end_date = format_date_mdy(&or_sentinel(end));
        record.first_class_time = or_sentinel(time);
        record.days = or_sentinel(days(&h5));
    }

    let (opens, closes) = registration_window(card, date_div.as_ref());
    record.registration_opens = format_date_mdy(&or_sentinel(opens));
    record.registration_closes = format_date_mdy(&or_sentinel(closes));

    record.location = or_sentinel(location(card));

    let (coordinator, contact) = coordinator_and_contact(card);
    record.coordinate_by = or_sentinel(coordinator);
    record.contact = or_sentinel(contact);

    record
}

/// Parse every course card on the listing page. Cards without a course id are dropped.
pub fn parse_listing(html: &str, page_url: &str, locations: &LocationTable) -> Vec<CourseRecord> {
    let doc = Html::parse_document(html);
    let cards: Vec<ElementRef> = doc.select(&CARD_SEL).collect();
    if cards.is_empty() {
        warn!("No event items found with class 'row event-item'. Check the HTML structure.");
        return Vec::new();
    }

    cards
        .iter()
        .enumerate()
        .filter_map(|(i, card)| {
            let mut record = parse_card(card, page_url);
            if record.course_id.is_none() {
                warn!("Skipping listing card {}: no course id", i + 1);
                return None;
            }
            join_location(&mut record, locations);
            Some(record)
        })
        .collect()
}

pub fn run_current() -> Result<()> {
    let locations = LocationTable::load(Path::new(LOCATIONS_FILE));
    let client = HttpClient::new(BROWSER_USER_AGENT, LISTING_TIMEOUT, RetryPolicy::default())?;

    let listing_url = format!("{}/", BASE_URL);
    info!("Fetching HTML content from: {}", listing_url);
    let page = client
        .get(&listing_url)
        .context("Could not retrieve the course listing")?;
    if !page.status.is_success() {
        bail!("HTTP error {} for URL: {}", page.status, listing_url);
    }

    let mut courses = parse_listing(&page.body, &page.final_url, &locations);
    if courses.is_empty() {
        warn!("No courses were extracted; {} left untouched", CURRENT_FILE);
        return Ok(());
    }
    sort_courses(&mut courses);
    write_courses(Path::new(CURRENT_FILE), &courses)?;

    println!(
        "Extracted {} courses to {}",
        courses.len(),
        osc8_file_link(CURRENT_FILE, CURRENT_FILE)
    );
    Ok(())
}
