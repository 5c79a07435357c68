//! Render course locations onto a self-contained Leaflet map page

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dataset::read_courses;
use crate::types::{is_available, CourseRecord};
use crate::utils::{osc8_file_link, parse_mdy};
use crate::{ALL_COURSES_FILE, BASE_URL, BOUNDARY_FILE, CURRENT_FILE, MAP_OUTPUT};

const SOURCE_URL: &str = "https://github.com/raybellwaves/find_a_firefighter_I_class_near_you";
const MAP_CENTER: (f64, f64) = (39.0, -76.8);
const MAP_ZOOM: u8 = 8;

pub const DEFAULT_COLOR: &str = "#808080";
pub const INACTIVE_COLOR: &str = "#000000";

/// Marker color per start month, January first
pub const MONTH_COLORS: [(&str, &str); 12] = [
    ("January", "#00008B"),
    ("February", "#0000FF"),
    ("March", "#ADD8E6"),
    ("April", "#00FFFF"),
    ("May", "#90EE90"),
    ("June", "#FFFF00"),
    ("July", "#FF0000"),
    ("August", "#FF4500"),
    ("September", "#FFA500"),
    ("October", "#FA8072"),
    ("November", "#87CEEB"),
    ("December", "#0000CD"),
];

/// Color for a 1-based month number; gray when out of range
pub fn month_color(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_COLORS.get(i as usize))
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

/// Color for a course by its "MM-DD-YYYY" start date
pub fn start_date_color(start_date: &str) -> &'static str {
    parse_mdy(start_date)
        .map(|date| month_color(date.month()))
        .unwrap_or(DEFAULT_COLOR)
}

/// Parse "39.40, -76.60"
pub fn parse_lat_long(s: &str) -> Option<(f64, f64)> {
    let (lat, lon) = s.split_once(',')?;
    if lon.contains(',') {
        return None;
    }
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// One circle marker as handed to the page script
#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    pub color: &'static str,
    pub radius: u8,
    pub popup: String,
}

/// A location whose courses are all absent from the current listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InactiveLocation {
    pub lat_long: Option<String>,
    pub start_dates: Vec<String>,
}

/// Group past courses by display name, skipping locations that have a current class
pub fn inactive_locations(all_courses: &[CourseRecord], current: &[CourseRecord]) -> BTreeMap<String, InactiveLocation> {
    let active_names: HashSet<&str> = current
        .iter()
        .filter_map(|c| c.location_details.location_display_name.as_deref())
        .collect();
    let current_ids: HashSet<&str> = current.iter().filter_map(|c| c.course_id.as_deref()).collect();

    let mut locations: BTreeMap<String, InactiveLocation> = BTreeMap::new();
    for course in all_courses {
        if course.course_id.as_deref().map_or(false, |id| current_ids.contains(id)) {
            continue;
        }
        let Some(name) = course.location_details.location_display_name.as_deref() else {
            continue;
        };
        if active_names.contains(name) {
            continue;
        }

        let entry = locations.entry(name.to_string()).or_insert_with(|| InactiveLocation {
            lat_long: course.location_details.location_latitude_longitude.clone(),
            start_dates: Vec::new(),
        });
        if is_available(&course.start_date) && !entry.start_dates.contains(&course.start_date) {
            entry.start_dates.push(course.start_date.clone());
        }
    }

    for (name, location) in locations.iter_mut() {
        let parsed: Option<Vec<_>> = location.start_dates.iter().map(|d| parse_mdy(d)).collect();
        match parsed {
            Some(_) => location
                .start_dates
                .sort_by_key(|d| std::cmp::Reverse(parse_mdy(d))),
            None => warn!(
                "Could not sort start dates for {}: {:?}",
                name, location.start_dates
            ),
        }
    }

    locations
}

fn active_popup(course: &CourseRecord) -> String {
    let details = &course.location_details;
    let field = |value: Option<&str>| html_escape(value.unwrap_or("N/A"));
    format!(
        r#"<b>Location:</b> {}<br>
<b>Display Name:</b> {}<br>
<b>Course ID:</b> {}<br>
<b>Start Date:</b> {}<br>
<b>Days:</b> {}<br>
<b>Registration Closes:</b> {}<br>
<b>Time:</b> {}<br>
<a href="{}" target="_blank">Get Directions</a><br>
<a href="{}" target="_blank">Register Here</a>"#,
        html_escape(&course.location),
        field(details.location_display_name.as_deref()),
        html_escape(course.id_or_placeholder()),
        html_escape(&course.start_date),
        html_escape(&course.days),
        html_escape(&course.registration_closes),
        html_escape(&course.first_class_time),
        html_escape(details.location_google_maps_directions_url.as_deref().unwrap_or("#")),
        html_escape(&course.register_link),
    )
}

/// Markers for currently listed courses, colored by start month
pub fn active_markers(current: &[CourseRecord]) -> Vec<Marker> {
    let mut markers = Vec::new();
    for course in current {
        let id = course.id_or_placeholder();
        let Some(lat_long) = course.location_details.location_latitude_longitude.as_deref() else {
            warn!("Missing 'locationLatitudeLongitude' for course {}", id);
            continue;
        };
        let Some((lat, lon)) = parse_lat_long(lat_long) else {
            warn!("Could not parse latitude and longitude from '{}' for course {}", lat_long, id);
            continue;
        };

        let color = start_date_color(&course.start_date);
        if color == DEFAULT_COLOR {
            warn!(
                "Could not parse startDate '{}' for course {}. Using default color.",
                course.start_date, id
            );
        }
        debug!("Plotting active class {} at [{}, {}] with color {}", id, lat, lon, color);

        markers.push(Marker {
            lat,
            lon,
            color,
            radius: 7,
            popup: active_popup(course),
        });
    }
    markers
}

/// Black markers for locations with only past courses
pub fn inactive_markers(locations: &BTreeMap<String, InactiveLocation>) -> Vec<Marker> {
    let mut markers = Vec::new();
    for (name, location) in locations {
        let Some((lat, lon)) = location.lat_long.as_deref().and_then(parse_lat_long) else {
            warn!("Missing or invalid lat/long for inactive location: {}", name);
            continue;
        };
        let dates = location.start_dates.join(", ");
        debug!("Plotting inactive location {} at [{}, {}]", name, lat, lon);

        markers.push(Marker {
            lat,
            lon,
            color: INACTIVE_COLOR,
            radius: 6,
            popup: format!(
                "<b>Location Display Name:</b> {}<br>\n<b>Inactive Course Start Dates:</b> {}",
                html_escape(name),
                html_escape(&dates)
            ),
        });
    }
    markers
}

fn legend_item(color: &str, label: &str) -> String {
    format!(
        r#"<div class="legend-item"><i style="background:{};"></i><span>{}</span></div>"#,
        color, label
    )
}

/// Collapsible legend: inactive swatch plus one swatch per month
fn legend_html() -> String {
    let mut items = legend_item(INACTIVE_COLOR, "Inactive Classes");
    for (month, color) in MONTH_COLORS.iter() {
        items.push('\n');
        items.push_str(&legend_item(color, month));
    }

    format!(
        r#"<div id="mapLegend">
  <div id="legendHeader" onclick="toggleLegend()">
    <span>Legend</span>
    <span id="legendToggleIcon">[+]</span>
  </div>
  <div id="legendContent">
{}
  </div>
</div>"#,
        items
    )
}

fn css_styles() -> &'static str {
    r#"
html, body { margin: 0; padding: 0; font-family: sans-serif; }
h3.map-title { text-align: center; font-size: 20px; margin: 8px 0; }
#map { width: 100%; height: 80vh; }
#mapLegend {
    position: fixed;
    bottom: 20px;
    left: 20px;
    width: 130px;
    max-height: 38px;
    overflow: hidden;
    border: 2px solid grey;
    border-radius: 5px;
    z-index: 9999;
    font-size: 14px;
    background-color: white;
    opacity: 0.95;
    box-shadow: 0 2px 5px rgba(0,0,0,0.2);
    transition: max-height 0.3s ease-in-out, width 0.3s ease-in-out;
}
#legendHeader {
    cursor: pointer;
    padding: 8px;
    background-color: #f0f0f0;
    display: flex;
    justify-content: space-between;
    align-items: center;
    font-weight: bold;
}
#legendContent { padding: 8px; max-height: 200px; overflow-y: auto; display: none; }
.legend-item { display: flex; align-items: center; margin-bottom: 3px; }
.legend-item i { width: 15px; height: 15px; display: inline-block; margin-right: 5px; border: 1px solid #888; }
footer { text-align: center; margin-top: 10px; font-size: 12px; color: #333; line-height: 1.6; }
footer a { color: #007bff; text-decoration: none; }
"#
}

fn page_footer(generated_at: &str) -> String {
    format!(
        r#"<footer>
    Last updated: {}
    | Color is based on month when the class starts. See Legend for more information.
    | Black color shows inactive classes that have no current classes at this location but may do in the future.
    | Data taken from <a href="{}/" target="_blank">MFRI Firefighter I Courses</a>
    | Source code available on <a href="{}" target="_blank">GitHub</a>
</footer>"#,
        html_escape(generated_at),
        BASE_URL,
        SOURCE_URL
    )
}

/// JSON for embedding inside a `<script>` element
fn script_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

/// Build the full map page
pub fn render_map(markers: &[Marker], boundary: Option<&Value>, generated_at: &str) -> Result<String> {
    let markers_json = script_json(&markers)?;
    let boundary_json = match boundary {
        Some(geojson) => script_json(geojson)?,
        None => "null".to_string(),
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Find a Firefighter I Class near you</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/leaflet.locatecontrol@0.79.0/dist/L.Control.Locate.min.css">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/leaflet.locatecontrol@0.79.0/dist/L.Control.Locate.min.js"></script>
    <style>{css}</style>
</head>
<body>
    <h3 class="map-title"><b>Find a Firefighter I Class near you</b></h3>
    <div id="map"></div>
    {legend}
    {footer}
    <script>
    var map = L.map('map').setView([{lat}, {lon}], {zoom});
    L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
        maxZoom: 19,
        attribution: '&copy; OpenStreetMap contributors'
    }}).addTo(map);

    var boundary = {boundary};
    if (boundary) {{
        L.geoJSON(boundary, {{
            style: {{ color: 'black', weight: 2, fillOpacity: 0.0 }}
        }}).addTo(map);
    }}

    var markers = {markers};
    markers.forEach(function(m) {{
        L.circleMarker([m.lat, m.lon], {{
            radius: m.radius,
            color: m.color,
            fill: true,
            fillColor: m.color,
            fillOpacity: 1
        }}).bindPopup(m.popup, {{ maxWidth: 300 }}).addTo(map);
    }});

    L.control.locate().addTo(map);

    function toggleLegend() {{
        var legend = document.getElementById('mapLegend');
        var content = document.getElementById('legendContent');
        var icon = document.getElementById('legendToggleIcon');
        var header = document.getElementById('legendHeader');
        if (content.style.display !== 'block') {{
            content.style.display = 'block';
            icon.textContent = '[-]';
            legend.style.maxHeight = '250px';
            legend.style.width = '180px';
            header.style.borderBottom = '1px solid #ccc';
        }} else {{
            content.style.display = 'none';
            icon.textContent = '[+]';
            legend.style.maxHeight = '38px';
            legend.style.width = '130px';
            header.style.borderBottom = 'none';
        }}
    }}
    </script>
</body>
</html>
"#,
        css = css_styles(),
        legend = legend_html(),
        footer = page_footer(generated_at),
        lat = MAP_CENTER.0,
        lon = MAP_CENTER.1,
        zoom = MAP_ZOOM,
        boundary = boundary_json,
        markers = markers_json,
    ))
}

fn load_boundary(path: &Path) -> Option<Value> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Boundary file {} not readable ({}). Border will not be drawn.", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Could not decode GeoJSON from {} ({}). Border will not be drawn.", path.display(), e);
            None
        }
    }
}

pub fn run_map() -> Result<()> {
    let all_courses = match read_courses(Path::new(ALL_COURSES_FILE)) {
        Ok(courses) => courses,
        Err(e) => {
            warn!("{:#}. Starting with empty data for all courses.", e);
            Vec::new()
        }
    };
    info!("Loaded {} records from {}", all_courses.len(), ALL_COURSES_FILE);

    let current = read_courses(Path::new(CURRENT_FILE))
        .context("Cannot render the map without the current class listing. Run 'ff1-classes current' first.")?;
    info!("Loaded {} records from {}", current.len(), CURRENT_FILE);

    let inactive = inactive_locations(&all_courses, &current);
    info!("{} locations have only past or inactive classes", inactive.len());

    let mut markers = active_markers(&current);
    markers.extend(inactive_markers(&inactive));

    let boundary = load_boundary(Path::new(BOUNDARY_FILE));
    let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let html = render_map(&markers, boundary.as_ref(), &generated_at)?;

    let output = Path::new(MAP_OUTPUT);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(output, html).with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Map generated with {} markers at {}",
        markers.len(),
        osc8_file_link(MAP_OUTPUT, MAP_OUTPUT)
    );
    Ok(())
}
