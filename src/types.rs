//! Course and location record types with the JSON shape of the data files

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder for any scraped text field that could not be extracted
pub const NOT_AVAILABLE: &str = "N/A";

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// Accept `null` (older listing files wrote it) as the sentinel
fn string_or_sentinel<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_else(not_available))
}

/// Returns true if a scraped field holds a real value
pub fn is_available(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != NOT_AVAILABLE
}

/// Location metadata copied onto a course from the matched `LocationRecord`.
///
/// Every field stays `null` when no location matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDetails {
    #[serde(default)]
    pub location_url_id: Option<Value>,
    #[serde(default)]
    pub location_region_id: Option<Value>,
    #[serde(default)]
    pub location_served_by: Option<String>,
    #[serde(default)]
    pub location_served_by_url: Option<String>,
    #[serde(default)]
    pub location_website_address: Option<String>,
    #[serde(default)]
    pub location_formatted_address: Option<String>,
    #[serde(default)]
    pub location_latitude_longitude: Option<String>,
    #[serde(default)]
    pub location_display_name: Option<String>,
    #[serde(default)]
    pub location_google_maps_url: Option<String>,
    #[serde(default)]
    pub location_google_maps_directions_url: Option<String>,
}

/// One offered course instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel", alias = "classUrl")]
    pub course_url: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub register_link: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub start_date: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub end_date: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub first_class_time: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub days: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub registration_opens: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub registration_closes: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub location: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub instructional_hours: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub coordinate_by: String,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub contact: String,
    #[serde(flatten)]
    pub location_details: LocationDetails,
    #[serde(default = "not_available", deserialize_with = "string_or_sentinel")]
    pub current_date: String,
}

impl CourseRecord {
    /// A record with every field at its sentinel, stamped with the current local time
    pub fn empty(course_url: &str) -> Self {
        Self {
            course_id: None,
            course_url: course_url.to_string(),
            register_link: not_available(),
            start_date: not_available(),
            end_date: not_available(),
            first_class_time: not_available(),
            days: not_available(),
            registration_opens: not_available(),
            registration_closes: not_available(),
            location: not_available(),
            instructional_hours: not_available(),
            coordinate_by: not_available(),
            contact: not_available(),
            location_details: LocationDetails::default(),
            current_date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn id_or_placeholder(&self) -> &str {
        self.course_id.as_deref().unwrap_or(NOT_AVAILABLE)
    }
}

/// Known training location from `mfri_locations.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Canonical name, matched by substring against scraped location text
    pub location: String,
    #[serde(default)]
    pub url_id: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub served_by: Option<String>,
    #[serde(default)]
    pub served_by_url: Option<String>,
    #[serde(default)]
    pub website_address: Option<String>,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub location_latitude_longitude: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub google_maps_url: Option<String>,
    #[serde(default)]
    pub google_maps_directions_url: Option<String>,
}

impl LocationRecord {
    pub fn details(&self) -> LocationDetails {
        LocationDetails {
            location_url_id: self.url_id.clone(),
            location_region_id: self.id.clone(),
            location_served_by: self.served_by.clone(),
            location_served_by_url: self.served_by_url.clone(),
            location_website_address: self.website_address.clone(),
            location_formatted_address: self.formatted_address.clone(),
            location_latitude_longitude: self.location_latitude_longitude.clone(),
            location_display_name: self.display_name.clone(),
            location_google_maps_url: self.google_maps_url.clone(),
            location_google_maps_directions_url: self.google_maps_directions_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_missing_fields_become_sentinels() {
        let json = r#"{"courseId": "FIRE-101-S001-2025", "startDate": null, "classUrl": "https://example.org/S001/2025"}"#;
        let record: CourseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.course_id.as_deref(), Some("FIRE-101-S001-2025"));
        assert_eq!(record.start_date, NOT_AVAILABLE);
        assert_eq!(record.days, NOT_AVAILABLE);
        assert_eq!(record.course_url, "https://example.org/S001/2025");
        assert_eq!(record.location_details, LocationDetails::default());
    }

    #[test]
    fn test_every_field_is_serialized() {
        let record = CourseRecord::empty("https://example.org/");
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "courseId",
            "courseUrl",
            "registerLink",
            "instructionalHours",
            "locationRegionId",
            "locationLatitudeLongitude",
            "locationGoogleMapsDirectionsUrl",
            "currentDate",
        ] {
            assert!(object.contains_key(key), "missing {}", key);
        }
        assert_eq!(object["locationDisplayName"], Value::Null);
        assert_eq!(object["contact"], Value::String("N/A".to_string()));
    }

    #[test]
    fn test_is_available() {
        assert!(is_available("Mondays"));
        assert!(!is_available("N/A"));
        assert!(!is_available("  "));
    }
}
