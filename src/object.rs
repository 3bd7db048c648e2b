//! Object definitions.
//!
//! An [`ObjectDefinition`] describes one platform object to extract (which API
//! surface serves it, which properties to request, how to bound it in time) and
//! how its records are written to the warehouse.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two protocol styles exposed by the platform. Each has its own
/// credentials and token lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiSurface {
    Rest,
    Soap,
}

impl ApiSurface {
    pub const ALL: [ApiSurface; 2] = [ApiSurface::Rest, ApiSurface::Soap];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiSurface::Rest => "rest",
            ApiSurface::Soap => "soap",
        }
    }

    /// Prefix for credential environment variables, e.g. `SFMC_SOAP`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ApiSurface::Rest => "SFMC_REST",
            ApiSurface::Soap => "SFMC_SOAP",
        }
    }
}

impl fmt::Display for ApiSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How extracted records are written to their table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    /// Upsert on the primary key.
    Merge,
    /// Truncate the table, then insert.
    Replace,
    /// Insert only.
    Append,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::Merge => "merge",
            WriteDisposition::Replace => "replace",
            WriteDisposition::Append => "append",
        }
    }
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paginated REST endpoint for a REST object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestEndpoint {
    /// Path relative to the REST base URL (e.g. `asset/v1/content/assets`).
    pub path: String,
    /// Value sent as `$pagesize`.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Dotted path to the record array in each page.
    #[serde(default = "default_data_selector")]
    pub data_selector: String,
    /// Dotted path to the total record count, if the endpoint reports one.
    #[serde(default = "default_total_selector")]
    pub total_selector: Option<String>,
}

fn default_page_size() -> u32 {
    50
}

fn default_data_selector() -> String {
    "items".to_string()
}

fn default_total_selector() -> Option<String> {
    Some("count".to_string())
}

impl RestEndpoint {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            page_size: default_page_size(),
            data_selector: default_data_selector(),
            total_selector: default_total_selector(),
        }
    }
}

/// One object to extract and load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    /// Object type name (SOAP `ObjectType`, or a label for REST resources).
    pub name: String,
    pub surface: ApiSurface,
    /// Properties requested from the SOAP API. Unused for REST.
    #[serde(default)]
    pub properties: Vec<String>,
    /// Date property used to bound incremental extractions.
    #[serde(default)]
    pub filter_field: Option<String>,
    /// Lookback window in days.
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    /// Lookback used when the table has never been loaded successfully.
    #[serde(default)]
    pub initial_days_back: Option<u32>,
    /// Extract everything, never apply a date filter.
    #[serde(default)]
    pub full_load: bool,
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Destination table. Derived from `name` when absent.
    #[serde(default)]
    pub table: Option<String>,
    /// Derived from `primary_key` when absent.
    #[serde(default)]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(default)]
    pub endpoint: Option<RestEndpoint>,
}

fn default_days_back() -> u32 {
    4
}

/// Record key under which a SOAP property is stored: `SendID` -> `sendid`,
/// `Email.ID` -> `email_id`.
pub fn property_column(property: &str) -> String {
    property.replace('.', "_").to_lowercase()
}

impl ObjectDefinition {
    /// SOAP object with a date filter on `filter_field`, merged on `id`.
    pub fn soap(name: &str, properties: &[&str], filter_field: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            surface: ApiSurface::Soap,
            properties: properties.iter().map(|p| p.to_string()).collect(),
            filter_field: filter_field.map(str::to_string),
            days_back: default_days_back(),
            initial_days_back: None,
            full_load: filter_field.is_none(),
            primary_key: Some("id".to_string()),
            table: None,
            write_disposition: None,
            endpoint: None,
        }
    }

    /// REST resource, fully extracted on every run.
    pub fn rest(name: &str, endpoint: RestEndpoint) -> Self {
        Self {
            name: name.to_string(),
            surface: ApiSurface::Rest,
            properties: Vec::new(),
            filter_field: None,
            days_back: default_days_back(),
            initial_days_back: None,
            full_load: true,
            primary_key: None,
            table: None,
            write_disposition: None,
            endpoint: Some(endpoint),
        }
    }

    pub fn with_primary_key(mut self, key: &str) -> Self {
        self.primary_key = Some(key.to_string());
        self
    }

    /// Destination table name. SOAP object types are pluralised
    /// (`SentEvent` → `sentevents`); REST names are used lower-cased.
    pub fn table_name(&self) -> String {
        if let Some(table) = &self.table {
            return table.clone();
        }
        match self.surface {
            ApiSurface::Soap => format!("{}s", self.name.to_lowercase()),
            ApiSurface::Rest => self.name.to_lowercase(),
        }
    }

    /// Primary key spelled the way it appears in extracted records. SOAP
    /// properties are stored under [`property_column`], so `SubscriberKey`
    /// becomes `subscriberkey`.
    pub fn merge_key(&self) -> Option<String> {
        let key = self.primary_key.as_deref()?;
        Some(match self.surface {
            ApiSurface::Soap => property_column(key),
            ApiSurface::Rest => key.to_string(),
        })
    }

    pub fn disposition(&self) -> WriteDisposition {
        match (self.write_disposition, &self.primary_key) {
            (Some(disposition), _) => disposition,
            (None, Some(_)) => WriteDisposition::Merge,
            (None, None) => WriteDisposition::Replace,
        }
    }

    /// Lookback for this run. `initial_days_back` applies until the first
    /// successful load.
    pub fn lookback_days(&self, previously_loaded: bool) -> u32 {
        match (previously_loaded, self.initial_days_back) {
            (false, Some(initial)) => initial,
            _ => self.days_back,
        }
    }

    /// Date bounds for an extraction ending at `now`, or `None` when the
    /// object is fully loaded or has no filter field.
    pub fn date_window(&self, now: DateTime<Utc>, days_back: u32) -> Option<DateWindow> {
        if self.full_load || self.filter_field.is_none() {
            return None;
        }
        Some(DateWindow::trailing(now, days_back))
    }
}

/// Closed time range `[start, end]` bounding an incremental extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// `[end - days, end]`
    pub fn trailing(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sent_event() -> ObjectDefinition {
        ObjectDefinition::soap("SentEvent", &["SendID", "EventDate"], Some("EventDate"))
    }

    #[test]
    fn test_table_names() {
        assert_eq!(sent_event().table_name(), "sentevents");
        let rest = ObjectDefinition::rest("Assets", RestEndpoint::new("asset/v1/content/assets"));
        assert_eq!(rest.table_name(), "assets");

        let mut custom = sent_event();
        custom.table = Some("email_sends".to_string());
        assert_eq!(custom.table_name(), "email_sends");
    }

    #[test]
    fn test_disposition_follows_primary_key() {
        assert_eq!(sent_event().disposition(), WriteDisposition::Merge);

        let rest = ObjectDefinition::rest("campaigns", RestEndpoint::new("hub/v1/campaigns"));
        assert_eq!(rest.disposition(), WriteDisposition::Replace);

        let mut append = rest.clone();
        append.write_disposition = Some(WriteDisposition::Append);
        assert_eq!(append.disposition(), WriteDisposition::Append);
    }

    #[test]
    fn test_merge_key_matches_record_keys() {
        let subscriber = ObjectDefinition::soap("Subscriber", &["ID", "SubscriberKey"], None)
            .with_primary_key("SubscriberKey");
        assert_eq!(subscriber.merge_key().as_deref(), Some("subscriberkey"));
        assert_eq!(sent_event().merge_key().as_deref(), Some("id"));

        let nested = sent_event().with_primary_key("Email.ID");
        assert_eq!(nested.merge_key().as_deref(), Some("email_id"));

        let rest = ObjectDefinition::rest("assets", RestEndpoint::new("asset/v1/content/assets"))
            .with_primary_key("customerKey");
        assert_eq!(rest.merge_key().as_deref(), Some("customerKey"));

        let unkeyed = ObjectDefinition::rest("campaigns", RestEndpoint::new("hub/v1/campaigns"));
        assert_eq!(unkeyed.merge_key(), None);
    }

    #[test]
    fn test_full_load_has_no_window_regardless_of_days_back() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let mut object = sent_event();
        object.full_load = true;

        for days in [0, 1, 4, 365] {
            object.days_back = days;
            assert_eq!(object.date_window(now, days), None);
        }
    }

    #[test]
    fn test_window_covers_exactly_days_back() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let window = sent_event().date_window(now, 7).unwrap();

        assert_eq!(window.end, now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap());
        assert!(window.contains(window.start));
        assert!(window.contains(now));
        assert!(!window.contains(now + Duration::seconds(1)));
    }

    #[test]
    fn test_no_filter_field_means_no_window() {
        let now = Utc::now();
        let mut object = sent_event();
        object.filter_field = None;
        object.full_load = false;
        assert_eq!(object.date_window(now, 4), None);
    }

    #[test]
    fn test_initial_lookback_applies_until_first_load() {
        let mut object = sent_event();
        object.days_back = 4;
        object.initial_days_back = Some(90);

        assert_eq!(object.lookback_days(false), 90);
        assert_eq!(object.lookback_days(true), 4);

        object.initial_days_back = None;
        assert_eq!(object.lookback_days(false), 4);
    }

    #[test]
    fn test_deserialize_minimal_soap_object() {
        let toml = r#"
            name = "OpenEvent"
            surface = "soap"
            properties = ["SendID", "SubscriberKey", "EventDate"]
            filter_field = "EventDate"
            primary_key = "id"
        "#;
        let object: ObjectDefinition = toml::from_str(toml).unwrap();
        assert_eq!(object.surface, ApiSurface::Soap);
        assert_eq!(object.days_back, 4);
        assert!(!object.full_load);
        assert_eq!(object.endpoint, None);
    }
}
