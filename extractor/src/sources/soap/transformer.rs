use super::response::RawResult;
use serde_json::Value;
use sfmc_pipeline::{ObjectDefinition, Record};

/// Objects whose rows carry no `ID` and are keyed by send, subscriber and date.
pub const EVENT_OBJECTS: &[&str] = &[
    "SentEvent",
    "BounceEvent",
    "ClickEvent",
    "OpenEvent",
    "UnsubEvent",
];

const UNKNOWN: &str = "unknown";

/// Record column for a requested property: `SendID` -> `sendid`,
/// `Email.ID` -> `email_id`.
pub fn column_name(property: &str) -> String {
    sfmc_pipeline::object::property_column(property)
}

/// Converts one retrieve result into a record holding every requested
/// property, then fills in a synthetic `id` when the API supplied none.
pub fn to_record(object: &ObjectDefinition, raw: &RawResult) -> Record {
    let mut record = Record::new();
    for property in &object.properties {
        let value = raw
            .get(property.as_str())
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null);
        record.insert(column_name(property), value);
    }

    if !has_id(&record) {
        if let Some(id) = synthetic_id(&object.name, &record) {
            record.insert("id".to_string(), Value::String(id));
        }
    }
    record
}

fn has_id(record: &Record) -> bool {
    match record.get("id") {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

fn part<'a>(record: &'a Record, key: &str) -> &'a str {
    match record.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => UNKNOWN,
    }
}

fn synthetic_id(object_type: &str, record: &Record) -> Option<String> {
    if EVENT_OBJECTS.contains(&object_type) {
        let sendid = part(record, "sendid");
        let subscriberkey = part(record, "subscriberkey");
        let eventdate = part(record, "eventdate");
        return Some(if object_type == "ClickEvent" {
            format!(
                "{}_{}_{}_{}",
                sendid,
                subscriberkey,
                part(record, "urlid"),
                eventdate
            )
        } else {
            format!("{}_{}_{}", sendid, subscriberkey, eventdate)
        });
    }

    if object_type == "Subscriber" {
        return match record.get("subscriberkey") {
            Some(Value::String(key)) if !key.is_empty() => Some(key.clone()),
            _ => None,
        };
    }
    None
}
