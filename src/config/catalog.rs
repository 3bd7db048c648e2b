//! Built-in object catalog.
//!
//! Used when the pipeline file does not list any objects. High-volume event
//! objects are bounded by `EventDate`; `Subscriber` cannot be date filtered and
//! is always fully loaded, keyed on its subscriber key.

use crate::object::{ObjectDefinition, RestEndpoint};

const EVENT_TRAILER: &[&str] = &["BatchID", "TriggeredSendDefinitionObjectID"];

/// Returns the default object list, REST resources first.
pub fn default_objects() -> Vec<ObjectDefinition> {
    let mut objects = rest_objects();
    objects.extend(soap_objects());
    objects
}

fn rest_objects() -> Vec<ObjectDefinition> {
    vec![
        ObjectDefinition::rest("assets", RestEndpoint::new("asset/v1/content/assets")),
        ObjectDefinition::rest("campaigns", RestEndpoint::new("hub/v1/campaigns")),
        ObjectDefinition::rest("journeys", RestEndpoint::new("interaction/v1/interactions")),
    ]
}

fn soap_objects() -> Vec<ObjectDefinition> {
    vec![
        event(
            "BounceEvent",
            &[
                "BounceCategory",
                "BounceType",
                "SMTPCode",
                "SMTPReason",
            ],
        ),
        event("ClickEvent", &["URL", "URLID"]),
        event("OpenEvent", &[]),
        ObjectDefinition::soap(
            "Send",
            &[
                "ID",
                "CreatedDate",
                "ModifiedDate",
                "Client.ID",
                "Email.ID",
                "SendDate",
                "FromName",
                "FromAddress",
                "Status",
                "Subject",
                "EmailName",
                "NumberSent",
                "NumberDelivered",
                "NumberTargeted",
                "NumberErrored",
                "NumberExcluded",
                "PreviewURL",
            ],
            Some("CreatedDate"),
        ),
        event("SentEvent", &["ListID"]),
        ObjectDefinition::soap(
            "Subscriber",
            &[
                "ID",
                "SubscriberKey",
                "EmailAddress",
                "Status",
                "CreatedDate",
                "EmailTypePreference",
                "UnsubscribedDate",
            ],
            None,
        )
        .with_primary_key("subscriberkey"),
        event("UnsubEvent", &["IsMasterUnsubscribed"]),
    ]
}

/// Tracking event bounded by `EventDate`, with the common event columns
/// followed by `extra` and the batch/trigger trailer.
fn event(name: &str, extra: &[&str]) -> ObjectDefinition {
    let mut properties = vec!["SendID", "SubscriberKey", "EventDate", "EventType"];
    properties.extend_from_slice(extra);
    properties.extend_from_slice(EVENT_TRAILER);
    ObjectDefinition::soap(name, &properties, Some("EventDate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ApiSurface, WriteDisposition};

    #[test]
    fn test_catalog_order_and_surfaces() {
        let objects = default_objects();
        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "assets",
                "campaigns",
                "journeys",
                "BounceEvent",
                "ClickEvent",
                "OpenEvent",
                "Send",
                "SentEvent",
                "Subscriber",
                "UnsubEvent",
            ]
        );
        assert!(objects[..3].iter().all(|o| o.surface == ApiSurface::Rest));
        assert!(objects[3..].iter().all(|o| o.surface == ApiSurface::Soap));
    }

    #[test]
    fn test_subscriber_is_full_load() {
        let objects = default_objects();
        let subscriber = objects.iter().find(|o| o.name == "Subscriber").unwrap();
        assert!(subscriber.full_load);
        assert_eq!(subscriber.filter_field, None);
        assert_eq!(subscriber.primary_key.as_deref(), Some("subscriberkey"));
        assert_eq!(subscriber.disposition(), WriteDisposition::Merge);
    }

    #[test]
    fn test_rest_objects_replace() {
        for object in rest_objects() {
            assert!(object.full_load);
            assert_eq!(object.disposition(), WriteDisposition::Replace);
        }
    }

    #[test]
    fn test_click_event_properties() {
        let click = event("ClickEvent", &["URL", "URLID"]);
        assert_eq!(
            click.properties,
            vec![
                "SendID",
                "SubscriberKey",
                "EventDate",
                "EventType",
                "URL",
                "URLID",
                "BatchID",
                "TriggeredSendDefinitionObjectID",
            ]
        );
        assert_eq!(click.filter_field.as_deref(), Some("EventDate"));
        assert!(!click.full_load);
    }
}
