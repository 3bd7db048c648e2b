//! `RetrieveResponseMsg` and SOAP fault parsing.

use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use thiserror::Error;

pub const STATUS_OK: &str = "OK";
pub const STATUS_MORE_DATA: &str = "MoreDataAvailable";

/// A `soap:Fault` returned instead of a retrieve response.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("SOAP fault {code}: {message}")]
pub struct SoapFault {
    pub code: String,
    pub message: String,
}

impl SoapFault {
    /// True when the fault reports an expired or invalid OAuth token.
    pub fn is_token_expired(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        message.contains("token expired")
            || message.contains("expired token")
            || message.contains("invalid token")
            || message.contains("login failed")
    }
}

/// One `Results` element, leaf texts keyed by their path below it
/// (`SendID`, `Email.ID`).
pub type RawResult = HashMap<String, String>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RetrieveResponse {
    pub overall_status: String,
    pub request_id: Option<String>,
    pub results: Vec<RawResult>,
}

impl RetrieveResponse {
    pub fn has_more_data(&self) -> bool {
        self.overall_status == STATUS_MORE_DATA
    }
}

/// Outcome of parsing a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapReply {
    Retrieve(RetrieveResponse),
    Fault(SoapFault),
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Parses a SOAP response body into either a retrieve response or a fault.
///
/// Namespace prefixes are ignored. Empty and `xsi:nil` elements produce no
/// entry in the result map.
pub fn parse_response(xml: &str) -> Result<SoapReply> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut response = RetrieveResponse::default();
    let mut saw_retrieve = false;
    let mut fault: Option<SoapFault> = None;
    // Depth of the open `Results` element and the map being filled
    let mut current: Option<(usize, RawResult)> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("Malformed SOAP response at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                let name = local_name(e.local_name().as_ref());
                match name.as_str() {
                    "RetrieveResponseMsg" => saw_retrieve = true,
                    "Fault" => {
                        fault = Some(SoapFault {
                            code: String::new(),
                            message: String::new(),
                        })
                    }
                    "Results" if current.is_none() => {
                        current = Some((path.len() + 1, RawResult::new()));
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::End(_) => {
                if let Some((depth, _)) = &current {
                    if path.len() == *depth {
                        if let Some((_, result)) = current.take() {
                            response.results.push(result);
                        }
                    }
                }
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape().context("Invalid escape in SOAP response")?;
                append_text(&path, &mut current, &mut response, &mut fault, &text);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                append_text(&path, &mut current, &mut response, &mut fault, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(fault) = fault {
        return Ok(SoapReply::Fault(fault));
    }
    if !saw_retrieve {
        bail!("SOAP response has neither RetrieveResponseMsg nor Fault");
    }
    Ok(SoapReply::Retrieve(response))
}

fn append_text(
    path: &[String],
    current: &mut Option<(usize, RawResult)>,
    response: &mut RetrieveResponse,
    fault: &mut Option<SoapFault>,
    text: &str,
) {
    let Some(leaf) = path.last() else {
        return;
    };

    if let Some((depth, result)) = current {
        if path.len() > *depth {
            let key = path[*depth..].join(".");
            result.entry(key).or_default().push_str(text);
        }
        return;
    }

    if let Some(fault) = fault {
        match leaf.as_str() {
            "faultcode" => fault.code.push_str(text),
            "faultstring" => fault.message.push_str(text),
            _ => {}
        }
        return;
    }

    match leaf.as_str() {
        "OverallStatus" => response.overall_status.push_str(text),
        "RequestID" => response
            .request_id
            .get_or_insert_with(String::new)
            .push_str(text),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENT_EVENTS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soap:Header>
    <wsa:Action xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing">RetrieveResponse</wsa:Action>
  </soap:Header>
  <soap:Body>
    <RetrieveResponseMsg xmlns="http://exacttarget.com/wsdl/partnerAPI">
      <OverallStatus>MoreDataAvailable</OverallStatus>
      <RequestID>7d0c-req</RequestID>
      <Results xsi:type="SentEvent">
        <Client><ID>5100</ID></Client>
        <PartnerKey xsi:nil="true" />
        <SendID>42</SendID>
        <SubscriberKey>a&amp;b@example.com</SubscriberKey>
        <EventDate>2026-05-19T10:00:00</EventDate>
      </Results>
      <Results xsi:type="SentEvent">
        <SendID>42</SendID>
        <SubscriberKey>c@example.com</SubscriberKey>
      </Results>
    </RetrieveResponseMsg>
  </soap:Body>
</soap:Envelope>"#;

    fn retrieve(xml: &str) -> RetrieveResponse {
        match parse_response(xml).unwrap() {
            SoapReply::Retrieve(response) => response,
            SoapReply::Fault(fault) => panic!("unexpected fault: {}", fault),
        }
    }

    #[test]
    fn test_parse_results_and_status() {
        let response = retrieve(SENT_EVENTS);
        assert_eq!(response.overall_status, "MoreDataAvailable");
        assert!(response.has_more_data());
        assert_eq!(response.request_id.as_deref(), Some("7d0c-req"));
        assert_eq!(response.results.len(), 2);

        let first = &response.results[0];
        assert_eq!(first["SendID"], "42");
        assert_eq!(first["SubscriberKey"], "a&b@example.com");
        assert_eq!(first["Client.ID"], "5100");
        assert!(!first.contains_key("PartnerKey"));
        assert!(!response.results[1].contains_key("EventDate"));
    }

    #[test]
    fn test_parse_empty_ok_response() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
            <RetrieveResponseMsg xmlns="http://exacttarget.com/wsdl/partnerAPI">
              <OverallStatus>OK</OverallStatus><RequestID>r1</RequestID>
            </RetrieveResponseMsg></soap:Body></soap:Envelope>"#;
        let response = retrieve(xml);
        assert_eq!(response.overall_status, STATUS_OK);
        assert!(!response.has_more_data());
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_parse_fault() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
            <soap:Fault>
              <faultcode>soap:Client</faultcode>
              <faultstring>Token Expired</faultstring>
            </soap:Fault></soap:Body></soap:Envelope>"#;
        match parse_response(xml).unwrap() {
            SoapReply::Fault(fault) => {
                assert_eq!(fault.code, "soap:Client");
                assert_eq!(fault.message, "Token Expired");
                assert!(fault.is_token_expired());
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_fault_kinds() {
        let fault = |message: &str| SoapFault {
            code: "soap:Client".to_string(),
            message: message.to_string(),
        };
        assert!(fault("Login Failed").is_token_expired());
        assert!(!fault("Unable to retrieve: unknown property Foo").is_token_expired());
    }

    #[test]
    fn test_unexpected_document_is_error() {
        let err = parse_response("<html><body>Service Unavailable</body></html>").unwrap_err();
        assert!(err.to_string().contains("neither RetrieveResponseMsg nor Fault"));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let xml = "<soap:Envelope><soap:Body><RetrieveResponseMsg></soap:Body>";
        assert!(parse_response(xml).is_err());
    }
}
