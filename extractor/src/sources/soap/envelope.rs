//! `RetrieveRequest` construction and SOAP envelope rendering.

use chrono::SecondsFormat;
use quick_xml::escape::escape;
use sfmc_pipeline::{DateWindow, ObjectDefinition};
use std::fmt::Write;

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const PARTNER_API_NS: &str = "http://exacttarget.com/wsdl/partnerAPI";
pub const FUEL_OAUTH_NS: &str = "http://exacttarget.com";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// `SimpleFilterPart` bounding a date property to a window.
#[derive(Clone, Debug, PartialEq)]
pub struct DateFilter {
    pub property: String,
    pub window: DateWindow,
}

/// One SOAP `Retrieve` call.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrieveRequest {
    pub object_type: String,
    pub properties: Vec<String>,
    pub filter: Option<DateFilter>,
    /// `RequestID` of the previous page when continuing a retrieve.
    pub continue_request: Option<String>,
}

impl RetrieveRequest {
    /// First-page request for `object`. The filter is present only when both a
    /// filter field and a window exist.
    pub fn new(object: &ObjectDefinition, window: Option<DateWindow>) -> Self {
        let filter = match (&object.filter_field, window) {
            (Some(property), Some(window)) => Some(DateFilter {
                property: property.clone(),
                window,
            }),
            _ => None,
        };
        Self {
            object_type: object.name.clone(),
            properties: object.properties.clone(),
            filter,
            continue_request: None,
        }
    }

    /// Follow-up request for the next page of a previous retrieve.
    pub fn continuation(object_type: &str, request_id: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            properties: Vec::new(),
            filter: None,
            continue_request: Some(request_id.to_string()),
        }
    }

    /// Full SOAP envelope with `token` in the `fueloauth` header.
    pub fn to_envelope(&self, token: &str) -> String {
        let mut body = String::new();
        if let Some(request_id) = &self.continue_request {
            let _ = write!(body, "<ContinueRequest>{}</ContinueRequest>", escape(request_id));
        }
        let _ = write!(body, "<ObjectType>{}</ObjectType>", escape(&self.object_type));
        for property in &self.properties {
            let _ = write!(body, "<Properties>{}</Properties>", escape(property));
        }
        if let Some(filter) = &self.filter {
            let _ = write!(
                body,
                "<Filter xsi:type=\"SimpleFilterPart\">\
                 <Property>{}</Property>\
                 <SimpleOperator>between</SimpleOperator>\
                 <DateValue>{}</DateValue>\
                 <DateValue>{}</DateValue>\
                 </Filter>",
                escape(&filter.property),
                filter.window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                filter.window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <s:Envelope xmlns:s=\"{env}\" xmlns:xsi=\"{xsi}\">\
             <s:Header><fueloauth xmlns=\"{fuel}\">{token}</fueloauth></s:Header>\
             <s:Body><RetrieveRequestMsg xmlns=\"{partner}\">\
             <RetrieveRequest>{body}</RetrieveRequest>\
             </RetrieveRequestMsg></s:Body>\
             </s:Envelope>",
            env = SOAP_ENV_NS,
            xsi = XSI_NS,
            fuel = FUEL_OAUTH_NS,
            token = escape(token),
            partner = PARTNER_API_NS,
            body = body,
        )
    }
}
