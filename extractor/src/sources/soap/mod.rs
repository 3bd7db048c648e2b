//! SOAP `Retrieve` fetcher.
//!
//! ```text
//!   RetrieveRequest ──► envelope (fueloauth header) ──► POST Service.asmx
//!                                                            │
//!        ┌──── ContinueRequest=RequestID ◄── MoreDataAvailable┤
//!        │                                                    ▼
//!        └──────────────────────────────────────────► Results → Record
//! ```

pub mod envelope;
pub mod response;
pub mod transformer;

pub use envelope::{DateFilter, RetrieveRequest};
pub use response::{parse_response, RetrieveResponse, SoapFault, SoapReply};
pub use transformer::to_record;

use crate::ObjectSource;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use response::{STATUS_MORE_DATA, STATUS_OK};
use sfmc_pipeline::{ApiSurface, DateWindow, ObjectDefinition, Record, TokenManager};
use tracing::{debug, info, warn};

/// Attempts per request. A token fault invalidates the SOAP token and
/// retries once.
const MAX_ATTEMPTS: u32 = 2;

pub struct SoapSource {
    http_client: Client,
}

impl SoapSource {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    /// Sends one retrieve call, re-authenticating once on a token fault.
    async fn retrieve(
        &self,
        request: &RetrieveRequest,
        tokens: &mut TokenManager,
    ) -> Result<RetrieveResponse> {
        let soap_url = tokens.endpoints(ApiSurface::Soap)?.soap_url;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = tokens.get_token(ApiSurface::Soap).await?;
            let response = self
                .http_client
                .post(&soap_url)
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .header("SOAPAction", "Retrieve")
                .body(request.to_envelope(&token.value))
                .send()
                .await
                .with_context(|| {
                    format!("Failed to send Retrieve for {}", request.object_type)
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .with_context(|| format!("Failed to read Retrieve response for {}", request.object_type))?;

            // Faults arrive as HTTP 500 with a SOAP body
            let reply = match parse_response(&body) {
                Ok(reply) => reply,
                Err(e) if !status.is_success() => {
                    bail!("SOAP API error: {} ({})", status, e)
                }
                Err(e) => return Err(e),
            };

            match reply {
                SoapReply::Fault(fault) if fault.is_token_expired() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        object = %request.object_type,
                        attempt,
                        "SOAP token rejected, re-authenticating"
                    );
                    tokens.invalidate(ApiSurface::Soap);
                }
                SoapReply::Fault(fault) => return Err(fault.into()),
                SoapReply::Retrieve(response) => return Ok(response),
            }
        }
    }
}

#[async_trait]
impl ObjectSource for SoapSource {
    fn surface(&self) -> ApiSurface {
        ApiSurface::Soap
    }

    async fn fetch(
        &self,
        object: &ObjectDefinition,
        window: Option<DateWindow>,
        tokens: &mut TokenManager,
    ) -> Result<Vec<Record>> {
        let mut request = RetrieveRequest::new(object, window);
        match &request.filter {
            Some(filter) => info!(
                object = %object.name,
                property = %filter.property,
                start = %filter.window.start,
                end = %filter.window.end,
                "Retrieving SOAP object"
            ),
            None => info!(object = %object.name, "Retrieving SOAP object (full load)"),
        }

        let mut records = Vec::new();
        let mut batches = 0;
        loop {
            let response = self.retrieve(&request, tokens).await?;
            batches += 1;

            let status = response.overall_status.as_str();
            if status != STATUS_OK && status != STATUS_MORE_DATA {
                bail!(
                    "Retrieve for {} failed with status '{}'",
                    object.name,
                    response.overall_status
                );
            }

            records.extend(response.results.iter().map(|raw| to_record(object, raw)));
            debug!(
                object = %object.name,
                batch = batches,
                returned = response.results.len(),
                status = %response.overall_status,
                "Retrieved batch"
            );

            match (response.has_more_data(), response.request_id) {
                (true, Some(request_id)) => {
                    request = RetrieveRequest::continuation(&object.name, &request_id);
                }
                (true, None) => {
                    warn!(object = %object.name, "MoreDataAvailable without RequestID, stopping");
                    break;
                }
                (false, _) => break,
            }
        }

        info!(object = %object.name, rows = records.len(), batches, "Retrieved SOAP object");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use sfmc_pipeline::{AuthError, ClientCredentials, CredentialStore};

    fn token_manager(server: &ServerGuard) -> TokenManager {
        let credentials = CredentialStore::new(
            None,
            Some(ClientCredentials {
                client_id: "soap_id".to_string(),
                client_secret: "soap_secret".to_string(),
                subdomain: "mc-test".to_string(),
                account_id: Some("5100".to_string()),
                base_url: Some(server.url()),
            }),
        );
        TokenManager::new(credentials, Client::new())
    }

    async fn mock_token(server: &mut ServerGuard, expect: usize) -> mockito::Mock {
        server
            .mock("POST", "/v2/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "soap_token", "expires_in": 1079}"#)
            .expect(expect)
            .create_async()
            .await
    }

    fn retrieve_body(status: &str, request_id: &str, results: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soap:Body>
    <RetrieveResponseMsg xmlns="http://exacttarget.com/wsdl/partnerAPI">
      <OverallStatus>{}</OverallStatus>
      <RequestID>{}</RequestID>
      {}
    </RetrieveResponseMsg>
  </soap:Body>
</soap:Envelope>"#,
            status, request_id, results
        )
    }

    fn fault_body(message: &str) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
  <soap:Fault><faultcode>soap:Client</faultcode><faultstring>{}</faultstring></soap:Fault>
</soap:Body></soap:Envelope>"#,
            message
        )
    }

    fn sent_result(send_id: &str, key: &str) -> String {
        format!(
            r#"<Results xsi:type="SentEvent"><SendID>{}</SendID><SubscriberKey>{}</SubscriberKey><EventDate>2026-05-19T10:00:00</EventDate></Results>"#,
            send_id, key
        )
    }

    fn sent_events() -> ObjectDefinition {
        ObjectDefinition::soap(
            "SentEvent",
            &["SendID", "SubscriberKey", "EventDate"],
            Some("EventDate"),
        )
    }

    #[tokio::test]
    async fn test_follows_continue_request() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let first = server
            .mock("POST", "/Service.asmx")
            .match_header("soapaction", "Retrieve")
            .match_body(Matcher::Regex("<Properties>SendID</Properties>".into()))
            .with_status(200)
            .with_body(retrieve_body(
                "MoreDataAvailable",
                "req-1",
                &format!("{}{}", sent_result("1", "a"), sent_result("1", "b")),
            ))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/Service.asmx")
            .match_body(Matcher::Regex("<ContinueRequest>req-1</ContinueRequest>".into()))
            .with_status(200)
            .with_body(retrieve_body("OK", "req-1", &sent_result("2", "c")))
            .expect(1)
            .create_async()
            .await;

        let mut tokens = token_manager(&server);
        let records = SoapSource::new(Client::new())
            .fetch(&sent_events(), None, &mut tokens)
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["id"], "2_c_2026-05-19T10:00:00");
        assert_eq!(tokens.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_sends_token_and_filter() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let call = server
            .mock("POST", "/Service.asmx")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("<fueloauth xmlns=\"http://exacttarget.com\">soap_token</fueloauth>".into()),
                Matcher::Regex("<SimpleOperator>between</SimpleOperator>".into()),
            ]))
            .with_status(200)
            .with_body(retrieve_body("OK", "req-1", ""))
            .expect(1)
            .create_async()
            .await;

        let object = sent_events();
        let window = object.date_window(chrono::Utc::now(), 4);
        let mut tokens = token_manager(&server);
        let records = SoapSource::new(Client::new())
            .fetch(&object, window, &mut tokens)
            .await
            .unwrap();

        call.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_token_fault_reauthenticates_once() {
        let mut server = Server::new_async().await;
        let token = mock_token(&mut server, 2).await;
        let expired = server
            .mock("POST", "/Service.asmx")
            .with_status(500)
            .with_body(fault_body("Token Expired"))
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/Service.asmx")
            .with_status(200)
            .with_body(retrieve_body("OK", "req-2", &sent_result("1", "a")))
            .expect(1)
            .create_async()
            .await;

        let mut tokens = token_manager(&server);
        let records = SoapSource::new(Client::new())
            .fetch(&sent_events(), None, &mut tokens)
            .await
            .unwrap();

        token.assert_async().await;
        expired.assert_async().await;
        ok.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(tokens.exchange_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_token_fault_gives_up() {
        let mut server = Server::new_async().await;
        let token = mock_token(&mut server, 2).await;
        let expired = server
            .mock("POST", "/Service.asmx")
            .with_status(500)
            .with_body(fault_body("Token Expired"))
            .expect(2)
            .create_async()
            .await;

        let mut tokens = token_manager(&server);
        let request = RetrieveRequest::new(&sent_events(), None);
        let err = SoapSource::new(Client::new())
            .retrieve(&request, &mut tokens)
            .await
            .unwrap_err();

        token.assert_async().await;
        expired.assert_async().await;
        assert!(err.downcast_ref::<SoapFault>().unwrap().is_token_expired());
    }

    #[tokio::test]
    async fn test_other_fault_is_not_retried() {
        let mut server = Server::new_async().await;
        let token = mock_token(&mut server, 1).await;
        let call = server
            .mock("POST", "/Service.asmx")
            .with_status(500)
            .with_body(fault_body("Unable to retrieve: unknown property Foo"))
            .expect(1)
            .create_async()
            .await;

        let mut tokens = token_manager(&server);
        let err = SoapSource::new(Client::new())
            .fetch(&sent_events(), None, &mut tokens)
            .await
            .unwrap_err();

        token.assert_async().await;
        call.assert_async().await;
        let fault = err.downcast_ref::<SoapFault>().unwrap();
        assert!(fault.message.contains("unknown property Foo"));
    }

    #[tokio::test]
    async fn test_error_status_is_api_error() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let _call = server
            .mock("POST", "/Service.asmx")
            .with_status(200)
            .with_body(retrieve_body("Error: The Request Property(s) EventDate do not match", "req-3", ""))
            .create_async()
            .await;

        let mut tokens = token_manager(&server);
        let err = SoapSource::new(Client::new())
            .fetch(&sent_events(), None, &mut tokens)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed with status 'Error: The Request Property(s)"));
    }

    #[tokio::test]
    async fn test_non_xml_error_page() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let _call = server
            .mock("POST", "/Service.asmx")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let mut tokens = token_manager(&server);
        let err = SoapSource::new(Client::new())
            .fetch(&sent_events(), None, &mut tokens)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SOAP API error: 503"));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let mut tokens = TokenManager::new(CredentialStore::new(None, None), Client::new());
        let err = SoapSource::new(Client::new())
            .fetch(&sent_events(), None, &mut tokens)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<AuthError>().is_some());
    }
}
