use apigee_discovery::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::warn;

use super::config::USER_AGENT;
use crate::poller::{PageFetcher, PageRequest};

/// HTTP transport for the Apigee listing endpoints.
///
/// Authenticates every request with the caller's bearer token.
#[derive(Clone)]
pub struct ApigeeClient {
    http_client: Client,
}

impl ApigeeClient {
    pub fn new() -> Self {
        let http_client = match Client::builder().user_agent(USER_AGENT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to build HTTP client, using defaults without user agent");
                Client::new()
            }
        };
        Self { http_client }
    }
}

impl Default for ApigeeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for ApigeeClient {
    async fn fetch_page(
        &self,
        token: &str,
        endpoint: &str,
        request: &PageRequest,
    ) -> SyncResult<String> {
        let query = serde_urlencoded::to_string(request)
            .map_err(|e| SyncError::TransientFetchFailure(format!("bad page query: {}", e)))?;
        let url = format!("{}?{}", endpoint, query);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        check_response_status(&response)?;
        Ok(response.text().await?)
    }
}

fn check_response_status(response: &reqwest::Response) -> SyncResult<()> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::AuthFailure(format!(
            "{} rejected the access token ({})",
            response.url().path(),
            response.status()
        ))),
        s if !s.is_success() => Err(SyncError::TransientFetchFailure(format!(
            "{} returned {}",
            response.url().path(),
            s
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn first_page() -> PageRequest {
        PageRequest {
            count: 25,
            start_key: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_page_sends_query_and_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/organizations/acme/apis")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("count".into(), "25".into()),
                Matcher::UrlEncoded("startKey".into(), "orders".into()),
            ]))
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":["payments"]}"#)
            .create_async()
            .await;

        let client = ApigeeClient::new();
        let endpoint = format!("{}/v1/organizations/acme/apis", server.url());
        let request = PageRequest {
            count: 25,
            start_key: Some("orders".to_string()),
        };
        let body = client.fetch_page("tok-1", &endpoint, &request).await.unwrap();

        assert_eq!(body, r#"{"data":["payments"]}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_is_auth_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/organizations/acme/apis")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message":"Invalid access token"}"#)
            .create_async()
            .await;

        let client = ApigeeClient::new();
        let endpoint = format!("{}/v1/organizations/acme/apis", server.url());
        let err = client
            .fetch_page("expired", &endpoint, &first_page())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AuthFailure(_)));
    }

    #[tokio::test]
    async fn test_500_is_transient() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/organizations/acme/sites")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = ApigeeClient::new();
        let endpoint = format!("{}/organizations/acme/sites", server.url());
        let err = client
            .fetch_page("tok", &endpoint, &first_page())
            .await
            .unwrap_err();
        match err {
            SyncError::TransientFetchFailure(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let client = ApigeeClient::new();
        let err = client
            .fetch_page("tok", "http://127.0.0.1:9/organizations/acme/apis", &first_page())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TransientFetchFailure(_)));
    }

    #[tokio::test]
    async fn test_requests_carry_user_agent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/organizations/acme/apis")
            .match_query(Matcher::Any)
            .match_header("user-agent", USER_AGENT)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let endpoint = format!("{}/v1/organizations/acme/apis", server.url());
        ApigeeClient::new()
            .fetch_page("tok", &endpoint, &first_page())
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
