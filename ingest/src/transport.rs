//! Authenticated HTTP transport.
//!
//! The host owns token acquisition and refresh; this module only turns an
//! access token into a `reqwest::Client` that sends it on every request.

use crate::error::{IngestError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;

/// Build a client that authenticates every request with `access_token`.
pub fn authenticated_client(access_token: &str, user_agent: &str) -> Result<Client> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", access_token))
        .map_err(|_| IngestError::Configuration("access token is not a valid header value".into()))?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);

    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .build()
        .map_err(|e| IngestError::Transport(format!("building HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_header("authorization", "Bearer secret-token")
            .match_header("user-agent", "timeline-test/1.0")
            .with_status(200)
            .create_async()
            .await;

        let client = authenticated_client("secret-token", "timeline-test/1.0").unwrap();
        let response = client
            .get(format!("{}/ping", server.url()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        mock.assert_async().await;
    }

    #[test]
    fn test_rejects_token_with_newline() {
        let err = authenticated_client("bad\ntoken", "timeline-test/1.0").unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }
}
