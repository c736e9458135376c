//! Client access token negotiation with the message bus.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use relay_core::transport::TokenSource;

#[derive(Deserialize)]
struct NegotiateResponse {
    url: String,
}

/// Fetches a fresh client access URL from the bus negotiate endpoint.
/// Credentials are short-lived, so nothing is cached: every connect
/// attempt performs a new negotiation.
pub struct NegotiateClient {
    http: reqwest::Client,
    endpoint: String,
    hub: String,
}

impl NegotiateClient {
    pub fn new(http: reqwest::Client, endpoint: String, hub: String) -> Self {
        Self {
            http,
            endpoint,
            hub,
        }
    }
}

#[async_trait]
impl TokenSource for NegotiateClient {
    async fn client_access_url(&self) -> anyhow::Result<String> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("hub", self.hub.as_str())])
            .send()
            .await
            .context("negotiate request failed")?
            .error_for_status()
            .context("negotiate endpoint returned an error status")?;

        let body: NegotiateResponse = response
            .json()
            .await
            .context("negotiate response was not the expected JSON")?;
        Ok(body.url)
    }
}
