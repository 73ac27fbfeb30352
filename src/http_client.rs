use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// GET a JSON document. Non-2xx responses become `AppError::UpstreamStatus`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> AppResult<T> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_status(status, &body));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
    }
}

/// Non-2xx response as an error, keeping the first 200 characters of the body.
pub(crate) fn upstream_status(status: u16, body: &str) -> AppError {
    AppError::UpstreamStatus {
        status,
        body: truncate(body, 200),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
