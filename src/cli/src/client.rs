//! HTTP client for communicating with the Warden API server.

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// API response wrapper matching the server's ApiResponse format.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    /// Present on authorization denials.
    #[serde(default)]
    pub required: Option<Vec<String>>,
    #[serde(default)]
    pub available: Option<Vec<String>>,
}

/// HTTP client for the Warden API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send(self.builder(Method::GET, path)).await?;
        unwrap_envelope(resp).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = self.send(self.builder(Method::POST, path).json(body)).await?;
        unwrap_envelope(resp).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = self.send(self.builder(Method::PUT, path).json(body)).await?;
        unwrap_envelope(resp).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send(self.builder(Method::DELETE, path)).await?;
        unwrap_envelope(resp).await
    }

    /// Perform a raw GET request and return the full JSON value (for health endpoint).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.url(path);
        let resp = self.send(self.builder(Method::GET, path)).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().context("Failed to build request")?;
        let label = format!("{} {}", request.method(), request.url());
        self.client
            .execute(request)
            .await
            .with_context(|| format!("{} failed", label))
    }
}

/// Turn the server envelope into the payload or a readable error.
async fn unwrap_envelope<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let url = resp.url().to_string();
    let text = resp.text().await.unwrap_or_default();

    let api_resp: ApiResponse<T> = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => anyhow::bail!("API error ({}): {}", status, text),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to parse response from {}", url))
        }
    };

    if api_resp.success {
        return api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("API returned success but no data"));
    }

    Err(anyhow::anyhow!(describe_failure(status.as_u16(), &api_resp)))
}

fn describe_failure<T>(status: u16, resp: &ApiResponse<T>) -> String {
    let mut message = format!(
        "API error ({}): {}",
        status,
        resp.error.as_deref().unwrap_or("Unknown error")
    );
    if let Some(code) = &resp.error_code {
        message.push_str(&format!(" [{}]", code));
    }
    if let Some(required) = &resp.required {
        message.push_str(&format!("\n  required:  {}", required.join(", ")));
    }
    if let Some(available) = &resp.available {
        message.push_str(&format!("\n  available: {}", available.join(", ")));
    }
    message
}
