//! Outbound HTTP for the global `fetch`.
//!
//! Requests run on a private current-thread tokio runtime and the response
//! is fully buffered before being handed back, so the script only ever sees
//! a settled snapshot. Bodies travel base64-encoded to stay binary-safe.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

/// A buffered snapshot of a completed outbound response.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDone {
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase.
    pub status_text: String,
    /// Whether the status is in `[200, 300)`.
    pub ok: bool,
    /// Response headers as `(name, value)` pairs.
    pub headers: Vec<(String, String)>,
    /// Body bytes, base64-encoded.
    pub body_b64: String,
    /// Final URL after redirects.
    pub url: String,
}

/// Parameters of an outbound request, as shaped by the prelude.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    /// Absolute request URL.
    pub url: String,
    /// HTTP method; defaults to GET.
    #[serde(default)]
    pub method: Option<String>,
    /// Request headers as `(name, value)` pairs.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Request body, base64-encoded.
    #[serde(default)]
    pub body_b64: Option<String>,
}

/// Blocking HTTP client wrapper owning its async runtime.
pub struct HttpClient {
    runtime: tokio::runtime::Runtime,
    client: Client,
}

impl HttpClient {
    /// Build the client; fails if the tokio runtime cannot start.
    pub fn new() -> Result<Self, String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| format!("failed to start http runtime: {error}"))?;
        Ok(Self {
            runtime,
            client: Client::new(),
        })
    }

    /// Perform one request and buffer the whole response.
    pub fn fetch(&self, params: &FetchParams) -> Result<FetchDone, String> {
        let method_name = params.method.as_deref().unwrap_or("GET").to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes()).unwrap_or(Method::GET);
        self.runtime.block_on(async {
            let mut request = self.client.request(method, &params.url);
            for (name, value) in &params.headers {
                request = request.header(name, value);
            }
            if let Some(encoded) = &params.body_b64 {
                if !encoded.is_empty() {
                    let bytes = BASE64_STANDARD
                        .decode(encoded)
                        .map_err(|_| String::from("malformed request body"))?;
                    request = request.body(bytes);
                }
            }
            let response = request
                .send()
                .await
                .map_err(|error| format!("network error: {error}"))?;
            let status = response.status();
            let url = response.url().to_string();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|text| (name.to_string(), text.to_owned()))
                })
                .collect();
            let bytes = response
                .bytes()
                .await
                .map_err(|error| format!("failed to read response body: {error}"))?;
            Ok(FetchDone {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_owned(),
                ok: status.is_success(),
                headers,
                body_b64: BASE64_STANDARD.encode(&bytes),
                url,
            })
        })
    }
}
