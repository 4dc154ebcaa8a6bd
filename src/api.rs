use crate::config::Config;
use crate::error::SearchError;
use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde_json::Value;

pub const SEARCH_JOBS_PATH: &str = "/m/default_search/search/jobs";

/// Method, body and extra headers for a single call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: Vec::new(),
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            headers: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: String,
    client: Client,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, SearchError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        let base_url = config.api_url.trim_end_matches('/').to_string();
        if !base_url.is_empty() && url::Url::parse(&base_url).is_err() {
            warn!("CRIBL_API_URL '{}' is not an absolute URL", base_url);
        }

        Ok(Self {
            base_url,
            token: config.auth_token.clone(),
            client,
        })
    }

    /// Base URL, warning on every call while it is unset.
    pub fn api_url(&self) -> &str {
        if self.base_url.is_empty() {
            warn!("CRIBL_API_URL not configured");
        }
        &self.base_url
    }

    /// Bearer token, warning on every call while it is unset.
    pub fn auth_token(&self) -> &str {
        if self.token.is_empty() {
            warn!("CRIBL_AUTH_TOKEN not configured");
        }
        &self.token
    }

    pub fn search_jobs_url(&self) -> String {
        format!("{}{}", self.api_url(), SEARCH_JOBS_PATH)
    }

    /// Content-Type defaults to JSON and may be overridden by the caller.
    /// Authorization is always the configured token when one is set.
    pub fn build_headers(&self, extra: &[(HeaderName, HeaderValue)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in extra {
            headers.insert(name.clone(), value.clone());
        }

        let token = self.auth_token();
        if !token.is_empty() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!("CRIBL_AUTH_TOKEN is not a valid header value: {}", e),
            }
        }
        headers
    }

    /// Sends `options` to `path`, which is relative to the configured API URL.
    pub async fn fetch(&self, path: &str, options: RequestOptions) -> Result<Response, SearchError> {
        let url = format!("{}{}", self.api_url(), path);
        let headers = self.build_headers(&options.headers);
        let mut request = self
            .client
            .request(options.method, &url)
            .headers(headers);
        if let Some(body) = options.body {
            request = request.body(body.to_string());
        }
        Ok(request.send().await?)
    }
}
