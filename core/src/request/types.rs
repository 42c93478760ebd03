use crate::config::TransportConfig;
use crate::errors::{error_codes, TransportError};
use crate::params::Location;
use crate::request::parser::{parse_cookies, parse_query_values};
use crate::routing::PathParams;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use std::collections::{BTreeMap, HashMap};

/// Out-of-band key/values an operator attaches to a request (`in:"meta"`)
/// or a response envelope (written as headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.entries.insert(key.into(), values);
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A received request, buffered and indexed for parameter lookup.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    path_params: PathParams,
    query: HashMap<String, Vec<String>>,
    cookies: Vec<(String, String)>,
    received_at: DateTime<Utc>,
}

impl RequestInfo {
    /// Path values come from a [`PathParams`] extension when the router left one.
    pub fn new(parts: http::request::Parts, body: Bytes) -> Self {
        let path_params = parts
            .extensions
            .get::<PathParams>()
            .cloned()
            .unwrap_or_default();
        let query = parse_query_values(parts.uri.query().unwrap_or_default());
        let cookies = parse_cookies(&parts.headers);
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            path_params,
            query,
            cookies,
            received_at: Utc::now(),
        }
    }

    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body)
    }

    /// Collects a streaming body up to `config.max_body_size`.
    pub async fn from_request<B>(
        req: http::Request<B>,
        config: &TransportConfig,
    ) -> Result<Self, TransportError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let collected = Limited::new(body, config.max_body_size)
            .collect()
            .await
            .map_err(|err| {
                if err.downcast_ref::<LengthLimitError>().is_some() {
                    TransportError::http(
                        error_codes::BODY_TOO_LARGE,
                        format!("body exceeds {} bytes", config.max_body_size),
                    )
                } else {
                    TransportError::http(error_codes::BODY_READ, err.to_string())
                }
            })?;
        Ok(Self::new(parts, collected.to_bytes()))
    }

    pub fn with_path_params(mut self, params: PathParams) -> Self {
        self.path_params = params;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Raw values of parameter `name` at `location`. Body and meta have none here.
    pub fn value(&self, location: Location, name: &str) -> Vec<String> {
        match location {
            Location::Path => self
                .path_params
                .get(name)
                .map(|v| vec![v.to_string()])
                .unwrap_or_default(),
            Location::Query => self.query.get(name).cloned().unwrap_or_default(),
            Location::Header => self
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_string)
                .collect(),
            Location::Cookie => self
                .cookies
                .iter()
                .filter(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .collect(),
            Location::Meta | Location::Body => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn request() -> http::Request<Bytes> {
        let mut req = http::Request::builder()
            .method(Method::GET)
            .uri("/users/1?slice=1&slice=2")
            .header("X-Token", "t")
            .header("Cookie", "a=xxx; slice=1; slice=2")
            .body(Bytes::new())
            .unwrap();
        req.extensions_mut()
            .insert([("id", "1")].into_iter().collect::<PathParams>());
        req
    }

    #[test]
    fn test_values_by_location() {
        let info = RequestInfo::from_http(request());
        assert_eq!(info.value(Location::Path, "id"), vec!["1"]);
        assert_eq!(info.value(Location::Query, "slice"), vec!["1", "2"]);
        assert_eq!(info.value(Location::Header, "x-token"), vec!["t"]);
        assert_eq!(info.value(Location::Cookie, "slice"), vec!["1", "2"]);
        assert!(info.value(Location::Query, "missing").is_empty());
        assert!(info.value(Location::Body, "anything").is_empty());
    }

    #[test]
    fn test_metadata() {
        let mut meta = Metadata::new();
        meta.add("trace", "a");
        meta.add("trace", "b");
        assert_eq!(meta.get("trace"), ["a".to_string(), "b".to_string()]);
        assert!(meta.get("missing").is_empty());
    }

    #[tokio::test]
    async fn test_from_request_collects_body() {
        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();
        let info = RequestInfo::from_request(req, &TransportConfig::default())
            .await
            .unwrap();
        assert_eq!(info.body().as_ref(), b"payload");
    }

    #[tokio::test]
    async fn test_from_request_enforces_limit() {
        let req = http::Request::builder()
            .uri("/")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();
        let config = TransportConfig::default().with_max_body_size(3);
        let err = RequestInfo::from_request(req, &config).await.unwrap_err();
        assert_eq!(err.status_code(), 413);
    }
}
