//! # RESPONSE WRITER
//!
//! Turns a [`Reply`] into an `http::Response<Full<Bytes>>`.
//!
//! The body is encoded into a buffer before any header is committed, so a
//! codec failure still becomes a clean error response.

use crate::codec::{BodyWriter, CodecMgr};
use crate::config::TransportConfig;
use crate::errors::{error_codes, TransportError};
use crate::response::types::{Redirect, Reply, ReplyBody};
use crate::validation::StatusError;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use once_cell::sync::Lazy;

pub type HttpResponse = http::Response<Full<Bytes>>;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub static RESPONSE_WRITER: Lazy<ResponseWriter> = Lazy::new(ResponseWriter::default);

pub struct ResponseWriter {
    codecs: CodecMgr,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

/// Status when the reply does not name one: 204 for nil, 201 for POST, else 200.
pub fn fallback_status(method: &Method, nil: bool) -> StatusCode {
    if nil {
        StatusCode::NO_CONTENT
    } else if method == Method::POST {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

fn invalid_header(err: impl std::fmt::Display) -> TransportError {
    TransportError::http(error_codes::INVALID_HEADER, err.to_string())
}

impl ResponseWriter {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            codecs: CodecMgr::new(config),
        }
    }

    pub fn codecs(&self) -> &CodecMgr {
        &self.codecs
    }

    /// Writes `reply` for a request made with `method`.
    pub fn write(&self, method: &Method, reply: Reply) -> Result<HttpResponse, TransportError> {
        if let ReplyBody::Redirect(redirect) = &reply.body {
            return redirect_response(redirect);
        }

        let status = reply
            .status
            .unwrap_or_else(|| fallback_status(method, reply.is_nil()));

        let mut body = BodyWriter::new();
        match &reply.body {
            ReplyBody::Value { value, .. } if value.is_null() => {}
            ReplyBody::Value { value, ty } => {
                let mime = reply.content_type.as_deref().unwrap_or_default();
                let codec = self.codecs.new_codec(ty, mime)?;
                codec.encode_to(&mut body, value)?;
            }
            ReplyBody::Raw(bytes) => body.body.extend_from_slice(bytes),
            ReplyBody::Empty | ReplyBody::Redirect(_) => {}
        }

        let mut headers = HeaderMap::new();
        for (key, values) in reply.meta.iter() {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(invalid_header)?;
            for value in values {
                headers.append(&name, HeaderValue::from_str(value).map_err(invalid_header)?);
            }
        }
        for cookie in &reply.cookies {
            let line = HeaderValue::from_str(&cookie.to_string()).map_err(invalid_header)?;
            headers.append(SET_COOKIE, line);
        }

        // The codec's announcement carries parameters such as the multipart boundary.
        match (body.headers.remove(CONTENT_TYPE), &reply.content_type) {
            (Some(value), _) => {
                headers.insert(CONTENT_TYPE, value);
            }
            (None, Some(content_type)) => {
                let value = HeaderValue::from_str(content_type).map_err(invalid_header)?;
                headers.insert(CONTENT_TYPE, value);
            }
            (None, None) => {}
        }
        if !body.body.is_empty() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.body.len()));
        }

        let mut response = http::Response::new(Full::new(Bytes::from(body.body)));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Writes a handler outcome. Never fails: encode errors become error responses.
    pub fn respond(&self, method: &Method, result: Result<Reply, TransportError>) -> HttpResponse {
        match result.and_then(|reply| self.write(method, reply)) {
            Ok(response) => response,
            Err(err) => {
                if !matches!(err, TransportError::BadRequest(_) | TransportError::Redirect(_)) {
                    log::warn!("replacing response with error: {}", err);
                }
                self.write_error(&err)
            }
        }
    }

    /// `StatusError` keeps its code and JSON body; redirects become 3xx; anything else is 500.
    pub fn write_error(&self, err: &TransportError) -> HttpResponse {
        let status_error = match err {
            TransportError::Redirect(redirect) => {
                if let Ok(response) = redirect_response(redirect) {
                    return response;
                }
                StatusError::new(500, "InternalServerError", "invalid redirect")
            }
            TransportError::BadRequest(status_error) => status_error.clone(),
            TransportError::Http { .. } => {
                let status = err.status_code();
                let key = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Error")
                    .replace(' ', "");
                StatusError::new(status, key, err.to_string())
            }
            _ => StatusError::new(500, "InternalServerError", err.to_string()),
        };
        status_error_response(&status_error)
    }
}

fn redirect_response(redirect: &Redirect) -> Result<HttpResponse, TransportError> {
    let location = HeaderValue::from_str(&redirect.location).map_err(invalid_header)?;
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = redirect.status;
    response.headers_mut().insert(LOCATION, location);
    Ok(response)
}

fn status_error_response(err: &StatusError) -> HttpResponse {
    let body = err.to_json();
    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() =
        StatusCode::from_u16(err.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}
