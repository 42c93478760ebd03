use crate::reflect::{Model, TypeInfo, Value};
use crate::request::Metadata;
use chrono::{DateTime, Utc};
use http::StatusCode;
use hyper::body::Bytes;
use std::fmt;

/// A 3xx answer: status plus target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
}

impl Redirect {
    pub fn new(status: StatusCode, location: impl Into<String>) -> Self {
        Self {
            status,
            location: location.into(),
        }
    }

    /// `302 Found`.
    pub fn found(location: impl Into<String>) -> Self {
        Self::new(StatusCode::FOUND, location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A response cookie, rendered as one `Set-Cookie` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.max(0))?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={}", same_site.as_str())?;
        }
        Ok(())
    }
}

/// What the handler produced.
#[derive(Debug, Clone)]
pub enum ReplyBody {
    /// Nothing to write.
    Empty,
    /// A record serialised through a codec.
    Value { value: Value, ty: TypeInfo },
    /// Bytes copied as-is.
    Raw(Bytes),
    Redirect(Redirect),
}

/// A handler's result plus the envelope around it: status, metadata headers,
/// cookies and content type.
#[derive(Debug, Clone)]
pub struct Reply {
    pub body: ReplyBody,
    pub status: Option<StatusCode>,
    pub meta: Metadata,
    pub cookies: Vec<Cookie>,
    pub content_type: Option<String>,
}

impl Reply {
    fn with_body(body: ReplyBody) -> Self {
        Self {
            body,
            status: None,
            meta: Metadata::new(),
            cookies: Vec::new(),
            content_type: None,
        }
    }

    pub fn empty() -> Self {
        Self::with_body(ReplyBody::Empty)
    }

    pub fn model<T: Model>(value: &T) -> Self {
        Self::value(value.to_value(), T::type_info())
    }

    pub fn value(value: Value, ty: TypeInfo) -> Self {
        Self::with_body(ReplyBody::Value { value, ty })
    }

    pub fn raw(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self::with_body(ReplyBody::Raw(bytes.into())).with_content_type(content_type)
    }

    pub fn redirect(redirect: Redirect) -> Self {
        Self::with_body(ReplyBody::Redirect(redirect))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// True when there is no value to write (`Empty`, or a `Null` record such as `None`).
    pub fn is_nil(&self) -> bool {
        match &self.body {
            ReplyBody::Empty => true,
            ReplyBody::Value { value, .. } => value.is_null(),
            _ => false,
        }
    }
}
