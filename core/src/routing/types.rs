use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Literal(String),
    Param(String),
}

/// A compiled path template such as `/users/:id/repos/:repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    pub(crate) template: String,
    pub(crate) segments: Vec<PathSegment>,
}

impl PathPattern {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Parameter names in template order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Param(key) => Some(key.as_str()),
            PathSegment::Literal(_) => None,
        })
    }
}

/// Path parameter values, ordered as inserted.
///
/// Outbound requests carry them in `http::Extensions`; inbound
/// [`RequestInfo`](crate::request::RequestInfo) reads them back from there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an existing value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = PathParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("path {path} does not match pattern {pattern}")]
    NotMatch { pattern: String, path: String },

    #[error("invalid path pattern {pattern}: {reason}")]
    Invalid { pattern: String, reason: String },
}
