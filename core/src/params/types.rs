use crate::reflect::{TagMap, TypeInfo};
use std::fmt;
use std::str::FromStr;

/// Where a parameter travels on the wire, from the `in` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Path,
    Query,
    Header,
    Cookie,
    Meta,
    Body,
}

impl Location {
    pub const ALL: [Location; 6] = [
        Location::Path,
        Location::Query,
        Location::Header,
        Location::Cookie,
        Location::Meta,
        Location::Body,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Path => "path",
            Location::Query => "query",
            Location::Header => "header",
            Location::Cookie => "cookie",
            Location::Meta => "meta",
            Location::Body => "body",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLocation(pub String);

impl fmt::Display for UnknownLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown parameter location `{}`", self.0)
    }
}

impl std::error::Error for UnknownLocation {}

impl FromStr for Location {
    type Err = UnknownLocation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(Location::Path),
            "query" => Ok(Location::Query),
            "header" => Ok(Location::Header),
            "cookie" => Ok(Location::Cookie),
            "meta" => Ok(Location::Meta),
            "body" => Ok(Location::Body),
            other => Err(UnknownLocation(other.to_string())),
        }
    }
}

/// A leaf field of a record type.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Display name from the naming tag, or the field identifier.
    pub name: String,
    /// Rust identifier of the field.
    pub ident: &'static str,
    pub location: Option<Location>,
    /// Field-index path from the record root; never empty.
    pub path: Vec<usize>,
    pub ty: TypeInfo,
    pub tags: TagMap,
    pub omitempty: bool,
}

impl Parameter {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key)
    }

    /// Requested codec name from the `mime` tag.
    pub fn mime(&self) -> Option<&str> {
        self.tags.get("mime").filter(|m| !m.is_empty())
    }

    pub fn rule(&self) -> &str {
        self.tags.get("validate").unwrap_or_default()
    }
}
