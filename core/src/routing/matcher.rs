use crate::routing::types::{PathParams, PathPattern, PathSegment, PatternError};

/// Placeholder for a parameter without a value.
pub const MISSING_SEGMENT: &str = "-";

impl PathPattern {
    /// Rebuilds a concrete path; missing or empty values become `-`.
    pub fn stringify(&self, params: &PathParams) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                PathSegment::Literal(text) => path.push_str(text),
                PathSegment::Param(key) => match params.get(key).filter(|v| !v.is_empty()) {
                    Some(value) => path.push_str(&urlencoding::encode(value)),
                    None => path.push_str(MISSING_SEGMENT),
                },
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    /// Matches a concrete path segment by segment and collects parameter values.
    pub fn parse_path(&self, path: &str) -> Result<PathParams, PatternError> {
        let not_match = || PatternError::NotMatch {
            pattern: self.template.clone(),
            path: path.to_string(),
        };

        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return Err(not_match());
        }

        let mut params = PathParams::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                PathSegment::Literal(text) if text == part => {}
                PathSegment::Literal(_) => return Err(not_match()),
                PathSegment::Param(key) => {
                    let value = urlencoding::decode(part).map_err(|_| not_match())?;
                    params.insert(key.as_str(), value.into_owned());
                }
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use crate::routing::{parse_path_pattern, PathParams, PatternError};

    #[test]
    fn test_stringify_fills_missing_with_dash() {
        let pattern = parse_path_pattern("/users/:id/repos/:repo").unwrap();
        let params: PathParams = [("id", "1")].into_iter().collect();
        assert_eq!(pattern.stringify(&params), "/users/1/repos/-");
    }

    #[test]
    fn test_stringify_escapes_values() {
        let pattern = parse_path_pattern("/files/:name").unwrap();
        let params: PathParams = [("name", "a b/c")].into_iter().collect();
        assert_eq!(pattern.stringify(&params), "/files/a%20b%2Fc");
        assert_eq!(
            pattern.parse_path("/files/a%20b%2Fc").unwrap().get("name"),
            Some("a b/c")
        );
    }

    #[test]
    fn test_parse_path() {
        let pattern = parse_path_pattern("/users/:id/repos/:repo").unwrap();
        let params = pattern.parse_path("/users/1/repos/courier/").unwrap();
        assert_eq!(params.get("id"), Some("1"));
        assert_eq!(params.get("repo"), Some("courier"));
    }

    #[test]
    fn test_parse_path_mismatch() {
        let pattern = parse_path_pattern("/users/:id").unwrap();
        assert!(matches!(
            pattern.parse_path("/users/1/extra"),
            Err(PatternError::NotMatch { .. })
        ));
        assert!(pattern.parse_path("/groups/1").is_err());
    }

    #[test]
    fn test_root() {
        let pattern = parse_path_pattern("/").unwrap();
        assert_eq!(pattern.stringify(&PathParams::new()), "/");
        assert!(pattern.parse_path("/").unwrap().is_empty());
    }
}
