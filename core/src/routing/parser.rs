use crate::routing::types::{PathPattern, PathSegment, PatternError};
use std::str::FromStr;

/// Parses a template. Parameters are written `:name` or `{name}`.
pub fn parse_path_pattern(template: &str) -> Result<PathPattern, PatternError> {
    let invalid = |reason: String| PatternError::Invalid {
        pattern: template.to_string(),
        reason,
    };

    let mut segments = Vec::new();
    for part in template.split('/').filter(|p| !p.is_empty()) {
        let key = if let Some(key) = part.strip_prefix(':') {
            Some(key)
        } else if part.starts_with('{') && part.ends_with('}') && part.len() >= 2 {
            Some(&part[1..part.len() - 1])
        } else {
            None
        };

        match key {
            Some("") => return Err(invalid(format!("empty parameter name in `{}`", part))),
            Some(key) => {
                if segments
                    .iter()
                    .any(|s| matches!(s, PathSegment::Param(k) if k == key))
                {
                    return Err(invalid(format!("duplicate parameter `{}`", key)));
                }
                segments.push(PathSegment::Param(key.to_string()));
            }
            None => segments.push(PathSegment::Literal(part.to_string())),
        }
    }

    Ok(PathPattern {
        template: template.to_string(),
        segments,
    })
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_path_pattern(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_styles() {
        let pattern = parse_path_pattern("/users/:id/repos/{repo}").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                PathSegment::Literal("users".into()),
                PathSegment::Param("id".into()),
                PathSegment::Literal("repos".into()),
                PathSegment::Param("repo".into()),
            ]
        );
        assert_eq!(pattern.keys().collect::<Vec<_>>(), vec!["id", "repo"]);
    }

    #[test]
    fn test_root_pattern() {
        assert!(parse_path_pattern("/").unwrap().segments().is_empty());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(parse_path_pattern("/users/:").is_err());
        assert!(parse_path_pattern("/a/:id/b/:id").is_err());
        assert!("/users/{}".parse::<PathPattern>().is_err());
    }
}
