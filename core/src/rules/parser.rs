use crate::rules::types::{Rule, RuleParam, RuleRange};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    /// `prefix` is the input consumed before the failure.
    #[error("RULE SYNTAX ERROR: {message} at {position}: `{prefix}`")]
    Syntax {
        message: String,
        position: usize,
        prefix: String,
    },

    #[error("RULE PATTERN ERROR: /{pattern}/: {message}")]
    Pattern { pattern: String, message: String },
}

/// Parses a complete rule; trailing input is an error.
pub fn parse_rule(source: &str) -> Result<Rule, RuleError> {
    let mut scanner = Scanner::new(source);
    let rule = scanner.rule()?;
    scanner.skip_ws();
    if !scanner.eof() {
        return Err(scanner.error("unexpected trailing input"));
    }
    Ok(rule)
}

impl std::str::FromStr for Rule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_rule(s)
    }
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> RuleError {
        let end = self.pos.min(self.src.len());
        RuleError::Syntax {
            message: message.to_string(),
            position: end,
            prefix: self.src.get(..end).unwrap_or(self.src).to_string(),
        }
    }

    fn expect(&mut self, ch: u8) -> Result<(), RuleError> {
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{}`", ch as char)))
        }
    }

    fn rule(&mut self) -> Result<Rule, RuleError> {
        self.skip_ws();
        let start = self.pos;
        self.expect(b'@')?;
        let mut rule = Rule::new(self.ident()?);

        loop {
            self.skip_ws();
            match self.peek() {
                None | Some(b',' | b'>') => break,
                Some(b'<') => {
                    if !rule.params.is_empty() {
                        return Err(self.error("duplicate parameters"));
                    }
                    rule.params = self.params()?;
                }
                Some(b'[' | b'(') => {
                    if rule.range.is_some() {
                        return Err(self.error("duplicate range"));
                    }
                    rule.range = Some(self.range()?);
                }
                Some(b'{') => rule.values.push(self.values()?),
                Some(b'/') => {
                    if rule.pattern.is_some() {
                        return Err(self.error("duplicate pattern"));
                    }
                    rule.pattern = Some(self.pattern()?);
                }
                Some(b'?') => {
                    self.pos += 1;
                    rule.optional = true;
                }
                Some(b'=') => {
                    self.pos += 1;
                    rule.optional = true;
                    rule.default_value = Some(self.default_literal()?);
                }
                Some(_) => return Err(self.error("unexpected character")),
            }
        }

        rule.raw = self.src[start..self.pos].trim().to_string();
        Ok(rule)
    }

    fn ident(&mut self) -> Result<String, RuleError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'-')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("missing rule name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn params(&mut self) -> Result<Vec<RuleParam>, RuleError> {
        self.expect(b'<')?;
        let mut params = Vec::new();
        loop {
            self.skip_ws();
            let param = match self.peek() {
                None => return Err(self.error("unterminated `<`")),
                Some(b'@') => RuleParam::Rule(self.rule()?),
                Some(_) => {
                    let lit = self.until(&[b',', b'>'], "unterminated `<`")?;
                    if lit.is_empty() {
                        RuleParam::Empty
                    } else {
                        RuleParam::Lit(lit)
                    }
                }
            };
            params.push(param);

            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(params);
                }
                None => return Err(self.error("unterminated `<`")),
                Some(_) => return Err(self.error("unexpected character in parameters")),
            }
        }
    }

    fn range(&mut self) -> Result<RuleRange, RuleError> {
        let exclusive_start = self.peek() == Some(b'(');
        self.pos += 1;
        let body = self.until(&[b']', b')'], "unterminated range")?;
        let exclusive_end = self.peek() == Some(b')');
        self.pos += 1;

        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        let lit = |s: &str| (!s.is_empty()).then(|| s.to_string());
        match parts.as_slice() {
            [single] => {
                if single.is_empty() {
                    return Err(self.error("empty range"));
                }
                Ok(RuleRange {
                    start: lit(single),
                    end: lit(single),
                    exclusive_start,
                    exclusive_end,
                    single: true,
                })
            }
            [start, end] => Ok(RuleRange {
                start: lit(start),
                end: lit(end),
                exclusive_start,
                exclusive_end,
                single: false,
            }),
            _ => Err(self.error("range takes at most two bounds")),
        }
    }

    fn values(&mut self) -> Result<Vec<String>, RuleError> {
        self.expect(b'{')?;
        let body = self.until(&[b'}'], "unterminated `{`")?;
        self.pos += 1;
        if body.is_empty() {
            return Err(self.error("empty value set"));
        }
        Ok(body.split(',').map(|s| s.trim().to_string()).collect())
    }

    fn pattern(&mut self) -> Result<String, RuleError> {
        self.expect(b'/')?;
        let mut pattern = String::new();
        let start = self.pos;
        let mut chunk_start = start;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated pattern")),
                Some(b'\\') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    pattern.push_str(&self.src[chunk_start..self.pos]);
                    pattern.push('/');
                    self.pos += 2;
                    chunk_start = self.pos;
                }
                Some(b'\\') => self.pos += 2,
                Some(b'/') => {
                    pattern.push_str(&self.src[chunk_start..self.pos]);
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        if let Err(err) = Regex::new(&pattern) {
            return Err(RuleError::Pattern {
                pattern,
                message: err.to_string(),
            });
        }
        Ok(pattern)
    }

    fn default_literal(&mut self) -> Result<String, RuleError> {
        self.skip_ws();
        if self.peek() != Some(b'\'') {
            return Ok(self.until_end(&[b',', b'>']).trim().to_string());
        }
        self.pos += 1;
        let mut out = String::new();
        let mut chunk_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated quote")),
                Some(b'\\') if matches!(self.bytes.get(self.pos + 1), Some(b'\'' | b'\\')) => {
                    out.push_str(&self.src[chunk_start..self.pos]);
                    out.push(char::from(self.bytes[self.pos + 1]));
                    self.pos += 2;
                    chunk_start = self.pos;
                }
                Some(b'\'') => {
                    out.push_str(&self.src[chunk_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Reads up to (not including) one of `stops`; end of input is an error.
    fn until(&mut self, stops: &[u8], unterminated: &str) -> Result<String, RuleError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                return Ok(self.src[start..self.pos].trim().to_string());
            }
            self.pos += 1;
        }
        Err(self.error(unterminated))
    }

    /// Reads up to one of `stops` or end of input.
    fn until_end(&mut self, stops: &[u8]) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rule() {
        let rule = parse_rule("@string").unwrap();
        assert_eq!(rule.name, "string");
        assert!(rule.params.is_empty());
        assert!(rule.range.is_none());
        assert!(!rule.optional);
    }

    #[test]
    fn test_parse_params_and_range() {
        let rule = parse_rule("@int<32>[0,100)").unwrap();
        assert_eq!(rule.name, "int");
        assert_eq!(rule.params, vec![RuleParam::Lit("32".into())]);
        let range = rule.range.unwrap();
        assert_eq!(range.start.as_deref(), Some("0"));
        assert_eq!(range.end.as_deref(), Some("100"));
        assert!(!range.exclusive_start);
        assert!(range.exclusive_end);
    }

    #[test]
    fn test_parse_open_range() {
        let rule = parse_rule("@string[2,]").unwrap();
        let range = rule.range.unwrap();
        assert_eq!(range.start.as_deref(), Some("2"));
        assert_eq!(range.end, None);
    }

    #[test]
    fn test_parse_single_range() {
        let rule = parse_rule("@string[6]").unwrap();
        let range = rule.range.as_ref().unwrap();
        assert!(range.single);
        assert_eq!(range.start, range.end);
        assert_eq!(rule.to_string(), "@string[6]");
    }

    #[test]
    fn test_parse_nested_rules() {
        let rule = parse_rule("@slice<@string[1,]>[,10]").unwrap();
        match &rule.params[0] {
            RuleParam::Rule(inner) => {
                assert_eq!(inner.name, "string");
                assert_eq!(inner.range.as_ref().unwrap().start.as_deref(), Some("1"));
            }
            other => panic!("expected nested rule, got {:?}", other),
        }
        assert_eq!(rule.range.unwrap().end.as_deref(), Some("10"));
    }

    #[test]
    fn test_parse_map_rule() {
        let rule = parse_rule("@map<@string,@int>").unwrap();
        assert_eq!(rule.params.len(), 2);
        assert!(matches!(&rule.params[1], RuleParam::Rule(r) if r.name == "int"));
    }

    #[test]
    fn test_empty_param_slots_keep_position() {
        let rule = parse_rule("@map<,@int>").unwrap();
        assert_eq!(rule.params[0], RuleParam::Empty);
        assert!(matches!(&rule.params[1], RuleParam::Rule(_)));
    }

    #[test]
    fn test_value_matrix() {
        let rule = parse_rule("@string{A,B}{1,2}").unwrap();
        assert_eq!(rule.compute_values(), vec!["A1", "A2", "B1", "B2"]);
    }

    #[test]
    fn test_pattern_with_escaped_slash() {
        let rule = parse_rule(r"@string/^a\/b$/").unwrap();
        assert_eq!(rule.pattern.as_deref(), Some("^a/b$"));
        assert_eq!(rule.to_string(), r"@string/^a\/b$/");
    }

    #[test]
    fn test_invalid_pattern() {
        let err = parse_rule("@string/[a-/").unwrap_err();
        assert!(matches!(err, RuleError::Pattern { .. }));
    }

    #[test]
    fn test_optional_and_defaults() {
        let rule = parse_rule("@int?").unwrap();
        assert!(rule.optional);
        assert_eq!(rule.default_value, None);

        let rule = parse_rule("@int = 5").unwrap();
        assert!(rule.optional);
        assert_eq!(rule.default_value.as_deref(), Some("5"));

        let rule = parse_rule(r"@string = 'it\'s'").unwrap();
        assert_eq!(rule.default_value.as_deref(), Some("it's"));
    }

    #[test]
    fn test_nested_default_stops_at_comma() {
        let rule = parse_rule("@map<@string = k,@int = 1>").unwrap();
        match (&rule.params[0], &rule.params[1]) {
            (RuleParam::Rule(key), RuleParam::Rule(elem)) => {
                assert_eq!(key.default_value.as_deref(), Some("k"));
                assert_eq!(elem.default_value.as_deref(), Some("1"));
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors_carry_prefix() {
        for bad in [
            "string",
            "@",
            "@int[1,2",
            "@int{1,2",
            "@string/abc",
            "@string = 'x",
            "@int<1",
            "@int[1,2,3]",
            "@int]",
            "@int?x",
        ] {
            let err = parse_rule(bad).unwrap_err();
            assert!(matches!(err, RuleError::Syntax { .. }), "{}: {:?}", bad, err);
        }

        match parse_rule("@int[1,2").unwrap_err() {
            RuleError::Syntax { prefix, .. } => assert_eq!(prefix, "@int[1,2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_canonical_roundtrip() {
        for source in [
            "@int<32>[0,100)",
            "@string[2,]",
            "@slice<@string[1,]>[,10]",
            "@map<@string,@int>",
            "@struct<json>",
            "@string{A,B}{1,2}",
            "@float<10,2>(1.5,9.25]",
            "@string/^\\d+$/?",
            "@int = '3'",
            "@map<,@int?>",
            r"@string = a\",
            r"@string = 'it\'s \\ here'",
        ] {
            let rule = parse_rule(source).unwrap();
            let canonical = rule.to_string();
            let reparsed = parse_rule(&canonical).unwrap();
            assert_eq!(rule, reparsed, "{} -> {}", source, canonical);
            assert_eq!(reparsed.to_string(), canonical);
        }
    }

    #[test]
    fn test_default_with_trailing_backslash() {
        let rule = parse_rule(r"@string = a\").unwrap();
        assert_eq!(rule.default_value.as_deref(), Some(r"a\"));
        assert_eq!(rule.to_string(), r"@string = 'a\\'");
        let reparsed = parse_rule(&rule.to_string()).unwrap();
        assert_eq!(reparsed.default_value.as_deref(), Some(r"a\"));
    }

    #[test]
    fn test_raw_is_preserved() {
        let rule = parse_rule("  @int[1,2]  ").unwrap();
        assert_eq!(rule.raw, "@int[1,2]");
    }
}
