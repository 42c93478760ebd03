use std::fmt;

/// Parsed validation rule, e.g. `@int<32>[0,100)?`.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub name: String,
    pub params: Vec<RuleParam>,
    pub range: Option<RuleRange>,
    /// Value matrix; the effective enumeration is the Cartesian join of the rows.
    pub values: Vec<Vec<String>>,
    pub pattern: Option<String>,
    pub optional: bool,
    pub default_value: Option<String>,
    /// Verbatim source of this rule.
    pub raw: String,
}

/// One slot inside `<...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleParam {
    Empty,
    Lit(String),
    Rule(Rule),
}

/// `[min,max]`, `(min,max)` and the mixed forms; `[n]` pins both bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleRange {
    pub start: Option<String>,
    pub end: Option<String>,
    pub exclusive_start: bool,
    pub exclusive_end: bool,
    pub single: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Effective enumeration: every row-tuple of the value matrix concatenated.
    pub fn compute_values(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (i, row) in self.values.iter().enumerate() {
            if i == 0 {
                out = row.clone();
                continue;
            }
            let mut joined = Vec::with_capacity(out.len() * row.len());
            for prefix in &out {
                for suffix in row {
                    joined.push(format!("{}{}", prefix, suffix));
                }
            }
            out = joined;
        }
        out
    }

    pub fn param(&self, index: usize) -> Option<&RuleParam> {
        self.params.get(index)
    }

    /// Literal text of a parameter slot, if it holds one.
    pub fn param_lit(&self, index: usize) -> Option<&str> {
        match self.params.get(index) {
            Some(RuleParam::Lit(lit)) => Some(lit),
            _ => None,
        }
    }
}

/// Equality ignores the verbatim source so re-parsed canonical forms compare equal.
impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.params == other.params
            && self.range == other.range
            && self.values == other.values
            && self.pattern == other.pattern
            && self.optional == other.optional
            && self.default_value == other.default_value
    }
}

impl Eq for Rule {}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;

        if !self.params.is_empty() {
            f.write_str("<")?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", param)?;
            }
            f.write_str(">")?;
        }

        if let Some(range) = &self.range {
            write!(f, "{}", range)?;
        }

        for row in &self.values {
            write!(f, "{{{}}}", row.join(","))?;
        }

        if let Some(pattern) = &self.pattern {
            write!(f, "/{}/", pattern.replace('/', "\\/"))?;
        }

        if self.optional {
            match &self.default_value {
                Some(default) => {
                    let escaped = default.replace('\\', "\\\\").replace('\'', "\\'");
                    write!(f, " = '{}'", escaped)?
                }
                None => f.write_str("?")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for RuleParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleParam::Empty => Ok(()),
            RuleParam::Lit(lit) => f.write_str(lit),
            RuleParam::Rule(rule) => write!(f, "{}", rule),
        }
    }
}

impl fmt::Display for RuleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.exclusive_start { "(" } else { "[" })?;
        if self.single {
            f.write_str(self.start.as_deref().unwrap_or_default())?;
        } else {
            f.write_str(self.start.as_deref().unwrap_or_default())?;
            f.write_str(",")?;
            f.write_str(self.end.as_deref().unwrap_or_default())?;
        }
        f.write_str(if self.exclusive_end { ")" } else { "]" })
    }
}
