//! # RULE GRAMMAR
//!
//! Compact validation DSL: `@name<params>[range]{values}/pattern/?` or
//! `@name ... = 'default'`. Parsing produces a [`Rule`] AST whose
//! `Display` impl is the canonical serialisation.

pub mod parser;
pub mod types;

pub use parser::{parse_rule, RuleError};
pub use types::{Rule, RuleParam, RuleRange};
