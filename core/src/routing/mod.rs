pub mod matcher;
pub mod parser;
pub mod types;

pub use matcher::MISSING_SEGMENT;
pub use parser::parse_path_pattern;
pub use types::{PathParams, PathPattern, PathSegment, PatternError};
