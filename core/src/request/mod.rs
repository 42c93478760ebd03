//! # REQUEST SIDE
//!
//! Building outbound requests from records and decoding received requests
//! back into them.

pub mod parser;
pub mod transformer;
pub mod types;

pub use parser::{parse_cookies, parse_query_string, parse_query_values, render_cookies};
pub use transformer::{
    RequestTransformer, RequestTransformerMgr, TransformedParameter, REQUEST_TRANSFORMER_MGR,
};
pub use types::{Metadata, RequestInfo};
