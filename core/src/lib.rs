//! # COURIER CORE LIBRARY
//!
//! **DECLARATIVE HTTP REQUEST/RESPONSE MARSHALLING**
//!
//! **ARCHITECTURE**: Records describe their own transport. Each field says
//! where it lives (`in`), what it is called (`name`), how it is encoded
//! (`mime`) and which rule it obeys (`validate`). From that metadata the
//! crate builds, once per type, a plan that both encodes outbound requests
//! and decodes plus validates inbound ones.
//!
//! ```
//! use courier::Model;
//!
//! #[derive(Model, Default)]
//! pub struct GetUser {
//!     #[courier(in = "path", name = "id", validate = "@int[1,]")]
//!     pub id: i64,
//!     #[courier(in = "query", name = "fields,omitempty")]
//!     pub fields: Vec<String>,
//! }
//!
//! let req = courier::REQUEST_TRANSFORMER_MGR
//!     .new_request(http::Method::GET, "/users/:id", &GetUser { id: 7, fields: vec![] })
//!     .unwrap();
//! assert_eq!(req.uri(), "/users/7");
//! ```

extern crate self as courier;

pub mod api;
pub mod codec;
pub mod config;
pub mod errors;
pub mod params;
pub mod reflect;
pub mod request;
pub mod response;
pub mod routing;
pub mod rules;
pub mod validation;

pub use courier_derive::Model;
pub use reflect::{Model, PostValidate};

pub use config::TransportConfig;
pub use errors::TransportError;
pub use request::REQUEST_TRANSFORMER_MGR;
pub use response::RESPONSE_WRITER;
