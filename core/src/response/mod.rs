pub mod serializer;
pub mod types;

pub use serializer::{fallback_status, HttpResponse, ResponseWriter, RESPONSE_WRITER};
pub use types::{Cookie, Redirect, Reply, ReplyBody, SameSite};
