//! Primitives shared by the Prism crates

mod auth;
mod context;
mod error;

pub use auth::{AuthStore, Credential};
pub use context::{REQUEST_ID_HEADER, RequestContext};
pub use error::HttpError;
