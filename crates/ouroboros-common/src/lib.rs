//! Common types shared across the ouroboros crates.

pub mod http;

pub use http::{HttpStatus, RequestMethod};
