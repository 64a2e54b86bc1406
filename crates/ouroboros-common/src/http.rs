//! Shared HTTP vocabulary for the ouroboros transports.
//!
//! Route registration, the response controllers and the exception
//! handlers all speak in terms of these types, so they live outside the
//! pipeline crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request method a route is registered for.
///
/// `All` is the wildcard used by routes that accept every method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    All,
}

impl RequestMethod {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::All => "ALL",
        }
    }

    /// Whether the method creates a resource.
    pub fn is_creation(&self) -> bool {
        matches!(self, Self::Post)
    }

    /// Status code a handler answers with when it declares none.
    pub fn default_status(&self) -> HttpStatus {
        if self.is_creation() {
            HttpStatus::CREATED
        } else {
            HttpStatus::OK
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "ALL" | "*" => Ok(Self::All),
            other => Err(format!("Unknown request method: {}", other)),
        }
    }
}

/// HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    pub const OK: Self = Self(200);
    pub const CREATED: Self = Self(201);
    pub const ACCEPTED: Self = Self(202);
    pub const NO_CONTENT: Self = Self(204);
    pub const MOVED_PERMANENTLY: Self = Self(301);
    pub const FOUND: Self = Self(302);
    pub const SEE_OTHER: Self = Self(303);
    pub const TEMPORARY_REDIRECT: Self = Self(307);
    pub const PERMANENT_REDIRECT: Self = Self(308);
    pub const BAD_REQUEST: Self = Self(400);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const FORBIDDEN: Self = Self(403);
    pub const NOT_FOUND: Self = Self(404);
    pub const UNPROCESSABLE_ENTITY: Self = Self(422);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    pub fn code(&self) -> u16 {
        self.0
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// 3xx
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.0)
    }

    /// 4xx or 5xx
    pub fn is_error(&self) -> bool {
        self.0 >= 400
    }
}

impl Default for HttpStatus {
    fn default() -> Self {
        Self::OK
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for HttpStatus {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<HttpStatus> for u16 {
    fn from(status: HttpStatus) -> Self {
        status.0
    }
}
