use std::{any::Any, fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum SiteError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Run lock error: {0}")]
    Lock(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("External process error: {0}")]
    Process(String),
    #[error("Remote repository API error ({status}): {message}")]
    Remote { status: u16, message: String },
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Catalog validation failed: {0}")]
    Validation(String),
}

impl SiteError {
    /// First line of the rendered error, for single-line log and health entries.
    pub fn headline(&self) -> String {
        self.to_string()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Converts a caught panic payload into a process error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> SiteError {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        SiteError::Process(format!("panicked: {message}"))
    }
}

impl From<StripPrefixError> for SiteError {
    fn from(src: StripPrefixError) -> SiteError {
        SiteError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for SiteError {
    fn from(src: toml::de::Error) -> SiteError {
        SiteError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for SiteError {
    fn from(src: toml::ser::Error) -> SiteError {
        SiteError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for SiteError {
    fn from(src: JsonError) -> SiteError {
        SiteError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<serde_yaml::Error> for SiteError {
    fn from(src: serde_yaml::Error) -> SiteError {
        SiteError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<base64::DecodeError> for SiteError {
    fn from(src: base64::DecodeError) -> SiteError {
        SiteError::Serialization(format!("Base64 decoding failed: {src}"))
    }
}

impl From<std::string::FromUtf8Error> for SiteError {
    fn from(src: std::string::FromUtf8Error) -> SiteError {
        SiteError::Serialization(format!("Invalid UTF-8 content: {src}"))
    }
}

impl From<UrlParseError> for SiteError {
    fn from(src: UrlParseError) -> SiteError {
        SiteError::Serialization(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for SiteError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => SiteError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => SiteError::PermissionDenied,
            _ => SiteError::Io(format!("IOError: {x}")),
        }
    }
}

impl From<fmt::Error> for SiteError {
    fn from(x: fmt::Error) -> Self {
        SiteError::Custom(format!("{x}"))
    }
}

impl From<RegexError> for SiteError {
    fn from(x: RegexError) -> Self {
        SiteError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<reqwest::Error> for SiteError {
    fn from(x: reqwest::Error) -> Self {
        if x.is_timeout() {
            SiteError::Network(format!("request timed out: {x}"))
        } else if let Some(status) = x.status() {
            SiteError::Network(format!("HTTP {status}: {x}"))
        } else {
            SiteError::Network(format!("{x}"))
        }
    }
}

impl From<tokio::time::error::Elapsed> for SiteError {
    fn from(x: tokio::time::error::Elapsed) -> Self {
        SiteError::Process(format!("timed out: {x}"))
    }
}
