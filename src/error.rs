//! Error types for clustermesh

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A management command referenced a jvmRoute with no live node.
    #[error("no live node for jvmRoute {0}")]
    NodeUnknown(String),

    /// addNode was asked to replace a different URI under an existing
    /// jvmRoute while the existing node is still healthy.
    #[error("node {jvm_route} already registered at {existing_uri}, healthy")]
    NodeConflict {
        jvm_route: String,
        existing_uri: String,
    },

    /// Elector found no eligible candidate in the given context set.
    #[error("no available node for request")]
    NoAvailableNode,

    /// Sticky route unreachable and stickySessionForce=true.
    #[error("sticky session target unreachable, force disallows failover")]
    StickySessionLost,

    /// A health probe failed. Not surfaced outside the scheduler; present
    /// here only so the admin API can report the last probe outcome.
    #[error("health probe failed for {0}")]
    HealthProbeFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NodeUnknown(_) => 404,
            Error::NodeConflict { .. } => 409,
            Error::NoAvailableNode => 503,
            Error::StickySessionLost => 503,
            Error::HealthProbeFailure(_) => 502,
            Error::Config(_) => 400,
            Error::Json(_) | Error::Yaml(_) => 400,
            _ => 500,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
