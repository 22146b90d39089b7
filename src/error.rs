//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Failures of the schema-build collaborator.
#[derive(Error, Debug)]
pub enum SchemaBuildError {
    /// The configured policy directory does not exist. Registration degrades instead of failing.
    #[error("policy path not found: {}", .0.display())]
    PolicyPathNotFound(PathBuf),
    #[error("schema read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing reference: schema '{schema}' field '{field}' refers to unknown schema '{target}'")]
    MissingReference {
        schema: String,
        field: String,
        target: String,
    },
    #[error("invalid pattern {pattern:?} on schema '{schema}' field '{field}': {message}")]
    InvalidPattern {
        schema: String,
        field: String,
        pattern: String,
        message: String,
    },
    #[error("duplicate schema: {0}")]
    DuplicateSchema(String),
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("unsupported connection uri: {0}")]
    UnsupportedScheme(String),
    #[error("connect {uri}: {message}")]
    Connect { uri: String, message: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("document {id} not found in {collection}")]
    DocumentNotFound { id: String, collection: String },
    #[error("document {id} already exists in {collection}")]
    DocumentExists { id: String, collection: String },
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No database connections found")]
    NoConnections,
    #[error("Connection '{0}' does not exist")]
    ConnectionNotFound(String),
    #[error("schema not found: {0}")]
    SchemaNotFound(String),
    #[error("model '{schema}' is bound to connection '{connection}' and cannot be rebound")]
    NotRebindable { schema: String, connection: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("request context missing; was the plugin registered on this host?")]
    MissingContext,
}

/// Registration-time failures. Everything except the degraded schema build aborts `register`.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin '{0}' is already registered on this host")]
    AlreadyRegistered(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("schema build: {0}")]
    SchemaBuild(#[from] SchemaBuildError),
    #[error("policy load {path}: {message}")]
    PolicyLoad { path: PathBuf, message: String },
    #[error("current directory: {0}")]
    CurrentDir(std::io::Error),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    /// HTTP status and stable machine-readable code.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NoConnections | AppError::ConnectionNotFound(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "connection_error")
            }
            AppError::SchemaNotFound(_) => (StatusCode::NOT_FOUND, "schema_not_found"),
            AppError::NotRebindable { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "model_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Driver(e) => match e {
                DriverError::DocumentNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                DriverError::DocumentExists { .. } => (StatusCode::CONFLICT, "conflict"),
                DriverError::InvalidDocument(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::MissingContext => (StatusCode::INTERNAL_SERVER_ERROR, "context_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
