//! Error types for coachflow agents.
//!
//! The taxonomy has two families:
//!
//! - [`ApiError`]: transport-level failures that carry a fixed HTTP status.
//! - [`AgentError`]: pipeline failures classified by [`ErrorCode`], which
//!   drives the HTTP status through a fixed table and keeps a link to the
//!   error that caused it.
//!
//! Both fold into [`CoachError`], and [`format_error_response`] turns any
//! `CoachError` into a client-safe [`ErrorResponse`].

use crate::config::Environment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type CoachResult<T> = Result<T, CoachError>;

/// Message substituted for non-operational errors in production.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Classification of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Bad input shape or content.
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// A stage's internal logic failed.
    #[serde(rename = "PROCESSING_ERROR")]
    Processing,
    /// The completion API or another upstream dependency failed.
    #[serde(rename = "EXTERNAL_SERVICE_ERROR")]
    ExternalService,
    /// A requested entity is missing.
    #[serde(rename = "RESOURCE_ERROR")]
    Resource,
    /// The long-term memory store failed.
    #[serde(rename = "MEMORY_SYSTEM_ERROR")]
    MemorySystem,
    /// A required collaborator or setting is missing.
    #[serde(rename = "CONFIGURATION_ERROR")]
    Configuration,
    /// An optimistic-lock or version precondition failed.
    #[serde(rename = "CONCURRENCY_ERROR")]
    Concurrency,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Processing => "PROCESSING_ERROR",
            Self::ExternalService => "EXTERNAL_SERVICE_ERROR",
            Self::Resource => "RESOURCE_ERROR",
            Self::MemorySystem => "MEMORY_SYSTEM_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Concurrency => "CONCURRENCY_ERROR",
        }
    }

    /// Returns the HTTP status associated with the code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Resource => 404,
            Self::Concurrency => 409,
            Self::ExternalService => 502,
            Self::Processing | Self::MemorySystem | Self::Configuration => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn capture_stack(label: &str, message: &str) -> String {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => format!("{label}: {message}\n{backtrace}"),
        _ => format!("{label}: {message}"),
    }
}

/// A pipeline failure with a code, structured details and an optional cause.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AgentError {
    /// Human-readable message.
    pub message: String,
    /// Failure classification.
    pub code: ErrorCode,
    /// Arbitrary structured context (e.g. `step`).
    pub details: Map<String, Value>,
    /// The error that caused this one.
    #[source]
    pub original_error: Option<Box<CoachError>>,
    /// Expected/recoverable (true) versus programmer defect (false).
    pub is_operational: bool,
    stack: String,
}

impl AgentError {
    /// Creates a new operational agent error.
    #[must_use]
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        let message = message.into();
        let stack = capture_stack(&format!("AgentError[{code}]"), &message);
        Self {
            message,
            code,
            details: Map::new(),
            original_error: None,
            is_operational: true,
            stack,
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::Validation)
    }

    /// Creates a processing error.
    #[must_use]
    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::Processing)
    }

    /// Creates an external-service error.
    #[must_use]
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::ExternalService)
    }

    /// Creates a resource (not found) error.
    #[must_use]
    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::Resource)
    }

    /// Creates a memory-system error.
    #[must_use]
    pub fn memory_system(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::MemorySystem)
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::Configuration)
    }

    /// Creates a concurrency error.
    #[must_use]
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::Concurrency)
    }

    /// Replaces the details map.
    #[must_use]
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    /// Adds a single detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Tags the error with the pipeline step it failed in.
    #[must_use]
    pub fn with_step(self, step: &str) -> Self {
        self.with_detail("step", step)
    }

    /// Attaches the causing error and appends its stack to this one.
    #[must_use]
    pub fn caused_by(mut self, cause: impl Into<CoachError>) -> Self {
        let cause = cause.into();
        self.stack = format!("{}\nCaused by: {}", self.stack, cause.stack());
        self.original_error = Some(Box::new(cause));
        self
    }

    /// Marks the error as a programmer defect.
    #[must_use]
    pub fn non_operational(mut self) -> Self {
        self.is_operational = false;
        self
    }

    /// Returns the HTTP status for this error's code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }

    /// Returns the `step` detail, if present.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        self.details.get("step").and_then(Value::as_str)
    }

    /// Returns the causing error, if any.
    #[must_use]
    pub fn original_error(&self) -> Option<&CoachError> {
        self.original_error.as_deref()
    }

    /// Returns the captured stack text, including any causes.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }
}

/// Category of a transport-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Caller-chosen status code.
    Generic,
    /// 400.
    Validation,
    /// 401.
    Authentication,
    /// 403.
    Authorization,
    /// 404.
    NotFound,
    /// 409.
    Conflict,
    /// 409, raised on version mismatches.
    ConcurrencyConflict,
    /// 429.
    RateLimit,
    /// 500.
    Database,
    /// 500.
    Internal,
    /// 503.
    ServiceUnavailable,
}

impl ApiErrorKind {
    /// Returns the status code fixed for this kind.
    #[must_use]
    pub fn default_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Conflict | Self::ConcurrencyConflict => 409,
            Self::RateLimit => 429,
            Self::Generic | Self::Database | Self::Internal => 500,
            Self::ServiceUnavailable => 503,
        }
    }

    /// Returns the wire error code, if the kind has one.
    #[must_use]
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Generic => None,
            Self::Validation => Some("VALIDATION_ERROR"),
            Self::Authentication => Some("AUTHENTICATION_ERROR"),
            Self::Authorization => Some("AUTHORIZATION_ERROR"),
            Self::NotFound => Some("NOT_FOUND"),
            Self::Conflict => Some("CONFLICT"),
            Self::ConcurrencyConflict => Some("CONCURRENCY_CONFLICT"),
            Self::RateLimit => Some("RATE_LIMIT_EXCEEDED"),
            Self::Database => Some("DATABASE_ERROR"),
            Self::Internal => Some("INTERNAL_ERROR"),
            Self::ServiceUnavailable => Some("SERVICE_UNAVAILABLE"),
        }
    }
}

/// A transport-level error with an HTTP status.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Human-readable message.
    pub message: String,
    /// HTTP status code.
    pub status_code: u16,
    /// Error category.
    pub kind: ApiErrorKind,
    /// Optional structured context.
    pub details: Option<Value>,
    /// Expected/recoverable (true) versus programmer defect (false).
    pub is_operational: bool,
    stack: String,
}

impl ApiError {
    /// Creates a generic API error with an explicit status.
    #[must_use]
    pub fn new(message: impl Into<String>, status_code: u16) -> Self {
        let message = message.into();
        let stack = capture_stack(&format!("ApiError[{status_code}]"), &message);
        Self {
            message,
            status_code,
            kind: ApiErrorKind::Generic,
            details: None,
            is_operational: true,
            stack,
        }
    }

    /// Creates an API error of the given kind with its fixed status.
    #[must_use]
    pub fn of_kind(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        let mut error = Self::new(message, kind.default_status());
        error.kind = kind;
        error
    }

    /// 400 validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::Validation, message)
    }

    /// 401 authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::Authentication, message)
    }

    /// 403 authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::Authorization, message)
    }

    /// 404 not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::NotFound, message)
    }

    /// 409 conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::Conflict, message)
    }

    /// 409 concurrency-conflict error.
    #[must_use]
    pub fn concurrency_conflict(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::ConcurrencyConflict, message)
    }

    /// 429 rate-limit error.
    #[must_use]
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::RateLimit, message)
    }

    /// 500 database error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::Database, message)
    }

    /// 500 internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::Internal, message)
    }

    /// 503 service-unavailable error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::of_kind(ApiErrorKind::ServiceUnavailable, message)
    }

    /// Sets the details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Marks the error as a programmer defect.
    #[must_use]
    pub fn non_operational(mut self) -> Self {
        self.is_operational = false;
        self
    }

    /// Returns the captured stack text.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }
}

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum CoachError {
    /// A transport-level error.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A pipeline error.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// An unclassified failure; always treated as non-operational.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoachError {
    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns the agent error code, if this is an agent error.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Agent(err) => Some(err.code),
            Self::Api(_) | Self::Other(_) => None,
        }
    }

    /// Returns the wire error code, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Agent(err) => Some(err.code.as_str()),
            Self::Api(err) => err.kind.error_code(),
            Self::Other(_) => None,
        }
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Agent(err) => err.status_code(),
            Self::Api(err) => err.status_code,
            Self::Other(_) => 500,
        }
    }

    /// Returns the structured details, if any.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Agent(err) if !err.details.is_empty() => Some(Value::Object(err.details.clone())),
            Self::Api(err) => err.details.clone(),
            Self::Agent(_) | Self::Other(_) => None,
        }
    }

    /// Returns whether the error is expected/recoverable.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        match self {
            Self::Agent(err) => err.is_operational,
            Self::Api(err) => err.is_operational,
            Self::Other(_) => false,
        }
    }

    /// Returns the causing error, if any.
    #[must_use]
    pub fn original_error(&self) -> Option<&CoachError> {
        match self {
            Self::Agent(err) => err.original_error(),
            Self::Api(_) | Self::Other(_) => None,
        }
    }

    /// Returns the agent error, if this is one.
    #[must_use]
    pub fn as_agent(&self) -> Option<&AgentError> {
        match self {
            Self::Agent(err) => Some(err),
            Self::Api(_) | Self::Other(_) => None,
        }
    }

    /// Returns the `step` detail, if this is an agent error tagged with one.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        self.as_agent().and_then(AgentError::step)
    }

    /// Returns the stack text, including any causes.
    #[must_use]
    pub fn stack(&self) -> String {
        match self {
            Self::Agent(err) => err.stack().to_string(),
            Self::Api(err) => err.stack().to_string(),
            Self::Other(err) => format!("Error: {err:?}"),
        }
    }
}

/// Message and stack of the error that caused a formatted error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalErrorInfo {
    /// Message of the cause.
    pub message: String,
    /// Stack text of the cause.
    pub stack: String,
}

/// Client-facing error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always `"error"`.
    pub status: String,
    /// Message safe to show to the client.
    pub message: String,
    /// Wire error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Stack text (development only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Cause (development only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<OriginalErrorInfo>,
    /// HTTP status chosen from the taxonomy.
    #[serde(skip)]
    pub status_code: u16,
}

/// Formats any error into a client-safe payload.
///
/// Non-operational errors in production lose their message, code and
/// details. Development mode additionally exposes the stack and the cause.
#[must_use]
pub fn format_error_response(error: &CoachError, environment: Environment) -> ErrorResponse {
    let status_code = error.status_code();

    if !error.is_operational() && environment.is_production() {
        return ErrorResponse {
            status: "error".to_string(),
            message: GENERIC_ERROR_MESSAGE.to_string(),
            error_code: None,
            details: None,
            stack: None,
            original_error: None,
            status_code,
        };
    }

    let mut response = ErrorResponse {
        status: "error".to_string(),
        message: error.message(),
        error_code: error.error_code().map(str::to_string),
        details: error.details(),
        stack: None,
        original_error: None,
        status_code,
    };

    if environment.is_development() {
        response.stack = Some(error.stack());
        response.original_error = error.original_error().map(|cause| OriginalErrorInfo {
            message: cause.message(),
            stack: cause.stack(),
        });
    }

    response
}
