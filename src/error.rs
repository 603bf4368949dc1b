use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised by the Content Index while resolving or listing objects.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentError {
    #[error("no such object")]
    NotFound,

    #[error("object is not a container")]
    NotContainer,
}

/// Errors surfaced by HTTP handlers. Each variant maps to the exact status
/// code the client-facing protocol requires (spec §4.3, §7).
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("no such object")]
    NotFound,

    #[error("range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ContentError> for HttpError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::NotFound | ContentError::NotContainer => HttpError::NotFound,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            HttpError::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(axum::http::header::CONTENT_RANGE, format!("bytes */{size}"))],
            )
                .into_response(),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            HttpError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

/// UPnP SOAP fault codes this server is able to produce (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub enum SoapFault {
    InvalidAction,
    InvalidArgs,
    NoSuchObject,
}

impl SoapFault {
    pub fn code(self) -> u32 {
        match self {
            SoapFault::InvalidAction => 401,
            SoapFault::InvalidArgs => 402,
            SoapFault::NoSuchObject => 701,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SoapFault::InvalidAction => "Invalid Action",
            SoapFault::InvalidArgs => "Invalid Args",
            SoapFault::NoSuchObject => "No such object",
        }
    }
}

/// Fatal startup errors that map to the exit codes in spec §6. Recoverable
/// per-request/per-datagram errors never reach this type.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("port {0} already in use")]
    PortInUse(u16),

    #[error("served directory missing or not a directory: {0}")]
    DirectoryMissing(String),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::InvalidConfig(_) => 2,
            StartupError::PortInUse(_) => 3,
            StartupError::DirectoryMissing(_) => 4,
        }
    }
}
