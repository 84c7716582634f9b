use std::fmt;
use std::fmt::Display;
use std::io;
use std::num::ParseIntError;

/// Error taxonomy shared across every crate in the workspace.
///
/// Each variant is a `kind`, not a concrete type: handlers at the wire edge
/// render `Display` straight onto an `ERROR <message>` response line.
#[derive(Debug)]
pub enum MygramError {
    InvalidArgument(String),
    NotFound(String),
    AlreadyExists(String),
    PermissionDenied(String),
    FailedPrecondition(String),
    Unavailable(String),
    DataLoss(String),
    Cancelled(String),
    /// An invariant was violated. Should never occur; logged loudly when it does.
    Internal(String),
    Io(io::Error),
}

pub type MygramResult<T> = Result<T, MygramError>;

impl MygramError {
    pub fn kind(&self) -> &'static str {
        match self {
            MygramError::InvalidArgument(_) => "InvalidArgument",
            MygramError::NotFound(_) => "NotFound",
            MygramError::AlreadyExists(_) => "AlreadyExists",
            MygramError::PermissionDenied(_) => "PermissionDenied",
            MygramError::FailedPrecondition(_) => "FailedPrecondition",
            MygramError::Unavailable(_) => "Unavailable",
            MygramError::DataLoss(_) => "DataLoss",
            MygramError::Cancelled(_) => "Cancelled",
            MygramError::Internal(_) => "Internal",
            MygramError::Io(_) => "Io",
        }
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        MygramError::InvalidArgument(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        MygramError::NotFound(msg.into())
    }

    pub fn failed_precondition<S: Into<String>>(msg: S) -> Self {
        MygramError::FailedPrecondition(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        MygramError::Internal(msg.into())
    }

    pub fn data_loss<S: Into<String>>(msg: S) -> Self {
        MygramError::DataLoss(msg.into())
    }

    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        MygramError::Unavailable(msg.into())
    }

    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        MygramError::PermissionDenied(msg.into())
    }

    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        MygramError::AlreadyExists(msg.into())
    }

    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        MygramError::Cancelled(msg.into())
    }
}

impl Display for MygramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MygramError::InvalidArgument(s)
            | MygramError::NotFound(s)
            | MygramError::AlreadyExists(s)
            | MygramError::PermissionDenied(s)
            | MygramError::FailedPrecondition(s)
            | MygramError::Unavailable(s)
            | MygramError::DataLoss(s)
            | MygramError::Cancelled(s)
            | MygramError::Internal(s) => write!(f, "{}", s),
            MygramError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MygramError {}

impl From<io::Error> for MygramError {
    fn from(e: io::Error) -> Self {
        MygramError::Io(e)
    }
}

impl From<ParseIntError> for MygramError {
    fn from(e: ParseIntError) -> Self {
        MygramError::InvalidArgument(e.to_string())
    }
}

impl From<toml::de::Error> for MygramError {
    fn from(e: toml::de::Error) -> Self {
        MygramError::InvalidArgument(format!("config parse error: {}", e))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let e = MygramError::not_found("no such table");
        assert_eq!(e.kind(), "NotFound");
        assert_eq!(e.to_string(), "no such table");
    }
}
