//! Error types for the dispatch kernel boundaries.

use std::fmt;

/// A malformed booking request, rejected synchronously before any search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    MissingBookingId,
    CoordinateOutOfRange { field: &'static str },
    NonFiniteCoordinate { field: &'static str },
    InvalidPackageWeight,
}

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidInput::MissingBookingId => write!(f, "booking id is empty"),
            InvalidInput::CoordinateOutOfRange { field } => {
                write!(f, "{field} coordinate out of range")
            }
            InvalidInput::NonFiniteCoordinate { field } => {
                write!(f, "{field} coordinate is not finite")
            }
            InvalidInput::InvalidPackageWeight => write!(f, "package weight must be finite and >= 0"),
        }
    }
}

impl std::error::Error for InvalidInput {}

/// Why a booking submission was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    Invalid(InvalidInput),
    /// A non-terminal match for this booking id is already running.
    AlreadyInFlight,
}

impl From<InvalidInput> for SubmitError {
    fn from(err: InvalidInput) -> Self {
        SubmitError::Invalid(err)
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Invalid(err) => write!(f, "invalid booking request: {err}"),
            SubmitError::AlreadyInFlight => write!(f, "a match for this booking is already in flight"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::Invalid(err) => Some(err),
            SubmitError::AlreadyInFlight => None,
        }
    }
}

/// Candidate lookup failed at the location store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    Unavailable(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Unavailable(cause) => write!(f, "candidate provider unavailable: {cause}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Proposal dispatch failed at the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    DispatchFailed(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::DispatchFailed(cause) => write!(f, "proposal dispatch failed: {cause}"),
        }
    }
}

impl std::error::Error for SinkError {}
