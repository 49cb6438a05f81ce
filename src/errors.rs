//! Error types for chronoscan
//!
//! Error codes:
//! - CHRONO_MALFORMED_INPUT (ERROR severity) - sort-order or range invariant violated
//! - CHRONO_PAGE_UNAVAILABLE (ERROR severity) - a page could not be loaded
//! - CHRONO_RESOURCE_EXHAUSTED (ERROR severity) - a single entity overflows a leaf
//! - CHRONO_DATA_CORRUPTION (FATAL severity) - checksum or format failure
//! - CHRONO_IO_ERROR (ERROR severity)
//! - CHRONO_CONFIG_ERROR (ERROR severity)
//!
//! Nothing in this crate retries. Every error aborts the enclosing task or
//! write and propagates to the caller.

use std::fmt;
use std::io;

use thiserror::Error;

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, caller may continue with other work
    Error,
    /// Stored data can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedInput,
    PageUnavailable,
    ResourceExhausted,
    DataCorruption,
    Io,
    Config,
}

impl ErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::MalformedInput => "CHRONO_MALFORMED_INPUT",
            ErrorCode::PageUnavailable => "CHRONO_PAGE_UNAVAILABLE",
            ErrorCode::ResourceExhausted => "CHRONO_RESOURCE_EXHAUSTED",
            ErrorCode::DataCorruption => "CHRONO_DATA_CORRUPTION",
            ErrorCode::Io => "CHRONO_IO_ERROR",
            ErrorCode::Config => "CHRONO_CONFIG_ERROR",
        }
    }

    /// Returns the severity level for this code
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::DataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum ChronoError {
    /// An ordering or range invariant of the input was violated.
    ///
    /// Continuing would produce a silently wrong bitemporal answer, so this is
    /// raised as soon as the violation is observed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A page could not be loaded from its segment.
    #[error("page {page} of segment '{segment}' unavailable: {reason}")]
    PageUnavailable {
        segment: String,
        page: usize,
        #[source]
        reason: Box<ChronoError>,
    },

    /// A single entity alone exceeds the leaf row limit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Stored bytes failed checksum or format validation.
    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChronoError {
    /// Create a malformed input error
    pub fn malformed(message: impl Into<String>) -> Self {
        ChronoError::MalformedInput(message.into())
    }

    /// Create a corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        ChronoError::Corruption(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ChronoError::Config(message.into())
    }

    /// Wrap an I/O error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ChronoError::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap a load failure so it names the failing segment and page
    pub fn page_unavailable(segment: impl Into<String>, page: usize, reason: ChronoError) -> Self {
        ChronoError::PageUnavailable {
            segment: segment.into(),
            page,
            reason: Box::new(reason),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            ChronoError::MalformedInput(_) => ErrorCode::MalformedInput,
            ChronoError::PageUnavailable { .. } => ErrorCode::PageUnavailable,
            ChronoError::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
            ChronoError::Corruption(_) => ErrorCode::DataCorruption,
            ChronoError::Io { .. } => ErrorCode::Io,
            ChronoError::Config(_) => ErrorCode::Config,
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            // corruption underneath a page load is still corruption
            ChronoError::PageUnavailable { reason, .. } => reason.severity(),
            other => other.code().severity(),
        }
    }

    /// Returns whether this error means stored data can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type for chronoscan operations
pub type ChronoResult<T> = Result<T, ChronoError>;
