//! Error types for burst extraction, clustering and reconciliation

use crate::types::{ClusterId, Line, Timestamp};
use thiserror::Error;

/// Main error type for the analysis pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Burst extraction error
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Clustering error
    #[error("Clustering error: {0}")]
    Clustering(#[from] ClusteringError),

    /// Distributed reconciliation error
    #[error("Reconciliation error: {0}")]
    Reconciliation(#[from] ReconciliationError),

    /// Transport error between ranks
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Burst extraction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// Malformed or out-of-order input record
    #[error("Invalid input record at line {line}: {message}")]
    ParseInput {
        /// Source trace line of the offending record
        line: Line,
        /// Description of the problem
        message: String,
    },

    /// The sink refused a sealed burst
    #[error("Sink rejected burst: {0}")]
    Sink(String),

    /// Extraction produced nothing to analyse
    #[error("No bursts extracted, cluster analysis cannot proceed")]
    NoBursts,
}

/// Clustering errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    /// Bad, missing or unknown clustering parameter
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Point dimensionality differs from the rest of the run
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimensionality fixed by the first point
        expected: usize,
        /// Dimensionality of the offending point
        found: usize,
    },

    /// A spatial index was requested over an empty point set
    #[error("Cannot build a spatial index over an empty point set")]
    EmptyIndex,

    /// A partition does not cover the items it is paired with
    #[error("Partition has {assignments} assignments for {items} items")]
    PartitionMismatch {
        /// Items paired with the partition
        items: usize,
        /// Assignments in the partition
        assignments: usize,
    },
}

/// Distributed reconciliation errors
///
/// Only the collecting rank ever observes these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconciliationError {
    /// Gathered distinct lines do not match the bursts known to the collector
    #[error("Data gathered from workers doesn't match the number of bursts: gathered {gathered} lines, {known} bursts known")]
    LineCountMismatch {
        /// Distinct lines gathered from all ranks
        gathered: usize,
        /// Bursts known to the collector
        known: usize,
    },

    /// A known burst has no gathered cluster assignment
    #[error("No cluster gathered for burst at line {0}")]
    UnknownLine(Line),

    /// A line was reported in two different clusters
    #[error("Line {line} reported in clusters {first} and {second}")]
    DuplicateLine {
        /// Offending line
        line: Line,
        /// First cluster seen
        first: ClusterId,
        /// Second cluster seen
        second: ClusterId,
    },

    /// Local lines and local partition are not aligned
    #[error("Local partition has {assignments} assignments but {lines} lines were provided")]
    LocalMismatch {
        /// Assignment vector length
        assignments: usize,
        /// Line vector length
        lines: usize,
    },

    /// Message sequence violated the exchange protocol
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

/// Transport errors between ranks
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer went away
    #[error("Rank {rank} disconnected")]
    Disconnected {
        /// Peer rank
        rank: usize,
    },

    /// Rank outside the communicator
    #[error("Invalid rank {rank} for a communicator of size {size}")]
    InvalidRank {
        /// Requested rank
        rank: usize,
        /// Communicator size
        size: usize,
    },

    /// A message arrived that the protocol does not allow here
    #[error("Unexpected message from rank {rank}: expected {expected}, got {got}")]
    UnexpectedMessage {
        /// Sending rank
        rank: usize,
        /// Message kind the protocol required
        expected: &'static str,
        /// Message kind received
        got: &'static str,
    },

    /// Frame could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Connection setup failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation errors
///
/// Error type for configuration validation
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Value is out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name being validated
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid format
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat {
        /// Field name being validated
        field: String,
        /// Description of the format error
        message: String,
    },
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl ExtractionError {
    /// Shorthand for a parse error on a given record line
    pub fn parse(line: Line, message: impl Into<String>) -> Self {
        ExtractionError::ParseInput {
            line,
            message: message.into(),
        }
    }
}

/// Error raised when a record's time interval is inverted
pub(crate) fn inverted_interval(line: Line, begin: Timestamp, end: Timestamp) -> ExtractionError {
    ExtractionError::parse(line, format!("state ends ({}) before it begins ({})", end, begin))
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
