use std::fmt;

/// Error kinds surfaced by the engine
///
/// Parsers and the executor never propagate errors; everything that can
/// reach the user funnels through this enum, and only the CLI layer turns
/// variants into exit codes and stderr text.
#[derive(Debug, Clone, PartialEq)]
pub enum PtxError {
    /// Query string failed to compile
    QuerySyntax {
        position: usize,
        message: String,
    },
    /// Detection found no parser that scores above zero for the sample
    UnknownFormat {
        source: String,
    },
    /// CLI gate: a required argument is absent or unusable
    MissingArgument {
        argument: String,
        message: String,
    },
    /// A source collaborator (file, stdin, remote shell) failed to produce lines
    SourceFetch {
        source: String,
        message: String,
    },
    /// Configuration file named by PTX_CONFIG is unreadable or malformed
    Config {
        path: String,
        message: String,
    },
    /// Programmer error; should never be reachable from user input
    InternalInvariant {
        message: String,
    },
}

impl PtxError {
    /// Process exit code for this error: 1 for user errors, 2 for internal ones.
    pub fn exit_code(&self) -> i32 {
        match self {
            PtxError::InternalInvariant { .. } => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for PtxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PtxError::QuerySyntax { position, message } => {
                write!(f, "query syntax error at position {}: {}", position, message)
            }
            PtxError::UnknownFormat { source } => {
                write!(f, "could not detect a log format for '{}'", source)
            }
            PtxError::MissingArgument { argument, message } => {
                write!(f, "invalid argument '{}': {}", argument, message)
            }
            PtxError::SourceFetch { source, message } => {
                write!(f, "failed to read from '{}': {}", source, message)
            }
            PtxError::Config { path, message } => {
                write!(f, "bad config file '{}': {}", path, message)
            }
            PtxError::InternalInvariant { message } => {
                write!(f, "internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for PtxError {}

/// Recoverable fault raised inside a user transform. The chain catches
/// these, warns, and passes the event through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformFault {
    pub transform: String,
    pub message: String,
}

impl fmt::Display for TransformFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transform '{}' faulted: {}", self.transform, self.message)
    }
}

impl std::error::Error for TransformFault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let user = PtxError::QuerySyntax {
            position: 3,
            message: "expected a value".to_string(),
        };
        assert_eq!(user.exit_code(), 1);

        let internal = PtxError::InternalInvariant {
            message: "group accumulator desynced".to_string(),
        };
        assert_eq!(internal.exit_code(), 2);
    }

    #[test]
    fn test_display_carries_position() {
        let err = PtxError::QuerySyntax {
            position: 14,
            message: "expected '}' after in-list".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("position 14"));
        assert!(rendered.contains("in-list"));
    }
}
