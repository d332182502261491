//! Schema error taxonomy
//!
//! Errors raised by the MongoDB driver are classified into the handful of
//! kinds an operator can act on. Nothing here retries or recovers.

use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};

/// Server error codes the classifier cares about
pub mod codes {
    pub const UNAUTHORIZED: i32 = 13;
    pub const AUTHENTICATION_FAILED: i32 = 18;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const INDEX_NOT_FOUND: i32 = 27;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const INDEX_ALREADY_EXISTS: i32 = 68;
    pub const INDEX_OPTIONS_CONFLICT: i32 = 85;
    pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
    pub const DUPLICATE_KEY: i32 = 11000;
}

/// Error raised while inspecting or modifying the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Endpoint unreachable or authentication failed
    Connection { message: String },

    /// The executing principal lacks schema-modification rights
    PermissionDenied { target: String, message: String },

    /// An index with the same name (or the same keys) exists with a different specification
    DuplicateIndexConflict {
        collection: String,
        index: String,
        detail: String,
    },

    /// The collection already exists (tolerated by the initializer)
    CollectionExists { collection: String },

    /// A write or index build would duplicate a unique key
    DuplicateKey { collection: String, message: String },

    /// Any other server or driver failure
    Database { code: Option<i32>, message: String },
}

impl SchemaError {
    /// Classify a driver error raised while operating on `collection`.
    ///
    /// `index` names the index involved, if any.
    pub fn classify(err: MongoError, collection: &str, index: Option<&str>) -> Self {
        let target = match index {
            Some(index) => format!("{}.{}", collection, index),
            None => collection.to_string(),
        };

        match err.kind.as_ref() {
            ErrorKind::Command(cmd) => {
                Self::from_server_code(cmd.code, cmd.message.clone(), collection, index, target)
            }
            ErrorKind::Write(WriteFailure::WriteError(write)) => {
                Self::from_server_code(write.code, write.message.clone(), collection, index, target)
            }
            ErrorKind::Authentication { message, .. } => Self::Connection {
                message: format!("authentication failed: {}", message),
            },
            ErrorKind::ServerSelection { message, .. } => Self::Connection {
                message: format!("server selection failed: {}", message),
            },
            ErrorKind::DnsResolve { message, .. } => Self::Connection {
                message: format!("DNS resolution failed: {}", message),
            },
            ErrorKind::ConnectionPoolCleared { message, .. } => Self::Connection {
                message: message.clone(),
            },
            ErrorKind::Io(io) => Self::Connection {
                message: format!("I/O error: {}", io),
            },
            _ => Self::Database {
                code: None,
                message: err.to_string(),
            },
        }
    }

    fn from_server_code(
        code: i32,
        message: String,
        collection: &str,
        index: Option<&str>,
        target: String,
    ) -> Self {
        match code {
            codes::UNAUTHORIZED => Self::PermissionDenied { target, message },
            codes::AUTHENTICATION_FAILED => Self::Connection { message },
            codes::NAMESPACE_EXISTS => Self::CollectionExists {
                collection: collection.to_string(),
            },
            codes::INDEX_ALREADY_EXISTS
            | codes::INDEX_OPTIONS_CONFLICT
            | codes::INDEX_KEY_SPECS_CONFLICT => Self::DuplicateIndexConflict {
                collection: collection.to_string(),
                index: index.unwrap_or_default().to_string(),
                detail: message,
            },
            codes::DUPLICATE_KEY => Self::DuplicateKey {
                collection: collection.to_string(),
                message,
            },
            other => Self::Database {
                code: Some(other),
                message,
            },
        }
    }

    /// Short name of the error kind, used in machine-readable output
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "ConnectionError",
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::DuplicateIndexConflict { .. } => "DuplicateIndexConflict",
            Self::CollectionExists { .. } => "CollectionExists",
            Self::DuplicateKey { .. } => "DuplicateKey",
            Self::Database { .. } => "DatabaseError",
        }
    }

    /// Whether the error means the server is unreachable or refused our credentials
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Server error code carried by this error, if known
    pub fn server_code(&self) -> Option<i32> {
        match self {
            Self::Database { code, .. } => *code,
            Self::CollectionExists { .. } => Some(codes::NAMESPACE_EXISTS),
            Self::DuplicateKey { .. } => Some(codes::DUPLICATE_KEY),
            Self::PermissionDenied { .. } => Some(codes::UNAUTHORIZED),
            _ => None,
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection { message } => {
                write!(f, "{}: {}", self.kind_name(), message)
            }
            Self::PermissionDenied { target, message } => {
                write!(f, "{} on '{}': {}", self.kind_name(), target, message)
            }
            Self::DuplicateIndexConflict {
                collection,
                index,
                detail,
            } => write!(
                f,
                "{}: index '{}' on '{}' conflicts with an existing index ({}); resolve manually",
                self.kind_name(),
                index,
                collection,
                detail
            ),
            Self::CollectionExists { collection } => {
                write!(f, "collection '{}' already exists", collection)
            }
            Self::DuplicateKey {
                collection,
                message,
            } => write!(f, "duplicate key in '{}': {}", collection, message),
            Self::Database {
                code: Some(code),
                message,
            } => write!(f, "{} (code {}): {}", self.kind_name(), code, message),
            Self::Database {
                code: None,
                message,
            } => write!(f, "{}: {}", self.kind_name(), message),
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_code_mapping() {
        let err = SchemaError::from_server_code(
            codes::INDEX_OPTIONS_CONFLICT,
            "Index already exists with a different name".to_string(),
            "users",
            Some("email_1"),
            "users.email_1".to_string(),
        );
        assert_eq!(
            err,
            SchemaError::DuplicateIndexConflict {
                collection: "users".to_string(),
                index: "email_1".to_string(),
                detail: "Index already exists with a different name".to_string(),
            }
        );

        let err = SchemaError::from_server_code(
            codes::UNAUTHORIZED,
            "not authorized".to_string(),
            "stories",
            None,
            "stories".to_string(),
        );
        assert_eq!(err.kind_name(), "PermissionDenied");

        let err = SchemaError::from_server_code(
            codes::AUTHENTICATION_FAILED,
            "bad auth".to_string(),
            "users",
            None,
            "users".to_string(),
        );
        assert!(err.is_connection());

        let err = SchemaError::from_server_code(
            codes::NAMESPACE_EXISTS,
            "exists".to_string(),
            "users",
            None,
            "users".to_string(),
        );
        assert_eq!(
            err,
            SchemaError::CollectionExists {
                collection: "users".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let err = SchemaError::from_server_code(
            codes::NAMESPACE_NOT_FOUND,
            "ns not found".to_string(),
            "stories",
            None,
            "stories".to_string(),
        );
        assert_eq!(err.server_code(), Some(codes::NAMESPACE_NOT_FOUND));
        assert_eq!(err.to_string(), "DatabaseError (code 26): ns not found");
    }

    #[test]
    fn test_conflict_message_names_index() {
        let err = SchemaError::DuplicateIndexConflict {
            collection: "users".to_string(),
            index: "email_1".to_string(),
            detail: "existing index is not unique".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("DuplicateIndexConflict"));
        assert!(msg.contains("email_1"));
        assert!(msg.contains("users"));
    }
}
