use thiserror::Error;

/// Navigation error codes shared by every [`crate::database::Database`]
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The database (or the requested feature) is not available.
    Disabled,
    /// The requested URI does not exist.
    NotFound,
    /// The requested URI already exists.
    Conflict,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{0}")]
    Disabled(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Syntax or semantic error in a song filter expression.
    #[error("{0}")]
    Filter(String),

    /// Syntax error in a database file.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A descriptive message wrapping the underlying cause.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

impl DbError {
    /// The navigation code of this error, looking through context wrappers.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DbError::Disabled(_) => Some(ErrorCode::Disabled),
            DbError::NotFound(_) => Some(ErrorCode::NotFound),
            DbError::Conflict(_) => Some(ErrorCode::Conflict),
            DbError::Context { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Wrap this error in a descriptive outer message.
    pub fn context(self, context: impl Into<String>) -> Self {
        DbError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        DbError::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
