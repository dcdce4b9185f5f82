// Error model shared by the loader, store, engines, and the HTTP/CLI adapters.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    InvalidRequest,
    NotLoaded,
    Io,
    Syntax,
    MalformedRow,
    DuplicateColumn,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::NotLoaded => "NotLoaded",
            ErrorKind::Io => "Io",
            ErrorKind::Syntax => "Syntax",
            ErrorKind::MalformedRow => "MalformedRow",
            ErrorKind::DuplicateColumn => "DuplicateColumn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "Internal" => ErrorKind::Internal,
            "InvalidRequest" => ErrorKind::InvalidRequest,
            "NotLoaded" => ErrorKind::NotLoaded,
            "Io" => ErrorKind::Io,
            "Syntax" => ErrorKind::Syntax,
            "MalformedRow" => ErrorKind::MalformedRow,
            "DuplicateColumn" => ErrorKind::DuplicateColumn,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    row: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            row: None,
            source: None,
        }
    }

    pub fn not_loaded() -> Self {
        Self::new(ErrorKind::NotLoaded)
            .with_message("no data loaded")
            .with_hint("Load a CSV file first.")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 1-based CSV record line the error refers to, when known.
    pub fn row(&self) -> Option<u64> {
        self.row
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_row(mut self, row: u64) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(row) = self.row {
            write!(f, " (row: {row})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::InvalidRequest => 2,
        ErrorKind::NotLoaded => 3,
        ErrorKind::Io => 4,
        ErrorKind::Syntax => 5,
        ErrorKind::MalformedRow => 6,
        ErrorKind::DuplicateColumn => 7,
    }
}
