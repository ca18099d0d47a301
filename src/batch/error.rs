use std::{
    error::Error,
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// Why a batch could not start. Failures of single queries never end up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    Open(PathBuf, String),
    Parse(PathBuf, String),
    Accounts(String),
    MissingColumn(String),
}

impl Display for BatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::Open(path, message) => {
                write!(f, "Cannot open file {}: {}", path.display(), message)
            }
            BatchError::Parse(path, message) => {
                write!(f, "Cannot parse file {}: {}", path.display(), message)
            }
            BatchError::Accounts(message) => write!(f, "Malformed accounts list: {}", message),
            BatchError::MissingColumn(column) => {
                write!(f, "Column {} in accounts list expected", column)
            }
        }
    }
}
impl Error for BatchError {}
