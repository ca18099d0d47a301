use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Why a response produced no table. Callers that only care about rows never see this:
/// an empty outcome simply yields no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    NoResponse,
    MissingMetadata,
    MissingContents,
    NoContents,
    MissingPath(String),
    MissingResults(String),
    MalformedDescriptor(String),
}

impl NormalizeError {
    /// True when the response simply carried nothing, as opposed to carrying something
    /// this engine could not make sense of.
    pub fn is_no_data(&self) -> bool {
        matches!(self, NormalizeError::NoResponse | NormalizeError::NoContents)
    }
}

impl Display for NormalizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::NoResponse => write!(f, "Response is not a JSON object"),
            NormalizeError::MissingMetadata => write!(f, "Response has no metadata block"),
            NormalizeError::MissingContents => {
                write!(f, "Response metadata has no contents attribute")
            }
            NormalizeError::NoContents => write!(f, "Response metadata contents list is empty"),
            NormalizeError::MissingPath(path) => {
                write!(f, "Expected a contents list at {}", path)
            }
            NormalizeError::MissingResults(key) => {
                write!(f, "Expected a {} list in the response", key)
            }
            NormalizeError::MalformedDescriptor(message) => {
                write!(f, "Malformed content descriptor: {}", message)
            }
        }
    }
}
impl Error for NormalizeError {}
