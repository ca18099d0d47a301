//! Reshapes a decoded query response into a header and a lazy sequence of flat rows.
//!
//! The shape of a response is never declared, so it is inferred from the keys present
//! in its metadata block. Each shape has its own row extractor, and every extractor
//! fills the aggregate columns through the same layout the header was built with.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

pub mod descriptor;
mod error;
pub mod header;
pub mod rows;
pub mod shape;

pub use descriptor::{ContentDescriptor, Expansion, Function};
pub use error::NormalizeError;
pub use header::Header;
pub use rows::Rows;
pub use shape::{FacetSpec, Shape};

/// One flat output row, keyed by header column.
pub type Row = IndexMap<String, Value>;

/// Outcome of normalizing one response.
pub enum Normalized<'a> {
    Table { header: Arc<Header>, rows: Rows<'a> },
    Empty(NormalizeError),
}

impl<'a> Normalized<'a> {
    pub fn header(&self) -> Option<&Header> {
        match self {
            Normalized::Table { header, .. } => Some(header.as_ref()),
            Normalized::Empty(_) => None,
        }
    }

    /// Why nothing was produced, for callers that want to tell "no data" apart from
    /// "unexpected shape".
    pub fn error(&self) -> Option<&NormalizeError> {
        match self {
            Normalized::Table { .. } => None,
            Normalized::Empty(err) => Some(err),
        }
    }

    /// The rows, or an empty sequence when the response could not be normalized.
    pub fn into_rows(self) -> Rows<'a> {
        match self {
            Normalized::Table { rows, .. } => rows,
            Normalized::Empty(_) => Box::new(std::iter::empty()),
        }
    }
}

/// Normalizes `response`, merging `include` into the front of every row.
///
/// Structurally unexpected responses are not errors: they produce
/// [`Normalized::Empty`], which yields no rows.
pub fn normalize<'a>(response: &'a Value, include: &Row) -> Normalized<'a> {
    let classified = match shape::classify(response) {
        Ok(classified) => classified,
        Err(err) => {
            debug!(reason = %err, "query response yields no rows");
            return Normalized::Empty(err);
        }
    };

    let meta = header::query_meta(include, classified.metadata, response, classified.shape);
    let header = Arc::new(header::build_header(
        &classified.contents,
        &classified.source.items(),
        &meta,
        classified.facet.as_ref(),
        classified.shape.is_compare(),
    ));

    debug!(
        shape = %classified.shape,
        columns = header.len(),
        offset = header.offset(),
        "classified query response"
    );

    let rows = rows::extract(classified.source, header.clone(), Arc::new(meta));
    let conform = header.clone();

    Normalized::Table {
        header,
        rows: Box::new(rows.map(move |row| conform.conform(row))),
    }
}
