pub mod batch;
pub mod client;
pub mod config;
pub mod normalize;
pub mod nrql;
pub mod output;

pub use normalize::{normalize, Header, Normalized, NormalizeError, Row, Shape};
