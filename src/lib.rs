pub mod cleanup;
pub mod config;
pub mod error;
pub mod fetch;
pub mod load;
pub mod logging;
pub mod schema;
pub mod upload;
pub mod workflow;

pub use error::IngestError;
