pub mod conversations;
pub mod db;
pub mod memories;
pub mod models;
pub mod qdrant;
pub mod schema;
pub mod store;

mod error;

pub use error::Error;
pub use store::{BoxFuture, DocumentStore, IndexHit, VectorIndex};

pub type Result<T, E = Error> = std::result::Result<T, E>;
