//! Server and database catalog

mod registry;

pub use registry::{Database, Server};
