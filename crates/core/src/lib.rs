pub mod error;
pub mod logging;

pub mod daemon;
pub mod database;
pub mod indexer;
pub mod model;
pub mod preprocess;
pub mod protocol;
pub mod source;

pub use error::Result;

/// Default TCP port the daemon listens on and clients connect to.
pub const DEFAULT_PORT: u16 = 5678;
