//! Broker wiring and lifecycle management.

mod archive;
mod init;
mod routes;
mod source;

pub use archive::{list_archive, show_archived};
pub use init::run_broker;
