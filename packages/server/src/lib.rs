// Financial document archive service.
//
// HTTP surface and background scheduling around the archiver pipeline:
// company search, on-demand archive downloads, staging reclamation, and
// nightly registry refresh.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
