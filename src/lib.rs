//! Equipment sensor CSV summaries.
//!
//! Uploads are parsed ([`parser`]), checked for the required columns
//! ([`schema`]), summarized ([`stats`]) and kept in a retention-bounded store
//! ([`store`]) whose raw files live in a [`blob`] store. The [`server`] module
//! exposes this over HTTP; [`client`] talks to it from the command line.

pub mod blob;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod pipeline;
pub mod preview;
pub mod projection;
pub mod report;
pub mod schema;
pub mod server;
pub mod stats;
pub mod store;
