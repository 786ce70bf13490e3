//! # Showcase Library
//!
//! Keeps a catalogue of GitHub repositories in sync with upstream and
//! maintains a tally of the technologies they use, across three
//! interchangeable storage backends.

pub mod config;
pub mod db;
pub mod error;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod reconciler;
pub mod source;
pub mod store;
pub mod tally;
pub mod telemetry;
pub use migration;
