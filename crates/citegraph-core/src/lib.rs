//! Core types, merge engine and projection logic for the citegraph broker.
//!
//! This crate is deliberately free of HTTP, database and runtime
//! dependencies. Storage backends implement [`store::GraphTxn`] and
//! [`store::GraphStore`]; everything above them talks to those traits.

pub mod cache;
pub mod claim;
pub mod error;
pub mod group;
pub mod identifier;
pub mod index;
pub mod merge;
pub mod projection;
pub mod relation;
pub mod relationship;
pub mod report;
pub mod store;

pub use error::{Classify, Error, ErrorKind, Result};
