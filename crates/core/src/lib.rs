//! Core types and contracts for the calvault calendar backend.
//!
//! This crate holds everything that is pure data or pure behavior: the
//! entity types persisted by the backend, the store traits the storage
//! backends implement, the error taxonomy, and the protocol contract
//! traits the backend facade exposes to the (external) protocol engine.
//! No I/O happens here.

pub mod contract;
pub mod entity;
pub mod store;
