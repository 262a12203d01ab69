//! Calendar persistence, synchronization, sharing and scheduling backend.
//!
//! The protocol engine talks to [`CalendarBackend`], which implements the
//! contract traits from [`calvault_core::contract`]. Underneath, a set of
//! services coordinates the stores, keeps the change log and sync tokens
//! consistent, and publishes domain events on an outbound channel.

pub mod backend;
pub mod config;
pub mod events;
pub mod principal;
pub mod service;
pub mod storage;

pub use backend::CalendarBackend;
pub use config::Config;
pub use events::{DomainEvent, EventBus};
