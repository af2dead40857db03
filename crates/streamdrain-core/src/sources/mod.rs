//! Stream source implementations.
//!
//! This module contains concrete [`StreamSource`](crate::traits::StreamSource)
//! implementations the harness can drain.

pub mod memory;

// The Postgres source is only available when the `postgres` feature is enabled.
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryLog, MemoryStreamHandle, MemoryStreamSource};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresSourceConfig, PostgresTableSource};
