//! Workload generator implementations.
//!
//! A workload generator puts records into the store a source reads from.
//! [`ScriptWorkload`] shells out to an external insert script;
//! [`SyntheticWorkload`] appends generated records to a [`MemoryLog`](crate::sources::MemoryLog).

pub mod script;
pub mod synthetic;

pub use script::ScriptWorkload;
pub use synthetic::SyntheticWorkload;
