//! Room lifecycle and the process-wide registry.

pub mod registry;
