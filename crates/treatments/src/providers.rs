//! Built-in processing providers.

pub mod gdalalg;
pub mod native;
