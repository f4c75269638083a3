//! Background services.

pub mod cleanup;

pub use cleanup::{run_cleanup, spawn_cleanup_task};
