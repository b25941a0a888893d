//! Background Tasks Module
//!
//! Contains background tasks owned by cache backends.
//!
//! # Tasks
//! - Expiry Sweep: Removes expired in-memory entries at a configured interval

mod sweep;

pub use sweep::spawn_sweep_task;
