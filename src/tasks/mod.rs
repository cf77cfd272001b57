//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Reinit Sweep: Reinitializes stores whose watch stream broke

mod reinit;

pub use reinit::spawn_reinit_task;
