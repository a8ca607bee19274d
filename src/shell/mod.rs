//! Shell-backed implementation of [`ActionRunner`](crate::traits::ActionRunner).
//!
//! Nothing outside this module spawns processes.

pub mod runner;
