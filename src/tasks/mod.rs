//! Background Tasks Module
//!
//! Contains the tasks the cache spawns on its runtime besides query runs.
//!
//! # Tasks
//! - Eviction timers: remove (or refetch) a settled entry once its lifetime elapses

mod eviction;

pub(crate) use eviction::TimerRegistry;
