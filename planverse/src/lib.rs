//! `PlanVerse`: personal planner library with optimistic task sync.

pub mod config;
pub mod store;
pub mod sync;
pub mod tasks;
