//! Side-effecting helpers: configuration, unit files, the task store.

pub mod config;
pub mod fs_util;
pub mod task_store;
pub mod unit;
