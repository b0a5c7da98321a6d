//! Task Assignment API Library
//!
//! A REST backend over two document collections, tasks and users, that keeps
//! `Task.assignedUser` and `User.pendingTasks` consistent with each other.

pub mod api;
pub mod domain;
pub mod infrastructure;
