//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了KV到持久层的同步机制，包括批量同步、TTL修复和周期调度。

pub mod common;
pub mod engine;
pub mod repair;
pub mod scheduler;

pub use common::{BatchOutcome, KeyFailure, RepairOutcome, RepairReport, SyncPhase, SyncReport};
pub use engine::SyncEngine;
pub use repair::ExpiryRepairJob;
pub use scheduler::spawn_periodic;
