//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了KV缓存层：用户档案仓库与事件日志缓冲区。

pub mod buffer;
pub mod repository;

pub use buffer::{EventLogBuffer, ScannedEntry};
pub use repository::{ProfileRepository, XpOutcome};
