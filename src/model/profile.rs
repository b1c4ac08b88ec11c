//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 用户档案与等级曲线。

use crate::config::LevelingConfig;
use serde::{Deserialize, Serialize};

/// 等级上限，防止零增长率配合巨大经验值时循环过久
pub const MAX_LEVEL: u32 = 100_000;

/// 用户档案
///
/// `level` 始终由 `xp` 经等级曲线推导得出，只能通过 [`UserProfile::set_xp`] 修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub xp: f64,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub balance: i64,
}

fn default_level() -> u32 {
    1
}

impl UserProfile {
    /// 创建默认档案：0经验、1级、初始余额
    pub fn new(user_id: u64, starting_balance: i64) -> Self {
        Self {
            user_id,
            xp: 0.0,
            level: 1,
            balance: starting_balance.max(0),
        }
    }

    /// 设置绝对经验值并重新计算等级
    pub fn set_xp(&mut self, xp: f64, curve: &LevelCurve) {
        self.xp = xp;
        self.level = curve.level_for(xp);
    }
}

/// 等级进度
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    /// 当前等级内已积累的经验
    pub xp_into_level: f64,
    /// 升到下一级所需的经验
    pub required_for_next: u64,
}

/// 等级曲线
///
/// 1级从0经验开始；每升一级所需经验为上一级的 `1 + growth_rate` 倍（向下取整）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    initial_threshold: u64,
    growth_rate: f64,
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::new(100, 0.05)
    }
}

impl LevelCurve {
    pub fn new(initial_threshold: u64, growth_rate: f64) -> Self {
        Self {
            initial_threshold: initial_threshold.max(1),
            growth_rate: if growth_rate.is_finite() {
                growth_rate.max(0.0)
            } else {
                0.0
            },
        }
    }

    pub fn from_config(config: &LevelingConfig) -> Self {
        Self::new(config.initial_threshold, config.growth_rate)
    }

    fn next_threshold(&self, required: u64) -> u64 {
        ((required as f64) * (1.0 + self.growth_rate)) as u64
    }

    /// 计算经验值对应的等级
    pub fn level_for(&self, xp: f64) -> u32 {
        self.progress(xp).level
    }

    /// 计算经验值对应的等级进度
    pub fn progress(&self, xp: f64) -> LevelProgress {
        let mut remaining = if xp.is_finite() { xp.max(0.0) } else { 0.0 };
        let mut required = self.initial_threshold;
        let mut level = 1;
        while remaining >= required as f64 && level < MAX_LEVEL {
            remaining -= required as f64;
            level += 1;
            required = self.next_threshold(required);
        }
        LevelProgress {
            level,
            xp_into_level: remaining,
            required_for_next: required,
        }
    }

    /// 达到指定等级所需的最少总经验
    pub fn xp_for_level(&self, level: u32) -> u64 {
        let mut total: u64 = 0;
        let mut required = self.initial_threshold;
        for _ in 1..level.clamp(1, MAX_LEVEL) {
            total = total.saturating_add(required);
            required = self.next_threshold(required);
        }
        total
    }
}
