//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存实体的类型、键布局和TTL策略。

pub mod catalog;
pub mod events;
pub mod keys;
pub mod profile;

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use catalog::{ItemUpdate, MarketItem, CATALOG_COLLECTION};
pub use events::{
    EconomyClaim, EventRecord, MessageEvent, PurchaseEvent, ReactionEvent, VoiceSessionEvent,
};
pub use keys::{EntityKey, KEY_DELIMITER};
pub use profile::{LevelCurve, LevelProgress, UserProfile};

/// 消息事件保留时间：7天
pub const MESSAGE_TTL_SECS: u64 = 7 * 86_400;
/// 表情、语音、购买事件保留时间：30天
pub const EVENT_TTL_SECS: u64 = 30 * 86_400;
/// 每日领取记录保留时间：25小时
pub const DAILY_CLAIM_TTL_SECS: u64 = 25 * 3_600;
/// 每周领取记录保留时间：8天
pub const WEEKLY_CLAIM_TTL_SECS: u64 = 8 * 86_400;

/// 实体类型
///
/// 每种类型对应一个KV键前缀和一个持久层集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Message,
    Reaction,
    Voice,
    Claim,
    Purchase,
}

impl EntityKind {
    /// 所有实体类型
    pub const ALL: [EntityKind; 6] = [
        EntityKind::User,
        EntityKind::Message,
        EntityKind::Reaction,
        EntityKind::Voice,
        EntityKind::Claim,
        EntityKind::Purchase,
    ];

    /// 事件日志类型（同步后从KV删除）
    pub const EVENTS: [EntityKind; 5] = [
        EntityKind::Message,
        EntityKind::Reaction,
        EntityKind::Voice,
        EntityKind::Claim,
        EntityKind::Purchase,
    ];

    /// KV键前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Message => "message",
            EntityKind::Reaction => "reaction",
            EntityKind::Voice => "voice",
            EntityKind::Claim => "claim",
            EntityKind::Purchase => "purchase",
        }
    }

    /// 持久层集合名称
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::User => "user_profiles",
            EntityKind::Message => "message_events",
            EntityKind::Reaction => "reaction_events",
            EntityKind::Voice => "voice_sessions",
            EntityKind::Claim => "economy_claims",
            EntityKind::Purchase => "purchase_events",
        }
    }

    /// 键中前缀之后的组成部分数量
    pub fn key_arity(&self) -> usize {
        match self {
            EntityKind::User | EntityKind::Message => 1,
            EntityKind::Voice | EntityKind::Purchase => 2,
            EntityKind::Reaction | EntityKind::Claim => 3,
        }
    }

    /// 是否为事件日志类型
    pub fn is_event_log(&self) -> bool {
        !matches!(self, EntityKind::User)
    }

    /// 固定TTL；领取记录的TTL取决于领取类型，用户档案没有TTL
    pub fn fixed_ttl(&self) -> Option<u64> {
        match self {
            EntityKind::Message => Some(MESSAGE_TTL_SECS),
            EntityKind::Reaction | EntityKind::Voice | EntityKind::Purchase => {
                Some(EVENT_TTL_SECS)
            }
            EntityKind::User | EntityKind::Claim => None,
        }
    }

    /// 匹配该类型所有键的SCAN模式
    pub fn pattern(&self) -> String {
        format!("{}{}*", self.prefix(), KEY_DELIMITER)
    }

    /// 从键前缀解析实体类型
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// 奖励领取类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Daily,
    Weekly,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Daily => "daily",
            ClaimType::Weekly => "weekly",
        }
    }

    /// 领取记录在KV中的保留时间
    pub fn ttl_secs(&self) -> u64 {
        match self {
            ClaimType::Daily => DAILY_CLAIM_TTL_SECS,
            ClaimType::Weekly => WEEKLY_CLAIM_TTL_SECS,
        }
    }

    /// 两次领取之间的冷却时间
    pub fn cooldown_secs(&self) -> i64 {
        match self {
            ClaimType::Daily => 86_400,
            ClaimType::Weekly => 7 * 86_400,
        }
    }
}

impl std::str::FromStr for ClaimType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(ClaimType::Daily),
            "weekly" => Ok(ClaimType::Weekly),
            other => Err(SyncError::Validation(format!(
                "unknown claim type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 缓存记录的标签联合
///
/// KV负载和持久层文档都使用内部记录的扁平字段布局，
/// 类型由键前缀或集合决定
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(UserProfile),
    Message(MessageEvent),
    Reaction(ReactionEvent),
    Voice(VoiceSessionEvent),
    Claim(EconomyClaim),
    Purchase(PurchaseEvent),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::User(_) => EntityKind::User,
            Record::Message(_) => EntityKind::Message,
            Record::Reaction(_) => EntityKind::Reaction,
            Record::Voice(_) => EntityKind::Voice,
            Record::Claim(_) => EntityKind::Claim,
            Record::Purchase(_) => EntityKind::Purchase,
        }
    }

    /// 记录对应的KV键
    pub fn key(&self) -> Result<EntityKey> {
        match self {
            Record::User(p) => EntityKey::new(EntityKind::User, vec![p.user_id.to_string()]),
            Record::Message(e) => e.key(),
            Record::Reaction(e) => e.key(),
            Record::Voice(e) => e.key(),
            Record::Claim(e) => e.key(),
            Record::Purchase(e) => e.key(),
        }
    }

    /// 记录在KV中的TTL，None表示永不过期
    pub fn ttl_secs(&self) -> Option<u64> {
        match self {
            Record::User(_) => None,
            Record::Message(e) => Some(e.ttl_secs()),
            Record::Reaction(e) => Some(e.ttl_secs()),
            Record::Voice(e) => Some(e.ttl_secs()),
            Record::Claim(e) => Some(e.ttl_secs()),
            Record::Purchase(e) => Some(e.ttl_secs()),
        }
    }

    pub fn user_id(&self) -> u64 {
        match self {
            Record::User(p) => p.user_id,
            Record::Message(e) => e.user_id,
            Record::Reaction(e) => e.user_id,
            Record::Voice(e) => e.user_id,
            Record::Claim(e) => e.user_id,
            Record::Purchase(e) => e.user_id,
        }
    }

    /// 该记录贡献的经验值，撤销时取反
    pub fn xp_value(&self) -> f64 {
        match self {
            Record::Message(e) => e.xp_value,
            Record::Reaction(e) => e.xp_value,
            Record::Voice(e) => e.xp_value,
            Record::User(_) | Record::Claim(_) | Record::Purchase(_) => 0.0,
        }
    }

    /// 将只存在于键中的身份字段合并回记录，键优先
    pub fn absorb_key(&mut self, key: &EntityKey) -> Result<()> {
        if key.kind() != self.kind() {
            return Err(SyncError::InvalidKey(format!(
                "key '{}' does not belong to {} records",
                key,
                self.kind()
            )));
        }
        match self {
            Record::User(p) => {
                p.user_id = key.part_u64(0)?;
                Ok(())
            }
            Record::Message(e) => e.absorb_key(key),
            Record::Reaction(e) => e.absorb_key(key),
            Record::Voice(e) => e.absorb_key(key),
            Record::Claim(e) => e.absorb_key(key),
            Record::Purchase(e) => e.absorb_key(key),
        }
    }
}
