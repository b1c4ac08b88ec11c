//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 事件日志记录类型。

use super::{ClaimType, EntityKey, EntityKind, Record};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// 事件日志记录
///
/// 描述一种事件在KV中的键布局和保留策略
pub trait EventRecord: Sized {
    const KIND: EntityKind;

    /// 键中前缀之后的组成部分
    fn key_parts(&self) -> Vec<String>;

    /// KV保留时间
    fn ttl_secs(&self) -> u64 {
        Self::KIND.fixed_ttl().unwrap_or(super::EVENT_TTL_SECS)
    }

    /// 合并只存在于键中的身份字段
    fn absorb_key(&mut self, _key: &EntityKey) -> Result<()> {
        Ok(())
    }

    fn into_record(self) -> Record;

    fn key(&self) -> Result<EntityKey> {
        EntityKey::new(Self::KIND, self.key_parts())
    }
}

/// 消息事件，`message_id` 由键提供
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub message_id: u64,
    pub user_id: u64,
    pub xp_value: f64,
    pub timestamp: i64,
}

impl EventRecord for MessageEvent {
    const KIND: EntityKind = EntityKind::Message;

    fn key_parts(&self) -> Vec<String> {
        vec![self.message_id.to_string()]
    }

    fn absorb_key(&mut self, key: &EntityKey) -> Result<()> {
        self.message_id = key.part_u64(0)?;
        Ok(())
    }

    fn into_record(self) -> Record {
        Record::Message(self)
    }
}

/// 表情回应事件，`message_id`、`user_id`、`emoji` 由键提供
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    #[serde(default)]
    pub message_id: u64,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub emoji: String,
    pub xp_value: f64,
    pub timestamp: i64,
}

impl EventRecord for ReactionEvent {
    const KIND: EntityKind = EntityKind::Reaction;

    fn key_parts(&self) -> Vec<String> {
        vec![
            self.message_id.to_string(),
            self.user_id.to_string(),
            self.emoji.clone(),
        ]
    }

    fn absorb_key(&mut self, key: &EntityKey) -> Result<()> {
        self.message_id = key.part_u64(0)?;
        self.user_id = key.part_u64(1)?;
        self.emoji = key.part(2).unwrap_or_default().to_string();
        Ok(())
    }

    fn into_record(self) -> Record {
        Record::Reaction(self)
    }
}

/// 语音会话事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSessionEvent {
    pub user_id: u64,
    pub session_start: i64,
    pub minutes: f64,
    pub xp_value: f64,
    pub timestamp: i64,
}

impl EventRecord for VoiceSessionEvent {
    const KIND: EntityKind = EntityKind::Voice;

    fn key_parts(&self) -> Vec<String> {
        vec![self.user_id.to_string(), self.session_start.to_string()]
    }

    fn into_record(self) -> Record {
        Record::Voice(self)
    }
}

/// 奖励领取记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyClaim {
    pub user_id: u64,
    pub claim_type: ClaimType,
    pub claim_time: i64,
    pub amount: i64,
}

impl EventRecord for EconomyClaim {
    const KIND: EntityKind = EntityKind::Claim;

    fn key_parts(&self) -> Vec<String> {
        vec![
            self.claim_type.to_string(),
            self.user_id.to_string(),
            self.claim_time.to_string(),
        ]
    }

    fn ttl_secs(&self) -> u64 {
        self.claim_type.ttl_secs()
    }

    fn into_record(self) -> Record {
        Record::Claim(self)
    }
}

/// 商城购买记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub user_id: u64,
    pub purchase_time: i64,
    pub item_name: String,
    pub item_price: i64,
    pub new_balance: i64,
    pub timestamp: i64,
}

impl EventRecord for PurchaseEvent {
    const KIND: EntityKind = EntityKind::Purchase;

    fn key_parts(&self) -> Vec<String> {
        vec![self.user_id.to_string(), self.purchase_time.to_string()]
    }

    fn into_record(self) -> Record {
        Record::Purchase(self)
    }
}
