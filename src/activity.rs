//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 活跃度规则：消息、表情回应和语音时长转换为经验，并记录事件日志。

use crate::cache::{EventLogBuffer, ProfileRepository, XpOutcome};
use crate::config::LevelingConfig;
use crate::error::{Result, SyncError};
use crate::model::{
    EntityKey, EntityKind, EventRecord, MessageEvent, ReactionEvent, Record, VoiceSessionEvent,
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// 撤销事件的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Reversal {
    pub key: EntityKey,
    pub record: Record,
    /// 扣回经验后的档案变化
    pub outcome: XpOutcome,
}

/// 语音会话跟踪
///
/// 进入时间只保存在进程内存中，进程重启后未结束的会话会丢失
#[derive(Debug, Default)]
pub struct VoiceSessionTracker {
    joined: DashMap<u64, i64>,
}

impl VoiceSessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录进入时间，重复进入时保留最早的时间
    pub fn join(&self, user_id: u64, now: i64) {
        self.joined.entry(user_id).or_insert(now);
    }

    /// 结束会话，返回进入时间
    pub fn leave(&self, user_id: u64) -> Option<i64> {
        self.joined.remove(&user_id).map(|(_, started)| started)
    }

    pub fn is_active(&self, user_id: u64) -> bool {
        self.joined.contains_key(&user_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.joined.len()
    }
}

/// 活跃度规则
pub struct ActivityRules {
    repository: Arc<ProfileRepository>,
    buffer: Arc<EventLogBuffer>,
    xp_per_message: f64,
    xp_per_reaction: f64,
    xp_per_voice_minute: f64,
    voice: VoiceSessionTracker,
}

impl ActivityRules {
    pub fn new(
        repository: Arc<ProfileRepository>,
        buffer: Arc<EventLogBuffer>,
        config: &LevelingConfig,
    ) -> Self {
        Self {
            repository,
            buffer,
            xp_per_message: config.xp_per_message,
            xp_per_reaction: config.xp_per_reaction,
            xp_per_voice_minute: config.xp_per_voice_minute,
            voice: VoiceSessionTracker::new(),
        }
    }

    pub fn voice_sessions(&self) -> &VoiceSessionTracker {
        &self.voice
    }

    /// 新消息：增加经验并记录消息事件
    #[instrument(skip(self), level = "debug")]
    pub async fn on_message(&self, user_id: u64, message_id: u64, now: i64) -> Result<XpOutcome> {
        let outcome = self
            .repository
            .apply_xp_delta(user_id, self.xp_per_message)
            .await?;
        let event = MessageEvent {
            message_id,
            user_id,
            xp_value: self.xp_per_message,
            timestamp: now,
        };
        self.buffer.record(&event.into_record()).await?;
        Ok(outcome)
    }

    /// 消息被删除：事件仍在缓冲区时扣回经验
    pub async fn on_message_deleted(&self, message_id: u64) -> Result<Option<Reversal>> {
        let key = EntityKey::new(EntityKind::Message, vec![message_id.to_string()])?;
        self.reverse(&key).await
    }

    /// 新的表情回应
    #[instrument(skip(self), level = "debug")]
    pub async fn on_reaction_added(
        &self,
        message_id: u64,
        user_id: u64,
        emoji: &str,
        now: i64,
    ) -> Result<XpOutcome> {
        let event = ReactionEvent {
            message_id,
            user_id,
            emoji: emoji.to_string(),
            xp_value: self.xp_per_reaction,
            timestamp: now,
        };
        // 先校验键，避免加了经验却无法记录事件
        event.key()?;
        let outcome = self
            .repository
            .apply_xp_delta(user_id, self.xp_per_reaction)
            .await?;
        self.buffer.record(&event.into_record()).await?;
        Ok(outcome)
    }

    /// 表情回应被移除
    pub async fn on_reaction_removed(
        &self,
        message_id: u64,
        user_id: u64,
        emoji: &str,
    ) -> Result<Option<Reversal>> {
        let key = EntityKey::new(
            EntityKind::Reaction,
            vec![message_id.to_string(), user_id.to_string(), emoji.to_string()],
        )?;
        self.reverse(&key).await
    }

    /// 进入语音频道
    pub fn voice_join(&self, user_id: u64, now: i64) {
        self.voice.join(user_id, now);
        debug!("User {} joined voice at {}", user_id, now);
    }

    /// 离开语音频道：按整分钟计算经验
    ///
    /// 没有对应的进入记录或不足一分钟时只结束会话，不记录事件
    #[instrument(skip(self), level = "debug")]
    pub async fn voice_leave(&self, user_id: u64, now: i64) -> Result<Option<XpOutcome>> {
        let Some(started) = self.voice.leave(user_id) else {
            return Ok(None);
        };
        let whole_minutes = (now - started).max(0) / 60;
        if whole_minutes == 0 {
            debug!("User {} left voice after less than a minute", user_id);
            return Ok(None);
        }
        let minutes = whole_minutes as f64;
        let xp_value = minutes * self.xp_per_voice_minute;
        let outcome = self.repository.apply_xp_delta(user_id, xp_value).await?;
        let event = VoiceSessionEvent {
            user_id,
            session_start: started,
            minutes,
            xp_value,
            timestamp: now,
        };
        self.buffer.record(&event.into_record()).await?;
        Ok(Some(outcome))
    }

    /// 撤销仍在缓冲区中的事件并扣回其经验
    ///
    /// 事件已同步（不在KV中）时返回 None，经验保持不变
    #[instrument(skip(self), level = "debug")]
    pub async fn reverse(&self, key: &EntityKey) -> Result<Option<Reversal>> {
        if !key.kind().is_event_log() {
            return Err(SyncError::Validation(format!(
                "{} records cannot be reversed",
                key.kind()
            )));
        }
        let Some(record) = self.buffer.lookup(key).await? else {
            return Ok(None);
        };
        // 只有真正删除了条目的一方扣回经验
        if !self.buffer.remove(key).await? {
            return Ok(None);
        }
        let outcome = self
            .repository
            .apply_xp_delta(record.user_id(), -record.xp_value())
            .await?;
        Ok(Some(Reversal {
            key: key.clone(),
            record,
            outcome,
        }))
    }
}
