//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 用户档案仓库：读穿透、写回KV、按用户串行化的读改写。

use crate::backend::KvStore;
use crate::database::{DurableStore, Filter};
use crate::error::{Result, SyncError};
use crate::model::{EntityKey, EntityKind, LevelCurve, Record, UserProfile};
use crate::serialization::RecordCodec;
use crate::utils::{bounded, KeyedLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 经验变更结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XpOutcome {
    pub leveled_up: bool,
    pub previous_level: u32,
    pub new_level: u32,
    pub xp: f64,
}

/// 用户档案仓库
///
/// 档案常驻KV且没有TTL；KV未命中时从持久层加载并回填。
/// 所有修改只写KV，由同步引擎异步落盘。
pub struct ProfileRepository {
    kv: Arc<dyn KvStore>,
    durable: Arc<dyn DurableStore>,
    codec: RecordCodec,
    curve: LevelCurve,
    starting_balance: i64,
    op_timeout: Duration,
    locks: KeyedLock<u64>,
}

impl ProfileRepository {
    pub fn new(
        kv: Arc<dyn KvStore>,
        durable: Arc<dyn DurableStore>,
        codec: RecordCodec,
        curve: LevelCurve,
        starting_balance: i64,
        op_timeout: Duration,
    ) -> Self {
        Self {
            kv,
            durable,
            codec,
            curve,
            starting_balance,
            op_timeout,
            locks: KeyedLock::new(),
        }
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    fn key(user_id: u64) -> Result<EntityKey> {
        EntityKey::new(EntityKind::User, vec![user_id.to_string()])
    }

    /// 获取用户档案
    ///
    /// KV命中直接返回；未命中时从持久层加载（去掉存储内部字段），以无TTL方式写回KV。
    /// 两层都没有时返回 None。
    #[instrument(skip(self), level = "debug")]
    pub async fn get_profile(&self, user_id: u64) -> Result<Option<UserProfile>> {
        let key = Self::key(user_id)?;
        if let Some(profile) = self.read_cached(&key).await? {
            return Ok(Some(profile));
        }
        // 回填与修改互斥，避免旧数据覆盖刚写入的档案
        let _guard = self.locks.lock(user_id).await;
        self.load(&key, user_id).await
    }

    async fn read_cached(&self, key: &EntityKey) -> Result<Option<UserProfile>> {
        let raw = key.encode();
        let Some(bytes) = bounded(self.op_timeout, "kv get", self.kv.get(&raw)).await? else {
            return Ok(None);
        };
        match self.codec.decode_entry(key, &bytes)? {
            Record::User(profile) => Ok(Some(profile)),
            other => Err(SyncError::decode(
                raw,
                format!("expected a profile, found {}", other.kind()),
            )),
        }
    }

    /// 在持有用户锁时调用
    async fn load(&self, key: &EntityKey, user_id: u64) -> Result<Option<UserProfile>> {
        if let Some(profile) = self.read_cached(key).await? {
            return Ok(Some(profile));
        }
        let filter = Filter::eq("user_id", user_id);
        let document = bounded(
            self.op_timeout,
            "durable find_one",
            self.durable
                .find_one(EntityKind::User.collection(), &filter),
        )
        .await?;
        let Some(document) = document else {
            return Ok(None);
        };
        let mut profile = match self.codec.from_document(EntityKind::User, document)? {
            Record::User(profile) => profile,
            other => {
                return Err(SyncError::decode(
                    key.encode(),
                    format!("expected a profile, found {}", other.kind()),
                ))
            }
        };
        profile.user_id = user_id;
        let xp = profile.xp;
        profile.set_xp(xp, &self.curve);
        self.store(&profile).await?;
        debug!("Profile {} loaded from durable store into cache", user_id);
        Ok(Some(profile))
    }

    async fn store(&self, profile: &UserProfile) -> Result<()> {
        let key = Self::key(profile.user_id)?.encode();
        let bytes = self.codec.encode(&Record::User(profile.clone()))?;
        bounded(self.op_timeout, "kv set", self.kv.set(&key, bytes, None)).await
    }

    /// 对档案执行串行化的读改写，档案不存在时以默认值创建
    ///
    /// `mutate` 返回错误时不写回任何内容
    pub async fn update<F>(&self, user_id: u64, mutate: F) -> Result<UserProfile>
    where
        F: FnOnce(&mut UserProfile) -> Result<()>,
    {
        let key = Self::key(user_id)?;
        let _guard = self.locks.lock(user_id).await;
        let mut profile = match self.load(&key, user_id).await? {
            Some(profile) => profile,
            None => UserProfile::new(user_id, self.starting_balance),
        };
        mutate(&mut profile)?;
        self.store(&profile).await?;
        Ok(profile)
    }

    /// 增减经验并重新计算等级
    ///
    /// # 返回值
    ///
    /// 是否升级以及新的等级
    #[instrument(skip(self), level = "debug")]
    pub async fn apply_xp_delta(&self, user_id: u64, delta: f64) -> Result<XpOutcome> {
        if !delta.is_finite() {
            return Err(SyncError::Validation(format!(
                "xp delta must be finite, got {}",
                delta
            )));
        }
        let curve = self.curve;
        let mut previous_level = 1;
        let profile = self
            .update(user_id, |profile| {
                previous_level = curve.level_for(profile.xp);
                let xp = profile.xp + delta;
                profile.set_xp(xp, &curve);
                Ok(())
            })
            .await?;
        let outcome = XpOutcome {
            leveled_up: profile.level > previous_level,
            previous_level,
            new_level: profile.level,
            xp: profile.xp,
        };
        if outcome.leveled_up {
            info!(
                "User {} leveled up: {} -> {}",
                user_id, previous_level, outcome.new_level
            );
        }
        Ok(outcome)
    }

    /// 增减余额
    ///
    /// `floor_at_zero` 为 true 时结果截断到0；否则结果为负会被拒绝且不修改任何内容
    #[instrument(skip(self), level = "debug")]
    pub async fn apply_balance_delta(
        &self,
        user_id: u64,
        delta: i64,
        floor_at_zero: bool,
    ) -> Result<i64> {
        let profile = self
            .update(user_id, |profile| {
                let next = profile.balance.checked_add(delta).ok_or_else(|| {
                    SyncError::Validation(format!("balance overflow for user {}", user_id))
                })?;
                if next < 0 && !floor_at_zero {
                    return Err(SyncError::Validation(format!(
                        "insufficient balance for user {}: have {}, change {}",
                        user_id, profile.balance, delta
                    )));
                }
                profile.balance = next.max(0);
                Ok(())
            })
            .await?;
        Ok(profile.balance)
    }

    /// 设置等级：经验被设为该等级的最低经验，等级仍由经验推导
    #[instrument(skip(self), level = "debug")]
    pub async fn set_level(&self, user_id: u64, level: u32) -> Result<UserProfile> {
        if level < 1 {
            return Err(SyncError::Validation("level must be at least 1".to_string()));
        }
        let curve = self.curve;
        let xp = curve.xp_for_level(level) as f64;
        self.update(user_id, |profile| {
            profile.set_xp(xp, &curve);
            Ok(())
        })
        .await
    }
}
