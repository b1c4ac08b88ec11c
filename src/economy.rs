//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 经济系统：每日/每周奖励领取、商城目录与购买。

use crate::cache::{EventLogBuffer, ProfileRepository};
use crate::config::EconomyConfig;
use crate::database::{DurableStore, Filter, INTERNAL_ID_FIELD};
use crate::error::{Result, SyncError};
use crate::model::catalog::validate_price;
use crate::model::{
    ClaimType, EconomyClaim, EntityKind, EventRecord, ItemUpdate, MarketItem, PurchaseEvent,
    Record, CATALOG_COLLECTION,
};
use crate::serialization::{Document, RecordCodec};
use crate::utils::{bounded, KeyedLock};
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// 领取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Granted { amount: i64, new_balance: i64 },
    OnCooldown { remaining_secs: i64 },
}

/// 经济系统
pub struct Economy {
    repository: Arc<ProfileRepository>,
    buffer: Arc<EventLogBuffer>,
    durable: Arc<dyn DurableStore>,
    codec: RecordCodec,
    config: EconomyConfig,
    op_timeout: Duration,
    /// 同一用户的领取串行执行，冷却检查与记录之间不会插入第二次领取
    claims: KeyedLock<u64>,
    /// 同名商品的目录修改串行执行
    catalog: KeyedLock<String>,
}

impl Economy {
    pub fn new(
        repository: Arc<ProfileRepository>,
        buffer: Arc<EventLogBuffer>,
        durable: Arc<dyn DurableStore>,
        codec: RecordCodec,
        config: EconomyConfig,
        op_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            buffer,
            durable,
            codec,
            config,
            op_timeout,
            claims: KeyedLock::new(),
            catalog: KeyedLock::new(),
        }
    }

    fn base_reward(&self, claim_type: ClaimType) -> i64 {
        match claim_type {
            ClaimType::Daily => self.config.daily_reward,
            ClaimType::Weekly => self.config.weekly_reward,
        }
    }

    /// 按等级计算奖励：base + trunc(base × multiplier × level)
    pub fn reward_for(&self, claim_type: ClaimType, level: u32) -> i64 {
        let base = self.base_reward(claim_type);
        base + (base as f64 * self.config.level_multiplier * level as f64).trunc() as i64
    }

    /// 领取奖励
    ///
    /// 冷却时间以持久层和缓冲区中最新的一次领取为准
    #[instrument(skip(self), level = "debug")]
    pub async fn claim(&self, user_id: u64, claim_type: ClaimType, now: i64) -> Result<ClaimOutcome> {
        let _guard = self.claims.lock(user_id).await;

        if let Some(last) = self.last_claim_time(user_id, claim_type).await? {
            let elapsed = now - last;
            let cooldown = claim_type.cooldown_secs();
            if elapsed < cooldown {
                return Ok(ClaimOutcome::OnCooldown {
                    remaining_secs: cooldown - elapsed,
                });
            }
        }

        let mut amount = 0;
        let profile = self
            .repository
            .update(user_id, |profile| {
                amount = self.reward_for(claim_type, profile.level);
                profile.balance = profile.balance.checked_add(amount).ok_or_else(|| {
                    SyncError::Validation(format!("balance overflow for user {}", user_id))
                })?;
                Ok(())
            })
            .await?;

        let claim = EconomyClaim {
            user_id,
            claim_type,
            claim_time: now,
            amount,
        };
        self.buffer.record(&claim.into_record()).await?;
        info!(
            "User {} claimed {} reward of {}",
            user_id, claim_type, amount
        );
        Ok(ClaimOutcome::Granted {
            amount,
            new_balance: profile.balance,
        })
    }

    /// 最近一次领取时间
    pub async fn last_claim_time(&self, user_id: u64, claim_type: ClaimType) -> Result<Option<i64>> {
        let filter = Filter::eq("user_id", user_id).and("claim_type", claim_type.as_str());
        let documents = bounded(
            self.op_timeout,
            "durable find",
            self.durable
                .find(EntityKind::Claim.collection(), &filter, None),
        )
        .await?;
        let mut newest = documents
            .iter()
            .filter_map(|doc| doc.get("claim_time").and_then(|v| v.as_i64()))
            .max();

        let leading = vec![claim_type.as_str().to_string(), user_id.to_string()];
        let entries: Vec<_> = self
            .buffer
            .scan_matching(EntityKind::Claim, &leading)?
            .try_collect()
            .await?;
        for entry in &entries {
            match self.buffer.decode(entry) {
                Ok((_, Record::Claim(claim))) => {
                    newest = newest.max(Some(claim.claim_time));
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable claim {}: {}", entry.key, e),
            }
        }
        Ok(newest)
    }

    /// 按名称查询商品
    pub async fn get_item(&self, name: &str) -> Result<Option<MarketItem>> {
        let document = bounded(
            self.op_timeout,
            "durable find",
            self.durable
                .find_one(CATALOG_COLLECTION, &Filter::eq("name", name)),
        )
        .await?;
        document.map(item_from_document).transpose()
    }

    async fn require_item(&self, name: &str) -> Result<MarketItem> {
        self.get_item(name).await?.ok_or_else(|| {
            SyncError::Validation(format!("item '{}' not found in marketplace", name))
        })
    }

    async fn save_item(&self, item: &MarketItem) -> Result<()> {
        let document = item_to_document(item)?;
        bounded(
            self.op_timeout,
            "durable upsert",
            self.durable
                .upsert(CATALOG_COLLECTION, &Filter::eq("name", item.name.as_str()), document),
        )
        .await
    }

    /// 上架新商品，同名商品已存在时拒绝
    #[instrument(skip(self, description), level = "debug")]
    pub async fn add_item(
        &self,
        name: &str,
        price: i64,
        description: Option<&str>,
        now: i64,
    ) -> Result<MarketItem> {
        let item = MarketItem::new(name, price, description, now)?;
        let _guard = self.catalog.lock(item.name.clone()).await;
        if self.get_item(&item.name).await?.is_some() {
            return Err(SyncError::Validation(format!(
                "item '{}' already exists in marketplace",
                item.name
            )));
        }
        self.save_item(&item).await?;
        info!("Marketplace item '{}' added at {}", item.name, item.price);
        Ok(item)
    }

    /// 下架商品
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_item(&self, name: &str) -> Result<()> {
        let _guard = self.catalog.lock(name.to_string()).await;
        let removed = bounded(
            self.op_timeout,
            "durable delete",
            self.durable
                .delete(CATALOG_COLLECTION, &Filter::eq("name", name)),
        )
        .await?;
        if removed == 0 {
            return Err(SyncError::Validation(format!(
                "item '{}' not found in marketplace",
                name
            )));
        }
        info!("Marketplace item '{}' removed", name);
        Ok(())
    }

    /// 修改价格或描述
    #[instrument(skip(self), level = "debug")]
    pub async fn update_item(&self, name: &str, update: ItemUpdate) -> Result<MarketItem> {
        if update.is_empty() {
            return Err(SyncError::Validation(
                "no updates provided: specify a price and/or a description".to_string(),
            ));
        }
        if let Some(price) = update.price {
            validate_price(price)?;
        }
        let _guard = self.catalog.lock(name.to_string()).await;
        let mut item = self.require_item(name).await?;
        if let Some(price) = update.price {
            item.price = price;
        }
        if let Some(description) = update.description {
            item.description = description;
        }
        self.save_item(&item).await?;
        Ok(item)
    }

    /// 切换上架状态，返回新的状态
    #[instrument(skip(self), level = "debug")]
    pub async fn toggle_item(&self, name: &str) -> Result<bool> {
        let _guard = self.catalog.lock(name.to_string()).await;
        let mut item = self.require_item(name).await?;
        item.available = !item.available;
        self.save_item(&item).await?;
        info!(
            "Marketplace item '{}' is now {}",
            name,
            if item.available { "available" } else { "unavailable" }
        );
        Ok(item.available)
    }

    /// 列出商品，按名称排序；`available_only` 时只返回可购买的商品
    pub async fn list_items(&self, available_only: bool) -> Result<Vec<MarketItem>> {
        let documents = bounded(
            self.op_timeout,
            "durable find",
            self.durable
                .find(CATALOG_COLLECTION, &Filter::default(), None),
        )
        .await?;
        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            match item_from_document(document) {
                Ok(item) if available_only && !item.available => {}
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping unreadable marketplace item: {}", e),
            }
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    /// 购买商品
    ///
    /// 价格取自商品目录；商品不存在、已下架或余额不足时拒绝且不修改任何内容
    #[instrument(skip(self), level = "debug")]
    pub async fn purchase(&self, user_id: u64, item_name: &str, now: i64) -> Result<PurchaseEvent> {
        let item = self.require_item(item_name).await?;
        if !item.available {
            return Err(SyncError::Validation(format!(
                "item '{}' is currently unavailable",
                item.name
            )));
        }
        let new_balance = self
            .repository
            .apply_balance_delta(user_id, -item.price, false)
            .await?;
        let event = PurchaseEvent {
            user_id,
            purchase_time: now,
            item_name: item.name.clone(),
            item_price: item.price,
            new_balance,
            timestamp: now,
        };
        self.buffer.record(&event.clone().into_record()).await?;
        info!("User {} bought '{}' for {}", user_id, item.name, item.price);
        Ok(event)
    }

    /// 已落盘的购买记录，最新的在前
    pub async fn purchase_history(&self, user_id: u64, limit: u64) -> Result<Vec<PurchaseEvent>> {
        let documents = bounded(
            self.op_timeout,
            "durable find",
            self.durable.find(
                EntityKind::Purchase.collection(),
                &Filter::eq("user_id", user_id),
                Some(limit),
            ),
        )
        .await?;
        let mut history = Vec::with_capacity(documents.len());
        for document in documents {
            match self.codec.from_document(EntityKind::Purchase, document) {
                Ok(Record::Purchase(event)) => history.push(event),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable purchase for user {}: {}", user_id, e),
            }
        }
        Ok(history)
    }
}

fn item_to_document(item: &MarketItem) -> Result<Document> {
    match serde_json::to_value(item).map_err(|e| SyncError::Serialization(e.to_string()))? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(SyncError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn item_from_document(mut document: Document) -> Result<MarketItem> {
    document.remove(INTERNAL_ID_FIELD);
    serde_json::from_value(serde_json::Value::Object(document))
        .map_err(|e| SyncError::decode(CATALOG_COLLECTION, e))
}
