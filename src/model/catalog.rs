//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 商城商品目录。商品只存在于持久层，不经过KV缓存。

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// 商品目录集合
pub const CATALOG_COLLECTION: &str = "marketplace_items";

fn default_description() -> String {
    "No description".to_string()
}

fn default_available() -> bool {
    true
}

/// 商城商品，以名称唯一标识
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketItem {
    pub name: String,
    pub price: i64,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub created_at: i64,
}

impl MarketItem {
    pub fn new(name: &str, price: i64, description: Option<&str>, created_at: i64) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::Validation("item name must not be empty".to_string()));
        }
        validate_price(price)?;
        Ok(Self {
            name: name.to_string(),
            price,
            description: description
                .map(str::to_string)
                .unwrap_or_else(default_description),
            available: true,
            created_at,
        })
    }
}

/// 价格不能为负
pub fn validate_price(price: i64) -> Result<()> {
    if price < 0 {
        return Err(SyncError::Validation(format!(
            "item price must not be negative, got {}",
            price
        )));
    }
    Ok(())
}

/// 商品修改内容，至少包含一项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub price: Option<i64>,
    pub description: Option<String>,
}

impl ItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.description.is_none()
    }
}
