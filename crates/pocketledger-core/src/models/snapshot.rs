use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Category, Transaction};

/// Full copy of both collections. This is also the portable export document:
/// `{ "transacoes": [...], "categorias": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    #[serde(rename = "transacoes")]
    pub transactions: Vec<Transaction>,
    #[serde(rename = "categorias")]
    pub categories: Vec<Category>,
}

impl SnapshotPayload {
    pub fn new(transactions: Vec<Transaction>, categories: Vec<Category>) -> Self {
        Self {
            transactions,
            categories,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.categories.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub payload: SnapshotPayload,
}

impl BackupSnapshot {
    pub fn new(payload: SnapshotPayload) -> Self {
        Self {
            created_at: OffsetDateTime::now_utc(),
            payload,
        }
    }
}
