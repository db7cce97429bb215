//! In-memory message store behind the protected API

use chrono::{DateTime, Utc};
use oauth_core::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub text: String,
    /// Author, taken from the access token
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    /// Newest first
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    /// Accepts `createdAt`, `createdAt,ASC` and `createdAt,DESC`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(',') {
            Some((field, direction)) => (field.trim(), direction.trim()),
            None => (s.trim(), "ASC"),
        };
        if field != "createdAt" {
            return Err(format!("cannot sort by '{field}'"));
        }
        match direction.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    messages: BTreeMap<u64, Message>,
}

#[derive(Debug, Default)]
pub struct MessageStore {
    inner: RwLock<Inner>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self, order: SortOrder) -> Vec<Message> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner.messages.values().cloned().collect();
        messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if order == SortOrder::Desc {
            messages.reverse();
        }
        messages
    }

    pub async fn get(&self, id: u64) -> Option<Message> {
        self.inner.read().await.messages.get(&id).cloned()
    }

    /// Store a new message authored by `author`
    pub async fn create(&self, text: String, author: &Principal) -> Message {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let message = Message {
            id: inner.next_id,
            text,
            username: author.username.clone(),
            created_at: Utc::now(),
        };
        inner.messages.insert(message.id, message.clone());
        message
    }

    /// Returns false if there was no such message
    pub async fn delete(&self, id: u64) -> bool {
        self.inner.write().await.messages.remove(&id).is_some()
    }
}
