use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{integrations::FeedValue, models::SensorKind};

/// In-process copy of the most recent sample per sensor kind.
///
/// Cheap to clone; every clone shares the same map.
#[derive(Clone, Default)]
pub struct SensorCache {
    inner: Arc<RwLock<HashMap<SensorKind, FeedValue>>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sample` unless the cache already holds a newer one.
    pub async fn update(&self, kind: SensorKind, sample: FeedValue) {
        let mut inner = self.inner.write().await;
        match inner.get(&kind) {
            Some(existing) if existing.created_at >= sample.created_at => {}
            _ => {
                inner.insert(kind, sample);
            }
        }
    }

    pub async fn get(&self, kind: SensorKind) -> Option<FeedValue> {
        self.inner.read().await.get(&kind).cloned()
    }

    /// Latest sample if it is no older than `max_age` at `now`.
    pub async fn fresh(
        &self,
        kind: SensorKind,
        now: DateTime<Utc>,
        max_age: chrono::Duration,
    ) -> Option<FeedValue> {
        self.get(kind)
            .await
            .filter(|sample| now - sample.created_at <= max_age)
    }
}
