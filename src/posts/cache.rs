use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::Id;

/// The only hook the core exposes to the read cache (spec §9 "Cache
/// invalidation boundary"). Any additional invalidation a caller needs
/// (per-user flagged lists, etc.) must be modelled explicitly elsewhere —
/// this trait is deliberately narrow.
#[async_trait]
pub trait ChannelCacheInvalidator: Send + Sync {
    async fn invalidate_channel_posts(&self, channel_id: Id);
}

/// In-process invalidation sink: a monotonic generation counter per
/// channel. Read paths can compare a cached generation against
/// [`ChannelPostCache::generation`] to decide whether a cached `PostList`
/// is still valid, without the core needing to know how the cache itself
/// is shaped.
#[derive(Default)]
pub struct ChannelPostCache {
    generations: RwLock<HashMap<Id, u64>>,
}

impl ChannelPostCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self, channel_id: Id) -> u64 {
        self.generations
            .read()
            .unwrap()
            .get(&channel_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChannelCacheInvalidator for ChannelPostCache {
    async fn invalidate_channel_posts(&self, channel_id: Id) {
        let mut generations = self.generations.write().unwrap();
        *generations.entry(channel_id).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidation_bumps_generation_for_that_channel_only() {
        let cache = ChannelPostCache::new();
        let a = Id::new();
        let b = Id::new();

        assert_eq!(cache.generation(a), 0);
        cache.invalidate_channel_posts(a).await;
        assert_eq!(cache.generation(a), 1);
        assert_eq!(cache.generation(b), 0);
    }
}
