//! Auto-refreshing read handle over a cache.

use super::EmbeddingCache;
use crate::error::EngineResult;
use std::sync::Arc;

/// Read handle that reloads the cache before access when a newer artifact
/// was persisted on disk.
///
/// Long-running processes hold one of these on their query paths, so an
/// update or pull performed elsewhere becomes visible without a restart.
#[derive(Clone)]
pub struct CacheHandle {
    cache: Arc<EmbeddingCache>,
}

impl CacheHandle {
    #[must_use]
    pub fn new(cache: Arc<EmbeddingCache>) -> Self {
        Self { cache }
    }

    /// The cache, refreshed if a newer artifact exists.
    ///
    /// Refresh failures are logged; the handle then serves the matrix it
    /// already holds.
    pub fn get(&self) -> &EmbeddingCache {
        if let Err(e) = self.cache.reload_if_stale() {
            tracing::warn!("cache refresh failed: {e}");
        }
        &self.cache
    }

    /// Probes for a newer artifact, returning whether a reload happened.
    pub fn refresh(&self) -> EngineResult<bool> {
        self.cache.reload_if_stale()
    }

    /// The shared cache without a refresh probe.
    #[must_use]
    pub fn inner(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Timestamps, parse_timestamp};
    use crate::config::Settings;
    use crate::corpus::InMemoryCorpus;
    use crate::encoder::{MockEmbeddingGenerator, SentenceEncoder};
    use crate::types::{Paper, PaperId};
    use tempfile::TempDir;

    fn paper(id: u32, title: &str) -> Paper {
        Paper::new(
            PaperId::new(id).unwrap(),
            format!("10.1000/{id}"),
            title.to_string(),
            "An abstract.".to_string(),
        )
    }

    fn cache_at(settings: &Settings) -> EmbeddingCache {
        let encoder = Arc::new(SentenceEncoder::new(Arc::new(MockEmbeddingGenerator::new())));
        EmbeddingCache::open(settings, encoder).unwrap()
    }

    #[test]
    fn test_handle_sees_updates_from_another_instance() {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.workspace_root = Some(temp.path().to_path_buf());

        let corpus = InMemoryCorpus::from_papers(vec![paper(1, "First")]);
        let writer = cache_at(&settings);
        writer.update(&corpus, false).unwrap();

        let handle = CacheHandle::new(Arc::new(cache_at(&settings)));
        assert_eq!(handle.get().len(), 1);

        corpus.insert(paper(2, "Second"));
        writer.update(&corpus, false).unwrap();
        let ts_path = settings.cache_dir().join(Timestamps::FILE_NAME);
        let mut stamps = Timestamps::load(&ts_path).unwrap();
        stamps.set("sentence", parse_timestamp("2099-01-01 00:00:00").unwrap());
        stamps.save(&ts_path).unwrap();

        assert_eq!(handle.get().len(), 2);
    }
}
