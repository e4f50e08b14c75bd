use std::collections::HashMap;

use tracing::debug;

/// Opaque identifier of a top-level browsing context (tab). The host may
/// reuse an id once the context is gone.
pub type ContextId = u64;

/// Last known PDF source per live browsing context.
///
/// Entries live exactly as long as their context: there is no TTL and no
/// size bound, the only eviction path is [`SourceCache::remove`] on context
/// destruction.
#[derive(Debug, Default)]
pub struct SourceCache {
    records: HashMap<ContextId, String>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `url` for the context. Last writer wins regardless of the
    /// confidence of the signal that produced it.
    pub fn put(&mut self, context_id: ContextId, url: impl Into<String>) {
        let url = url.into();
        if let Some(previous) = self.records.insert(context_id, url.clone()) {
            if previous != url {
                debug!(
                    "Source for context {} replaced: {} -> {}",
                    context_id, previous, url
                );
            }
        }
    }

    pub fn get(&self, context_id: ContextId) -> Option<&str> {
        self.records.get(&context_id).map(String::as_str)
    }

    pub fn remove(&mut self, context_id: ContextId) -> Option<String> {
        self.records.remove(&context_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
