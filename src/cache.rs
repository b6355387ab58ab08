//! Codec and descriptor caches
//!
//! Shared by every connection created from the same builder. Building a codec
//! needs a round trip for descriptors plus a walk over the destination shape,
//! so both results are kept here and reused until the server reports that a
//! statement's types changed.

use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::codec::Codec;
use crate::descriptor::DescriptorPair;
use crate::driver::protocol::{Cardinality, Headers, IoFormat};

/// Identity of a statement as the server compiles it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub command: String,
    pub cardinality: Cardinality,
    pub format: IoFormat,
    pub headers: Headers,
}

/// A statement plus the destination type its codec decodes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecKey {
    pub query: QueryKey,
    pub shape: TypeId,
}

struct CodecEntry {
    codec: Arc<Codec>,
    last_access: Instant,
}

pub struct CodecCache {
    codecs: DashMap<CodecKey, CodecEntry>,
    /// Descriptors by `(input_id, output_id)`
    descriptors: DashMap<(Uuid, Uuid), Arc<DescriptorPair>>,
    /// Last descriptors seen for a statement
    queries: DashMap<QueryKey, Arc<DescriptorPair>>,
    max_codecs: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub codecs: usize,
    pub descriptor_pairs: usize,
    pub queries: usize,
    /// Codec lookups that avoided a build
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Default for CodecCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl CodecCache {
    /// Create a cache holding at most `max_codecs` codecs.
    pub fn new(max_codecs: usize) -> Self {
        Self {
            codecs: DashMap::new(),
            descriptors: DashMap::new(),
            queries: DashMap::new(),
            max_codecs: max_codecs.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get_codec(&self, key: &CodecKey) -> Option<Arc<Codec>> {
        if let Some(mut entry) = self.codecs.get_mut(key) {
            entry.last_access = Instant::now();
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.codec.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a fully built codec and return the shared handle.
    pub fn put_codec(&self, key: CodecKey, codec: Codec) -> Arc<Codec> {
        if self.codecs.len() >= self.max_codecs && !self.codecs.contains_key(&key) {
            self.evict_lru();
        }
        let codec = Arc::new(codec);
        self.codecs.insert(
            key,
            CodecEntry {
                codec: codec.clone(),
                last_access: Instant::now(),
            },
        );
        codec
    }

    pub fn get_descriptors_by_id(&self, ids: (Uuid, Uuid)) -> Option<Arc<DescriptorPair>> {
        self.descriptors.get(&ids).map(|d| d.value().clone())
    }

    pub fn put_descriptors(&self, query: QueryKey, descriptors: Arc<DescriptorPair>) {
        self.descriptors.insert(descriptors.ids(), descriptors.clone());
        self.queries.insert(query, descriptors);
    }

    pub fn get_query_descriptors(&self, query: &QueryKey) -> Option<Arc<DescriptorPair>> {
        self.queries.get(query).map(|d| d.value().clone())
    }

    /// Forget the descriptors and every codec built for a statement.
    pub fn invalidate_query(&self, query: &QueryKey) {
        self.queries.remove(query);
        self.codecs.retain(|k, _| &k.query != query);
        debug!(command = %query.command, "invalidated cached codecs");
    }

    pub fn clear(&self) {
        self.codecs.clear();
        self.descriptors.clear();
        self.queries.clear();
    }

    fn evict_lru(&self) {
        let oldest = self
            .codecs
            .iter()
            .min_by_key(|entry| entry.last_access)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.codecs.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            codecs: self.codecs.len(),
            descriptor_pairs: self.descriptors.len(),
            queries: self.queries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
