//! Per-trace key→message cache (§4.10): a single protobuf file holding a
//! list of `google.protobuf.Any`-packed (key, value) pairs. Lookup compares
//! the packed key bytes, not the decoded message, so any `Message` works as
//! a key without needing `PartialEq` beyond prost's derive.

use crate::error::RepositoryError;
use octf_proto::any;
use octf_proto::gen::{CacheEntry, SimpleKey, SimpleValue, TraceCache};
use prost::Message;
use std::path::{Path, PathBuf};

const CACHE_FILE: &str = "octf.cache";

/// A single trace's cache file. Every `read`/`write` reloads and rewrites
/// the whole file: callers are expected to hold exclusive access to the
/// trace for the duration, matching the original's single-writer
/// assumption (§4.10).
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    pub fn open(trace_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: trace_dir.into().join(CACHE_FILE),
        }
    }

    fn load(&self) -> Result<TraceCache, RepositoryError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(TraceCache::decode(bytes.as_slice())?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(TraceCache::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, cache: &TraceCache) -> Result<(), RepositoryError> {
        let tmp = self.path.with_extension("cache.tmp");
        std::fs::write(&tmp, cache.encode_to_vec())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn read(&self, key: &impl Message) -> Result<Option<Vec<u8>>, RepositoryError> {
        let cache = self.load()?;
        let key_bytes = key.encode_to_vec();
        Ok(cache
            .entries
            .iter()
            .find(|entry| entry.key.as_ref().is_some_and(|k| k.value == key_bytes))
            .and_then(|entry| entry.value.as_ref())
            .map(|v| v.value.clone()))
    }

    pub fn write(
        &self,
        key: &impl Message,
        key_type: &str,
        value: &impl Message,
        value_type: &str,
    ) -> Result<(), RepositoryError> {
        let mut cache = self.load()?;
        let key_bytes = key.encode_to_vec();
        let entry = CacheEntry {
            key: Some(any::pack(key_type, key)),
            value: Some(any::pack(value_type, value)),
        };

        match cache
            .entries
            .iter_mut()
            .find(|e| e.key.as_ref().is_some_and(|k| k.value == key_bytes))
        {
            Some(existing) => *existing = entry,
            None => cache.entries.push(entry),
        }
        self.save(&cache)
    }

    pub fn read_string_keyed(&self, key: &str) -> Result<Option<u64>, RepositoryError> {
        let bytes = self.read(&SimpleKey { key: key.to_string() })?;
        match bytes {
            Some(bytes) => Ok(Some(SimpleValue::decode(bytes.as_slice())?.value)),
            None => Ok(None),
        }
    }

    pub fn write_string_keyed(&self, key: &str, value: u64) -> Result<(), RepositoryError> {
        self.write(
            &SimpleKey { key: key.to_string() },
            "SimpleKey",
            &SimpleValue { value },
            "SimpleValue",
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_string_keyed_round_trips() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(dir.path());
        cache.write_string_keyed("hit_count", 42).unwrap();
        assert_eq!(cache.read_string_keyed("hit_count").unwrap(), Some(42));
        assert_eq!(cache.read_string_keyed("missing").unwrap(), None);
    }

    #[test]
    fn write_overwrites_an_existing_key() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(dir.path());
        cache.write_string_keyed("k", 1).unwrap();
        cache.write_string_keyed("k", 2).unwrap();
        assert_eq!(cache.read_string_keyed("k").unwrap(), Some(2));
    }
}
