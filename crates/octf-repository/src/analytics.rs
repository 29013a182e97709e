//! Derived analytics (§1: "histograms, filesystem/workload breakdowns,
//! working-set, LRU-simulated cache hit ratios") computed over a
//! [`crate::parsed_io::Assembler`]'s output and cached per-trace via
//! [`crate::cache::Cache`] so repeat queries are cheap (§8 scenario 6).

use crate::cache::Cache;
use crate::error::RepositoryError;
use crate::fs_viewer::FilesystemViewer;
use crate::parsed_io::ParsedEvent;
use octf_proto::gen::{
    FsExtensionStatsEntry, FsStatisticsByExtension, Histogram, HistogramBucket, IoDirection, SimpleKey,
};
use prost::Message;
use std::collections::HashMap;

/// Buckets `events`' latencies into `bounds` (each bucket is `<= bound`,
/// with an implicit final bucket of `u64::MAX` for anything larger).
pub fn latency_histogram<'a>(events: impl Iterator<Item = &'a ParsedEvent>, bounds: &[u64]) -> Histogram {
    let mut counts = vec![0u64; bounds.len() + 1];
    let mut count = 0u64;
    let mut sum = 0u64;

    for event in events {
        let Some(latency) = event.latency_ns else { continue };
        count += 1;
        sum += latency;
        let bucket = bounds.iter().position(|b| latency <= *b).unwrap_or(bounds.len());
        counts[bucket] += 1;
    }

    let mut buckets: Vec<HistogramBucket> = bounds
        .iter()
        .zip(counts.iter())
        .map(|(&upper_bound, &c)| HistogramBucket { upper_bound, count: c })
        .collect();
    buckets.push(HistogramBucket {
        upper_bound: u64::MAX,
        count: counts[bounds.len()],
    });

    Histogram { buckets, count, sum }
}

/// Groups written sectors by filesystem extension (§8 scenario 5), e.g.
/// `.log` -> (file_count, sectors_written). `len` is treated as a sector
/// count directly, matching the scenario's own numbers.
pub fn fs_statistics_by_extension<'a>(
    events: impl Iterator<Item = &'a ParsedEvent>,
) -> FsStatisticsByExtension {
    struct Accum {
        files: std::collections::HashSet<u64>,
        sectors_written: u64,
    }
    let mut by_extension: HashMap<String, Accum> = HashMap::new();

    for event in events {
        if event.direction != IoDirection::Write {
            continue;
        }
        let Some(fs) = &event.fs else { continue };
        let Some(extension) = &fs.extension else { continue };
        let accum = by_extension.entry(extension.clone()).or_insert_with(|| Accum {
            files: std::collections::HashSet::new(),
            sectors_written: 0,
        });
        accum.files.insert(fs.file_id);
        accum.sectors_written += event.len;
    }

    let mut entries: Vec<FsExtensionStatsEntry> = by_extension
        .into_iter()
        .map(|(extension, accum)| FsExtensionStatsEntry {
            extension,
            file_count: accum.files.len() as u64,
            sectors_written: accum.sectors_written,
        })
        .collect();
    entries.sort_by(|a, b| a.extension.cmp(&b.extension));

    FsStatisticsByExtension { entries }
}

/// Folder-level rollup for one `(partition, parent_id)`: file count and
/// sectors written among its direct children (§8 scenario 5, "fs_statistics
/// for parent 1").
pub struct FolderStatistics {
    pub file_count: u64,
    pub sectors_written: u64,
}

pub fn fs_statistics_by_parent<'a>(
    viewer: &FilesystemViewer,
    partition_id: u64,
    parent_id: u64,
    events: impl Iterator<Item = &'a ParsedEvent>,
) -> FolderStatistics {
    let mut files = std::collections::HashSet::new();
    let mut sectors_written = 0u64;

    for event in events {
        if event.direction != IoDirection::Write {
            continue;
        }
        let Some(fs) = &event.fs else { continue };
        if viewer.parent(partition_id, fs.file_id) != Some(parent_id) {
            continue;
        }
        files.insert(fs.file_id);
        sectors_written += event.len;
    }

    FolderStatistics {
        file_count: files.len() as u64,
        sectors_written,
    }
}

fn cache_key(name: &str) -> SimpleKey {
    SimpleKey { key: name.to_string() }
}

/// Reads a cached analytic by name, or computes it with `compute`, caches
/// it, and returns it (§8 scenario 6: "cache hit path").
pub fn cached<T: Message + Default>(
    cache: &Cache,
    name: &str,
    value_type: &str,
    compute: impl FnOnce() -> T,
) -> Result<T, RepositoryError> {
    let key = cache_key(name);
    if let Some(bytes) = cache.read(&key)? {
        return Ok(T::decode(bytes.as_slice())?);
    }
    let value = compute();
    cache.write(&key, "SimpleKey", &value, value_type)?;
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parsed_io::FsAttribution;
    use tempfile::tempdir;

    fn event(latency_ns: Option<u64>, direction: IoDirection, len: u64, ext: Option<&str>) -> ParsedEvent {
        ParsedEvent {
            sid: 0,
            device_id: 1,
            request_id: 1,
            lba: 0,
            len,
            direction,
            partition: 0,
            latency_ns,
            queue_depth: Some(0),
            fs: ext.map(|e| FsAttribution {
                file_id: 1,
                parent_path: None,
                extension: Some(e.to_string()),
            }),
            no_completion: false,
        }
    }

    #[test]
    fn histogram_buckets_by_latency() {
        let events = vec![
            event(Some(5), IoDirection::Read, 1, None),
            event(Some(50), IoDirection::Read, 1, None),
            event(Some(500), IoDirection::Read, 1, None),
        ];
        let hist = latency_histogram(events.iter(), &[10, 100]);
        assert_eq!(hist.count, 3);
        assert_eq!(hist.sum, 555);
        assert_eq!(hist.buckets[0].count, 1);
        assert_eq!(hist.buckets[1].count, 1);
        assert_eq!(hist.buckets[2].count, 1);
    }

    #[test]
    fn fs_breakdown_groups_by_extension() {
        let events = vec![
            event(Some(1), IoDirection::Write, 8, Some(".log")),
            event(Some(1), IoDirection::Write, 8, Some(".log")),
        ];
        let stats = fs_statistics_by_extension(events.iter());
        assert_eq!(stats.entries.len(), 1);
        assert_eq!(stats.entries[0].extension, ".log");
        assert_eq!(stats.entries[0].sectors_written, 16);
    }

    #[test]
    fn cached_computes_once_and_reuses_on_second_call() {
        let dir = tempdir().unwrap();
        let cache = Cache::open(dir.path());
        let mut calls = 0;
        for _ in 0..2 {
            let hist = cached(&cache, "latency_histogram", "Histogram", || {
                calls += 1;
                Histogram { buckets: vec![], count: 7, sum: 7 }
            })
            .unwrap();
            assert_eq!(hist.count, 7);
        }
        assert_eq!(calls, 1);
    }
}
