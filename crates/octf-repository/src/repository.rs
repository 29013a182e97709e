//! Enumerates, opens, and removes traces rooted at `Config::traces_dir`
//! (§4.10). Each trace is a directory holding a `summary` file (an encoded
//! `TraceSummary`), one event file per queue, an optional `octf.cache`, and
//! any number of extension streams.

use crate::error::RepositoryError;
use octf_config::Config;
use octf_proto::gen::{TraceState, TraceSummary};
use prost::Message;
use std::path::{Path, PathBuf};

const SUMMARY_FILE: &str = "summary";

pub struct Repository {
    config: Config,
}

/// One trace directory with its parsed, validated summary.
pub struct TraceHandle {
    pub path: PathBuf,
    pub summary: TraceSummary,
}

impl TraceHandle {
    /// Paths of the per-queue event files (§6: `octf.trace.<queue_id>`),
    /// one per `summary.queue_count`, in queue-id order. Used to feed the
    /// Parsed-IO assembler's k-way merge.
    pub fn queue_paths(&self) -> Vec<PathBuf> {
        (0..self.summary.queue_count)
            .map(|queue_id| self.path.join(format!("octf.trace.{queue_id}")))
            .collect()
    }

    pub fn cache(&self) -> crate::cache::Cache {
        crate::cache::Cache::open(&self.path)
    }
}

impl Repository {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// `prefix` with a trailing `*` lists every immediate child of that
    /// directory; without it, an exact match. Only traces whose summary
    /// parses and validates are returned; a directory with a missing or
    /// broken summary is silently skipped (§4.10).
    pub fn list(&self, prefix: &str) -> Result<Vec<TraceHandle>, RepositoryError> {
        let (dir, wildcard) = match prefix.strip_suffix('*') {
            Some(base) => (base.trim_end_matches('/'), true),
            None => (prefix, false),
        };
        let root = self.config.trace_dir(dir);

        if !wildcard {
            return Ok(self.open(&root).into_iter().collect());
        }

        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(handle) = self.open(&entry.path()) {
                    out.push(handle);
                }
            }
        }
        Ok(out)
    }

    fn open(&self, dir: &Path) -> Option<TraceHandle> {
        let summary = read_summary(dir).ok()?;
        validate_summary(&summary).ok()?;
        Some(TraceHandle {
            path: dir.to_path_buf(),
            summary,
        })
    }

    /// Opens exactly one trace, erroring rather than skipping on a missing
    /// or invalid summary.
    pub fn get(&self, path: &str) -> Result<TraceHandle, RepositoryError> {
        let dir = self.config.trace_dir(path);
        let summary = read_summary(&dir)?;
        validate_summary(&summary)?;
        Ok(TraceHandle { path: dir, summary })
    }

    /// Refuses to remove a trace whose state is not terminal (`Complete` or
    /// `Error`) unless `force` is set.
    pub fn remove(&self, path: &str, force: bool) -> Result<(), RepositoryError> {
        let dir = self.config.trace_dir(path);
        let summary = read_summary(&dir)?;

        let terminal = matches!(
            TraceState::try_from(summary.state),
            Ok(TraceState::Complete) | Ok(TraceState::Error)
        );
        if !terminal && !force {
            return Err(RepositoryError::NotTerminal { path: path.to_string() });
        }

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}

fn read_summary(dir: &Path) -> Result<TraceSummary, RepositoryError> {
    let bytes = std::fs::read(dir.join(SUMMARY_FILE))
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                RepositoryError::NotFound(dir.display().to_string())
            }
            _ => RepositoryError::Io(err),
        })?;
    Ok(TraceSummary::decode(bytes.as_slice())?)
}

fn validate_summary(summary: &TraceSummary) -> Result<(), RepositoryError> {
    if summary.source_node_path.is_empty() {
        return Err(RepositoryError::InvalidSummary("source path must not be empty"));
    }
    if summary.queue_count < 1 {
        return Err(RepositoryError::InvalidSummary("queue_count must be at least 1"));
    }
    if summary.start_date_rfc3339.is_empty() {
        return Err(RepositoryError::InvalidSummary("start date must not be empty"));
    }
    Ok(())
}

/// Persists `summary` into `dir/summary`, writing to a temp file then
/// renaming so a reader never observes a partial write.
pub fn write_summary(dir: &Path, summary: &TraceSummary) -> Result<(), RepositoryError> {
    std::fs::create_dir_all(dir)?;
    let tmp = dir.join(format!("{SUMMARY_FILE}.tmp"));
    std::fs::write(&tmp, summary.encode_to_vec())?;
    std::fs::rename(&tmp, dir.join(SUMMARY_FILE))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn valid_summary() -> TraceSummary {
        TraceSummary {
            source_node_path: vec!["root".to_string(), "disk0".to_string()],
            queue_count: 2,
            duration_ms: 1000,
            start_date_rfc3339: "2026-01-01T00:00:00Z".to_string(),
            state: TraceState::Complete as i32,
            major_version: 1,
            error_text: String::new(),
        }
    }

    fn config(dir: &Path) -> Config {
        Config::new(dir.join("sock"), dir.join("traces"), dir.join("settings")).unwrap()
    }

    #[test]
    fn get_rejects_missing_queue_count() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let mut summary = valid_summary();
        summary.queue_count = 0;
        write_summary(&cfg.trace_dir("t1"), &summary).unwrap();

        let repo = Repository::new(cfg);
        let err = repo.get("t1").unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidSummary(_)));
    }

    #[test]
    fn list_with_wildcard_returns_only_valid_children() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        write_summary(&cfg.trace_dir("group/a"), &valid_summary()).unwrap();
        std::fs::create_dir_all(cfg.trace_dir("group/b")).unwrap();

        let repo = Repository::new(cfg);
        let found = repo.list("group/*").unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("a"));
    }

    #[test]
    fn remove_refuses_non_terminal_trace_without_force() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let mut summary = valid_summary();
        summary.state = TraceState::Running as i32;
        write_summary(&cfg.trace_dir("t1"), &summary).unwrap();

        let repo = Repository::new(cfg);
        let err = repo.remove("t1", false).unwrap_err();
        assert!(matches!(err, RepositoryError::NotTerminal { .. }));
        repo.remove("t1", true).unwrap();
        assert!(repo.get("t1").is_err());
    }
}
