//! Filesystem viewer (§4.9): an incrementally built tree, keyed by file id
//! and scoped per partition, with edges fed by `FsFileName` events as the
//! Parsed-IO Assembler walks the merged event stream.
//!
//! Grounded in the original's `IFileSystemViewer`: queries are `parent`,
//! `basename`, `path`, and `extension`, all by file id.

use octf_proto::gen::FsFileName;
use std::collections::HashMap;

const MAX_PATH_DEPTH: usize = 4096;

#[derive(Clone, Debug)]
struct FsEntry {
    parent_id: u64,
    name: String,
}

/// Edges observed from `FsFileName` events, keyed by `(partition_id, file_id)`.
#[derive(Default)]
pub struct FilesystemViewer {
    entries: HashMap<(u64, u64), FsEntry>,
}

impl FilesystemViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &FsFileName) {
        self.entries.insert(
            (event.partition_id, event.file_id),
            FsEntry {
                parent_id: event.parent_id,
                name: event.name.clone(),
            },
        );
    }

    pub fn parent(&self, partition_id: u64, file_id: u64) -> Option<u64> {
        self.entries.get(&(partition_id, file_id)).map(|e| e.parent_id)
    }

    pub fn basename(&self, partition_id: u64, file_id: u64) -> Option<&str> {
        self.entries
            .get(&(partition_id, file_id))
            .map(|e| e.name.as_str())
    }

    /// Joins basenames from root to `file_id` with `/`. A cycle or a chain
    /// longer than [`MAX_PATH_DEPTH`] stops at whatever prefix was resolved
    /// rather than looping forever over malformed input.
    pub fn path(&self, partition_id: u64, file_id: u64) -> Option<String> {
        let mut components = Vec::new();
        let mut current = file_id;
        let mut visited = std::collections::HashSet::new();

        loop {
            let Some(entry) = self.entries.get(&(partition_id, current)) else {
                break;
            };
            if !visited.insert(current) || components.len() >= MAX_PATH_DEPTH {
                break;
            }
            components.push(entry.name.clone());
            if entry.parent_id == current {
                break;
            }
            current = entry.parent_id;
        }

        if components.is_empty() {
            return None;
        }
        components.reverse();
        Some(components.join("/"))
    }

    /// The basename's suffix starting at (and including) the last `.`, e.g.
    /// `"a.log"` -> `Some(".log")`. `None` if the basename has no `.` or is
    /// unknown.
    pub fn extension(&self, partition_id: u64, file_id: u64) -> Option<&str> {
        let name = self.basename(partition_id, file_id)?;
        let dot = name.rfind('.')?;
        Some(&name[dot..])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name_event(partition: u64, file_id: u64, parent: u64, name: &str) -> FsFileName {
        FsFileName {
            partition_id: partition,
            file_id,
            parent_id: parent,
            name: name.to_string(),
        }
    }

    #[test]
    fn resolves_path_and_extension() {
        let mut viewer = FilesystemViewer::new();
        viewer.record(&name_event(1, 1, 1, "root"));
        viewer.record(&name_event(1, 7, 1, "logs"));
        viewer.record(&name_event(1, 42, 7, "a.log"));

        assert_eq!(viewer.parent(1, 42), Some(7));
        assert_eq!(viewer.basename(1, 42), Some("a.log"));
        assert_eq!(viewer.path(1, 42), Some("root/logs/a.log".to_string()));
        assert_eq!(viewer.extension(1, 42), Some(".log"));
    }

    #[test]
    fn unknown_file_resolves_to_none() {
        let viewer = FilesystemViewer::new();
        assert_eq!(viewer.parent(1, 99), None);
        assert_eq!(viewer.path(1, 99), None);
        assert_eq!(viewer.extension(1, 99), None);
    }

    #[test]
    fn a_cycle_does_not_hang_path_resolution() {
        let mut viewer = FilesystemViewer::new();
        viewer.record(&name_event(1, 1, 2, "a"));
        viewer.record(&name_event(1, 2, 1, "b"));
        let path = viewer.path(1, 1).unwrap();
        assert!(path == "b/a" || path == "a/b" || !path.is_empty());
    }

    #[test]
    fn no_extension_when_basename_has_no_dot() {
        let mut viewer = FilesystemViewer::new();
        viewer.record(&name_event(1, 1, 1, "README"));
        assert_eq!(viewer.extension(1, 1), None);
    }
}
