//! Parsed-IO assembler (§4.9): reconstructs logical I/Os from the raw,
//! per-queue event streams a trace session wrote, merging them into one
//! globally ordered (by `EventHeader.sid`) stream and correlating each
//! `IoRequest` with its eventual `IoCompletion`.
//!
//! Exposed as a plain [`Iterator`] rather than an async stream: spec.md's
//! scope for presentation ("the core exposes iterable parsed-event
//! streams") names an iterable, and every other reader in this workspace
//! (`octf_trace::EventReader`) already pulls synchronously.

use crate::fs_viewer::FilesystemViewer;
use octf_proto::gen::{Event, EventPayload, IoDirection, TraceSummary};
use octf_trace::{EventReader, ReaderError};
use std::collections::HashMap;
use std::path::Path;

/// `major_version` values this assembler can parse. The original source's
/// parser dispatch shares one code path for versions 0 and 4; lacking a
/// stated reason, we treat 0 as a legacy alias of 4 (documented as an open
/// question in spec.md §9) rather than inventing a distinct format for it.
pub const SUPPORTED_MAJOR_VERSIONS: [u32; 2] = [0, 4];

#[derive(thiserror::Error, Debug)]
pub enum ParsedIoError {
    #[error("unsupported trace major version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// A reconstructed logical I/O (§3 "Parsed IO").
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedEvent {
    pub sid: u64,
    pub device_id: u64,
    pub request_id: u64,
    pub lba: u64,
    pub len: u64,
    pub direction: IoDirection,
    pub partition: u32,
    /// `None` when the stream ended before a matching completion arrived.
    pub latency_ns: Option<u64>,
    /// Device queue depth observed at submission time. Meaningless (and not
    /// populated) when an LBA subrange filter is active (§4.9).
    pub queue_depth: Option<u32>,
    pub fs: Option<FsAttribution>,
    /// Set when end-of-stream was reached with this request still pending.
    pub no_completion: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FsAttribution {
    pub file_id: u64,
    pub parent_path: Option<String>,
    pub extension: Option<String>,
}

/// Optional exclusive LBA subrange; I/Os that do not overlap `[start, end)`
/// are dropped (§4.9).
#[derive(Clone, Copy, Debug)]
pub struct LbaRange {
    pub start: u64,
    pub end: u64,
}

impl LbaRange {
    fn overlaps(&self, lba: u64, len: u64) -> bool {
        let io_end = lba.saturating_add(len);
        lba < self.end && io_end > self.start
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AssemblerOptions {
    pub lba_range: Option<LbaRange>,
    /// Subtracted from every event's `timestamp_ns` to normalize to
    /// start-of-trace.
    pub time_offset_ns: Option<u64>,
}

struct InFlight {
    arrival_ns: u64,
    queue_depth: u32,
    lba: u64,
    len: u64,
    direction: IoDirection,
    partition: u32,
}

/// One queue's event file plus the next record peeked off it, so the
/// k-way merge can always compare the lowest not-yet-consumed sid across
/// every queue.
struct QueueCursor {
    reader: EventReader,
    next: Option<Event>,
}

impl QueueCursor {
    fn open(path: &Path) -> Result<Self, ParsedIoError> {
        let mut reader = EventReader::open(path)?;
        let next = reader.next::<Event>()?;
        Ok(Self { reader, next })
    }

    fn peek_sid(&self) -> Option<u64> {
        self.next.as_ref().and_then(|e| e.header.as_ref()).map(|h| h.sid)
    }

    fn advance(&mut self) -> Result<Option<Event>, ParsedIoError> {
        let taken = self.next.take();
        self.next = self.reader.next::<Event>()?;
        Ok(taken)
    }
}

/// Merges every queue file in a trace into one sid-ordered stream of
/// [`ParsedEvent`]s, correlating `IoRequest`/`IoCompletion` pairs and
/// filesystem attribution along the way.
pub struct Assembler {
    cursors: Vec<QueueCursor>,
    options: AssemblerOptions,
    in_flight: HashMap<(u64, u64), InFlight>,
    queue_depth: HashMap<u64, u32>,
    request_to_file: HashMap<u64, u64>,
    viewer: FilesystemViewer,
    pending_output: std::collections::VecDeque<ParsedEvent>,
    dropped_completions: u64,
    finished_merge: bool,
}

impl Assembler {
    pub fn open(
        summary: &TraceSummary,
        queue_paths: &[impl AsRef<Path>],
        options: AssemblerOptions,
    ) -> Result<Self, ParsedIoError> {
        if !SUPPORTED_MAJOR_VERSIONS.contains(&summary.major_version) {
            return Err(ParsedIoError::UnsupportedVersion(summary.major_version));
        }
        let cursors = queue_paths
            .iter()
            .map(|p| QueueCursor::open(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            cursors,
            options,
            in_flight: HashMap::new(),
            queue_depth: HashMap::new(),
            request_to_file: HashMap::new(),
            viewer: FilesystemViewer::new(),
            pending_output: std::collections::VecDeque::new(),
            dropped_completions: 0,
            finished_merge: false,
        })
    }

    /// Number of `IoCompletion`s seen with no matching in-flight request.
    pub fn dropped_completions(&self) -> u64 {
        self.dropped_completions
    }

    pub fn filesystem_viewer(&self) -> &FilesystemViewer {
        &self.viewer
    }

    fn normalize(&self, timestamp_ns: u64) -> u64 {
        match self.options.time_offset_ns {
            Some(offset) => timestamp_ns.saturating_sub(offset),
            None => timestamp_ns,
        }
    }

    /// Pops the globally-next event (lowest sid across every queue cursor).
    fn next_merged(&mut self) -> Result<Option<Event>, ParsedIoError> {
        let Some((idx, _)) = self
            .cursors
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.peek_sid().map(|sid| (i, sid)))
            .min_by_key(|&(_, sid)| sid)
        else {
            return Ok(None);
        };
        self.cursors[idx].advance()
    }

    /// Drives the merge and in-flight correlation until it has a
    /// `ParsedEvent` ready to hand back, or the stream is exhausted.
    fn fill(&mut self) -> Result<(), ParsedIoError> {
        while self.pending_output.is_empty() && !self.finished_merge {
            let Some(event) = self.next_merged()? else {
                self.finished_merge = true;
                self.flush_unmatched();
                break;
            };
            let Some(header) = event.header else { continue };
            let sid = header.sid;
            let timestamp_ns = self.normalize(header.timestamp_ns);

            match event.payload {
                Some(EventPayload::IoRequest(req)) => {
                    let overlaps = self
                        .options
                        .lba_range
                        .map(|r| r.overlaps(req.lba, req.len))
                        .unwrap_or(true);
                    if !overlaps {
                        continue;
                    }
                    let direction = IoDirection::try_from(req.direction).unwrap_or(IoDirection::Unspecified);
                    let depth = if self.options.lba_range.is_some() {
                        0
                    } else {
                        let d = self.queue_depth.entry(req.device_id).or_insert(0);
                        *d += 1;
                        *d
                    };
                    self.in_flight.insert(
                        (req.device_id, req.request_id),
                        InFlight {
                            arrival_ns: timestamp_ns,
                            queue_depth: depth,
                            lba: req.lba,
                            len: req.len,
                            direction,
                            partition: req.partition,
                        },
                    );
                }
                Some(EventPayload::IoCompletion(comp)) => {
                    let Some(inflight) = self.in_flight.remove(&(comp.device_id, comp.request_id)) else {
                        self.dropped_completions += 1;
                        continue;
                    };
                    if self.options.lba_range.is_none() {
                        if let Some(d) = self.queue_depth.get_mut(&comp.device_id) {
                            *d = d.saturating_sub(1);
                        }
                    }
                    let fs = self
                        .request_to_file
                        .remove(&comp.request_id)
                        .map(|file_id| self.fs_attribution(inflight.partition as u64, file_id));
                    self.pending_output.push_back(ParsedEvent {
                        sid,
                        device_id: comp.device_id,
                        request_id: comp.request_id,
                        lba: inflight.lba,
                        len: inflight.len,
                        direction: inflight.direction,
                        partition: inflight.partition,
                        latency_ns: Some(timestamp_ns.saturating_sub(inflight.arrival_ns)),
                        queue_depth: (self.options.lba_range.is_none()).then_some(inflight.queue_depth),
                        fs,
                        no_completion: false,
                    });
                }
                Some(EventPayload::FsMeta(meta)) => {
                    self.request_to_file.insert(meta.request_id, meta.file_id);
                }
                Some(EventPayload::FsFileName(name)) => {
                    self.viewer.record(&name);
                }
                Some(EventPayload::DeviceDescription(_)) | Some(EventPayload::FsFileEvent(_)) | None => {}
            }
        }
        Ok(())
    }

    fn fs_attribution(&self, partition_id: u64, file_id: u64) -> FsAttribution {
        FsAttribution {
            file_id,
            parent_path: self.viewer.path(partition_id, file_id),
            extension: self.viewer.extension(partition_id, file_id).map(String::from),
        }
    }

    /// End of stream reached with requests still outstanding (§4.9 "End-of-
    /// stream with live requests"): emit each with `latency_ns = None` and
    /// `no_completion = true`, in an unspecified (hash-map iteration) order
    /// among themselves since there is no further sid to order them by.
    fn flush_unmatched(&mut self) {
        for ((_device_id, request_id), inflight) in self.in_flight.drain() {
            let fs = self
                .request_to_file
                .remove(&request_id)
                .map(|file_id| self.fs_attribution(inflight.partition as u64, file_id));
            self.pending_output.push_back(ParsedEvent {
                sid: u64::MAX,
                device_id: 0,
                request_id,
                lba: inflight.lba,
                len: inflight.len,
                direction: inflight.direction,
                partition: inflight.partition,
                latency_ns: None,
                queue_depth: None,
                fs,
                no_completion: true,
            });
        }
    }
}

impl Iterator for Assembler {
    type Item = Result<ParsedEvent, ParsedIoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(err) = self.fill() {
            return Some(Err(err));
        }
        self.pending_output.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use octf_proto::gen::{EventHeader, FsFileName, FsMeta, IoCompletion, IoRequest};
    use octf_trace::Serializer;
    use tempfile::tempdir;

    fn summary(major: u32) -> TraceSummary {
        TraceSummary {
            source_node_path: vec!["root".into()],
            queue_count: 1,
            duration_ms: 0,
            start_date_rfc3339: "2026-01-01T00:00:00Z".into(),
            state: 0,
            major_version: major,
            error_text: String::new(),
        }
    }

    fn write_events(path: &std::path::Path, events: Vec<Event>) {
        let mut ser = Serializer::create(path).unwrap();
        for e in events {
            ser.write_message(&e).unwrap();
        }
        ser.close().unwrap();
    }

    fn ev(sid: u64, ts: u64, payload: EventPayload) -> Event {
        Event {
            header: Some(EventHeader { sid, timestamp_ns: ts, queue_id: 0 }),
            payload: Some(payload),
        }
    }

    #[test]
    fn request_completion_pair_yields_latency() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q0");
        write_events(
            &path,
            vec![
                ev(0, 100, EventPayload::IoRequest(IoRequest {
                    device_id: 1,
                    request_id: 9,
                    lba: 0,
                    len: 8,
                    direction: IoDirection::Write as i32,
                    partition: 0,
                })),
                ev(1, 350, EventPayload::IoCompletion(IoCompletion {
                    device_id: 1,
                    request_id: 9,
                    error: false,
                })),
            ],
        );

        let asm = Assembler::open(&summary(4), &[path], AssemblerOptions::default()).unwrap();
        let events: Vec<_> = asm.map(Result::unwrap).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].latency_ns, Some(250));
        assert_eq!(events[0].queue_depth, Some(1));
        assert!(!events[0].no_completion);
    }

    #[test]
    fn completion_without_request_is_dropped_and_counted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q0");
        write_events(
            &path,
            vec![ev(0, 0, EventPayload::IoCompletion(IoCompletion {
                device_id: 1,
                request_id: 42,
                error: false,
            }))],
        );

        let mut asm = Assembler::open(&summary(4), &[path], AssemblerOptions::default()).unwrap();
        assert!(asm.next().is_none());
        assert_eq!(asm.dropped_completions(), 1);
    }

    #[test]
    fn unmatched_request_at_end_of_stream_is_flagged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q0");
        write_events(
            &path,
            vec![ev(0, 0, EventPayload::IoRequest(IoRequest {
                device_id: 1,
                request_id: 1,
                lba: 0,
                len: 1,
                direction: IoDirection::Read as i32,
                partition: 0,
            }))],
        );

        let asm = Assembler::open(&summary(4), &[path], AssemblerOptions::default()).unwrap();
        let events: Vec<_> = asm.map(Result::unwrap).collect();
        assert_eq!(events.len(), 1);
        assert!(events[0].no_completion);
        assert_eq!(events[0].latency_ns, None);
    }

    #[test]
    fn lba_range_drops_non_overlapping_ios() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q0");
        write_events(
            &path,
            vec![
                ev(0, 0, EventPayload::IoRequest(IoRequest {
                    device_id: 1,
                    request_id: 1,
                    lba: 100,
                    len: 10,
                    direction: IoDirection::Read as i32,
                    partition: 0,
                })),
                ev(1, 10, EventPayload::IoCompletion(IoCompletion {
                    device_id: 1,
                    request_id: 1,
                    error: false,
                })),
            ],
        );

        let options = AssemblerOptions {
            lba_range: Some(LbaRange { start: 0, end: 50 }),
            time_offset_ns: None,
        };
        let asm = Assembler::open(&summary(4), &[path], options).unwrap();
        let events: Vec<_> = asm.map(Result::unwrap).collect();
        assert!(events.is_empty());
    }

    #[test]
    fn major_version_zero_is_accepted_as_legacy_alias() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q0");
        write_events(&path, vec![]);
        assert!(Assembler::open(&summary(0), &[path], AssemblerOptions::default()).is_ok());
    }

    #[test]
    fn unsupported_major_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q0");
        write_events(&path, vec![]);
        let err = Assembler::open(&summary(99), &[path], AssemblerOptions::default()).unwrap_err();
        assert!(matches!(err, ParsedIoError::UnsupportedVersion(99)));
    }

    #[test]
    fn fs_meta_and_file_name_attribute_the_parsed_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q0");
        write_events(
            &path,
            vec![
                ev(0, 0, EventPayload::FsFileName(FsFileName {
                    partition_id: 0,
                    file_id: 42,
                    parent_id: 1,
                    name: "a.log".into(),
                })),
                ev(1, 0, EventPayload::IoRequest(IoRequest {
                    device_id: 1,
                    request_id: 5,
                    lba: 0,
                    len: 8,
                    direction: IoDirection::Write as i32,
                    partition: 0,
                })),
                ev(2, 0, EventPayload::FsMeta(FsMeta { partition_id: 0, request_id: 5, file_id: 42 })),
                ev(3, 10, EventPayload::IoCompletion(IoCompletion {
                    device_id: 1,
                    request_id: 5,
                    error: false,
                })),
            ],
        );

        let asm = Assembler::open(&summary(4), &[path], AssemblerOptions::default()).unwrap();
        let events: Vec<_> = asm.map(Result::unwrap).collect();
        assert_eq!(events.len(), 1);
        let fs = events[0].fs.as_ref().unwrap();
        assert_eq!(fs.file_id, 42);
        assert_eq!(fs.extension.as_deref(), Some(".log"));
    }
}
