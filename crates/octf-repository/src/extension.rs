//! Extension store (§4.11): compute-once, read-many side-car streams of
//! per-parsed-event annotations, written by an [`ExtensionBuilder`] and
//! read back later by analytics queries without recomputing them.
//!
//! Reuses [`octf_trace::Serializer`]/[`octf_trace::EventReader`] for the
//! on-disk varint-length-delimited framing (§6: `octf.ext.<name>`), the
//! same as queue event files, just with an `ExtensionHeader` record first.

use crate::parsed_io::ParsedEvent;
use octf_proto::any::{self, AnyError};
use octf_proto::gen::{ExtensionHeader, ExtensionRecord};
use octf_trace::{EventReader, ReaderError, Serializer, SerializerError};
use prost::Message;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ExtensionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serializer(#[from] SerializerError),
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error(transparent)]
    Any(#[from] AnyError),
    #[error("extension records must be written in non-decreasing sid order, got {sid} after {last}")]
    OutOfOrder { sid: u64, last: u64 },
    #[error("extension file has no header record")]
    MissingHeader,
    #[error("extension record has no packed annotation")]
    MissingAnnotation,
}

fn extension_path(trace_dir: &Path, name: &str) -> PathBuf {
    trace_dir.join(format!("octf.ext.{name}"))
}

/// One-shot writer for a named extension. Buffers records in memory and
/// writes the whole side-car on [`ExtensionWriter::commit`], since the
/// final header needs the min/max sid and count known only once every
/// record has been produced.
pub struct ExtensionWriter {
    final_path: PathBuf,
    name: String,
    records: Vec<ExtensionRecord>,
    min_sid: Option<u64>,
    max_sid: Option<u64>,
}

impl ExtensionWriter {
    /// Opens a writer for `name` under `trace_dir`, unless the extension
    /// already exists and `force` is not set, in which case `None` is
    /// returned so the caller can skip the (expensive) compute.
    ///
    /// "Stale" is not otherwise defined for this framework: an existing
    /// extension file is trusted as-is once present, matching §4.11's
    /// "if the extension already exists and is not stale, skip the
    /// compute" for the common case of a terminal trace whose events never
    /// change again. Callers computing against a still-`running` trace
    /// should pass `force = true`.
    pub fn open(trace_dir: &Path, name: &str, force: bool) -> Result<Option<Self>, ExtensionError> {
        let final_path = extension_path(trace_dir, name);
        if final_path.exists() && !force {
            return Ok(None);
        }
        Ok(Some(Self {
            final_path,
            name: name.to_string(),
            records: Vec::new(),
            min_sid: None,
            max_sid: None,
        }))
    }

    /// Appends one annotation at `sid`. Sids must be non-decreasing (§3
    /// "Extension" invariant).
    pub fn write(&mut self, sid: u64, type_name: &str, annotation: &impl Message) -> Result<(), ExtensionError> {
        if let Some(last) = self.max_sid {
            if sid < last {
                return Err(ExtensionError::OutOfOrder { sid, last });
            }
        }
        self.min_sid.get_or_insert(sid);
        self.max_sid = Some(sid);
        self.records.push(ExtensionRecord {
            sid,
            annotation: Some(any::pack(type_name, annotation)),
        });
        Ok(())
    }

    /// Writes the header and every buffered record to a temp file, then
    /// renames it into place so a concurrent reader never observes a
    /// partial extension.
    pub fn commit(self) -> Result<(), ExtensionError> {
        let header = ExtensionHeader {
            name: self.name,
            min_sid: self.min_sid.unwrap_or(0),
            max_sid: self.max_sid.unwrap_or(0),
            entry_count: self.records.len() as u64,
        };
        let tmp = self.final_path.with_extension("tmp");
        let mut ser = Serializer::create(&tmp)?;
        ser.write_message(&header)?;
        for record in &self.records {
            ser.write_message(record)?;
        }
        ser.close()?;
        std::fs::rename(&tmp, &self.final_path)?;
        Ok(())
    }

    /// Discards a partially built extension, e.g. after a compute error.
    pub fn abandon(self) {}
}

/// Read-many counterpart of [`ExtensionWriter`]: yields `(sid, annotation)`
/// pairs in strictly increasing sid order.
pub struct ExtensionReader {
    name: String,
    header: ExtensionHeader,
    reader: EventReader,
    next: Option<ExtensionRecord>,
}

impl ExtensionReader {
    pub fn open(trace_dir: &Path, name: &str) -> Result<Self, ExtensionError> {
        let path = extension_path(trace_dir, name);
        let mut reader = EventReader::open(&path)?;
        let header = reader
            .next::<ExtensionHeader>()?
            .ok_or(ExtensionError::MissingHeader)?;
        let mut me = Self {
            name: name.to_string(),
            header,
            reader,
            next: None,
        };
        me.advance()?;
        Ok(me)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &ExtensionHeader {
        &self.header
    }

    fn advance(&mut self) -> Result<(), ExtensionError> {
        self.next = self.reader.next::<ExtensionRecord>()?;
        Ok(())
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn peek_next_sid(&self) -> Option<u64> {
        self.next.as_ref().map(|r| r.sid)
    }

    /// Decodes and consumes the next record as `T`, tagged `type_name`.
    pub fn read<T: Message + Default>(&mut self, type_name: &str) -> Result<Option<(u64, T)>, ExtensionError> {
        let Some(record) = self.next.take() else {
            return Ok(None);
        };
        let any = record.annotation.ok_or(ExtensionError::MissingAnnotation)?;
        let value = any::unpack(type_name, &any)?;
        self.advance()?;
        Ok(Some((record.sid, value)))
    }
}

/// Merges several [`ExtensionReader`]s into one sid-ordered stream, keyed
/// by next sid and breaking ties by extension name (§4.11).
pub struct MergingReader {
    readers: Vec<ExtensionReader>,
}

impl MergingReader {
    pub fn new(readers: Vec<ExtensionReader>) -> Self {
        Self { readers }
    }

    /// Index of the reader holding the globally-next record, or `None` if
    /// every reader is exhausted.
    pub fn next_reader_index(&self) -> Option<usize> {
        let mut heap: BinaryHeap<Reverse<(u64, String, usize)>> = BinaryHeap::new();
        for (i, r) in self.readers.iter().enumerate() {
            if let Some(sid) = r.peek_next_sid() {
                heap.push(Reverse((sid, r.name().to_string(), i)));
            }
        }
        heap.pop().map(|Reverse((_, _, i))| i)
    }

    pub fn reader_mut(&mut self, index: usize) -> &mut ExtensionReader {
        &mut self.readers[index]
    }
}

/// Declares one compute pass over a trace's parsed-IO stream, owning
/// whatever running state it needs (§9 open question: "builder owns state,
/// steps see the same builder" — both concrete builders below need exactly
/// one pass, so that single `step` method *is* the builder's state machine).
pub trait ExtensionBuilder {
    fn name(&self) -> &str;
    fn step(&mut self, event: &ParsedEvent, writer: &mut ExtensionWriter) -> Result<(), ExtensionError>;
}

/// Drives `builder` over `events`, writing its annotations to a fresh
/// extension and committing at the end. Returns `Ok(false)` without
/// touching `events` if an up-to-date extension already exists.
pub fn build_extension<B: ExtensionBuilder>(
    builder: &mut B,
    trace_dir: &Path,
    events: impl Iterator<Item = ParsedEvent>,
    force: bool,
) -> Result<bool, ExtensionError> {
    let Some(mut writer) = ExtensionWriter::open(trace_dir, builder.name(), force)? else {
        return Ok(false);
    };
    for event in events {
        if let Err(err) = builder.step(&event, &mut writer) {
            writer.abandon();
            return Err(err);
        }
    }
    writer.commit()?;
    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;
    use octf_proto::gen::LruAnnotation;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips_in_order() {
        let dir = tempdir().unwrap();
        let mut writer = ExtensionWriter::open(dir.path(), "lru", false).unwrap().unwrap();
        writer.write(1, "LruAnnotation", &LruAnnotation { hit: true }).unwrap();
        writer.write(3, "LruAnnotation", &LruAnnotation { hit: false }).unwrap();
        writer.commit().unwrap();

        let mut reader = ExtensionReader::open(dir.path(), "lru").unwrap();
        assert_eq!(reader.header().entry_count, 2);
        assert_eq!(reader.peek_next_sid(), Some(1));
        let (sid, ann) = reader.read::<LruAnnotation>("LruAnnotation").unwrap().unwrap();
        assert_eq!(sid, 1);
        assert!(ann.hit);
        let (sid, ann) = reader.read::<LruAnnotation>("LruAnnotation").unwrap().unwrap();
        assert_eq!(sid, 3);
        assert!(!ann.hit);
        assert!(!reader.has_next());
    }

    #[test]
    fn out_of_order_write_is_rejected() {
        let dir = tempdir().unwrap();
        let mut writer = ExtensionWriter::open(dir.path(), "lru", false).unwrap().unwrap();
        writer.write(5, "LruAnnotation", &LruAnnotation { hit: true }).unwrap();
        let err = writer.write(1, "LruAnnotation", &LruAnnotation { hit: true }).unwrap_err();
        assert!(matches!(err, ExtensionError::OutOfOrder { .. }));
    }

    #[test]
    fn existing_extension_is_skipped_unless_forced() {
        let dir = tempdir().unwrap();
        let mut writer = ExtensionWriter::open(dir.path(), "lru", false).unwrap().unwrap();
        writer.write(1, "LruAnnotation", &LruAnnotation { hit: true }).unwrap();
        writer.commit().unwrap();

        assert!(ExtensionWriter::open(dir.path(), "lru", false).unwrap().is_none());
        assert!(ExtensionWriter::open(dir.path(), "lru", true).unwrap().is_some());
    }

    #[test]
    fn merging_reader_orders_by_sid_then_name() {
        let dir = tempdir().unwrap();
        let mut a = ExtensionWriter::open(dir.path(), "a", false).unwrap().unwrap();
        a.write(2, "LruAnnotation", &LruAnnotation { hit: true }).unwrap();
        a.commit().unwrap();
        let mut b = ExtensionWriter::open(dir.path(), "b", false).unwrap().unwrap();
        b.write(2, "LruAnnotation", &LruAnnotation { hit: false }).unwrap();
        b.commit().unwrap();

        let readers = vec![
            ExtensionReader::open(dir.path(), "a").unwrap(),
            ExtensionReader::open(dir.path(), "b").unwrap(),
        ];
        let merged = MergingReader::new(readers);
        let idx = merged.next_reader_index().unwrap();
        assert_eq!(merged.readers[idx].name(), "a");
    }
}
