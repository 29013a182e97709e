//! Read-only counterpart to [`crate::Serializer`]: walks the varint
//! length-delimited stream a serializer wrote, decoding each record as a
//! caller-chosen `prost::Message`.

use crate::varint::decode_u32;
use memmap2::Mmap;
use prost::Message;
use std::fs::File;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ReaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated or corrupt length prefix at offset {offset}")]
    BadLengthPrefix { offset: u64 },
    #[error("failed to decode record at offset {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: prost::DecodeError,
    },
}

/// A read-only memory-mapped view over one event file, yielding records in
/// the order they were written.
pub struct EventReader {
    mmap: Mmap,
    offset: usize,
}

impl EventReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap, offset: 0 })
    }

    /// Decodes and returns the next record, or `None` at end of stream.
    pub fn next<T: Message + Default>(&mut self) -> Result<Option<T>, ReaderError> {
        if self.offset >= self.mmap.len() {
            return Ok(None);
        }

        let start = self.offset as u64;
        let buf = &self.mmap[self.offset..];
        let (len, consumed) = decode_u32(buf).map_err(|_| ReaderError::BadLengthPrefix { offset: start })?;
        let payload_start = self.offset + consumed;
        let payload_end = payload_start + len as usize;
        if payload_end > self.mmap.len() {
            return Err(ReaderError::BadLengthPrefix { offset: start });
        }

        let msg = T::decode(&self.mmap[payload_start..payload_end])
            .map_err(|source| ReaderError::Decode { offset: start, source })?;
        self.offset = payload_end;
        Ok(Some(msg))
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.mmap.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Serializer;
    use octf_proto::gen::SimpleValue;
    use tempfile::tempdir;

    #[test]
    fn reads_back_every_record_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events");

        let mut ser = Serializer::create(&path).unwrap();
        for v in 0..500u64 {
            ser.write_message(&SimpleValue { value: v }).unwrap();
        }
        ser.close().unwrap();

        let mut reader = EventReader::open(&path).unwrap();
        let mut count = 0u64;
        while let Some(msg) = reader.next::<SimpleValue>().unwrap() {
            assert_eq!(msg.value, count);
            count += 1;
        }
        assert_eq!(count, 500);
        assert!(reader.is_at_end());
    }

    #[test]
    fn empty_file_yields_no_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events");
        Serializer::create(&path).unwrap().close().unwrap();

        let mut reader = EventReader::open(&path).unwrap();
        assert!(reader.next::<SimpleValue>().unwrap().is_none());
    }
}
