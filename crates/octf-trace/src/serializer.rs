use crate::varint::{encode_u32, MAX_ENCODED_LEN};
use memmap2::MmapMut;
use prost::Message;
use std::fs::{File, OpenOptions};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum SerializerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("message exceeds the 32-bit varint length prefix")]
    MessageTooLarge,
}

const DEFAULT_WINDOW_PAGES: u64 = 256; // 1 MiB windows on a 4 KiB page.

/// Append-only protobuf stream: a 32-bit varint length prefix followed by
/// the payload bytes, repeated. The file is grown and remapped in
/// page-aligned windows rather than mapped once at a fixed size, so an
/// unbounded trace doesn't require knowing its final size up front.
pub struct Serializer {
    file: File,
    mmap: MmapMut,
    window_len: u64,
    file_len: u64,
    write_offset: u64,
}

impl Serializer {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SerializerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let page_size = page_size();
        let window_len = page_size * DEFAULT_WINDOW_PAGES;
        file.set_len(window_len)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            file,
            mmap,
            window_len,
            file_len: window_len,
            write_offset: 0,
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.write_offset
    }

    pub fn write_message(&mut self, msg: &impl Message) -> Result<(), SerializerError> {
        let encoded = msg.encode_to_vec();
        self.write_bytes(&encoded)
    }

    pub fn write_bytes(&mut self, blob: &[u8]) -> Result<(), SerializerError> {
        if blob.len() > u32::MAX as usize {
            return Err(SerializerError::MessageTooLarge);
        }

        let mut len_buf = [0u8; MAX_ENCODED_LEN];
        let len_bytes = encode_u32(blob.len() as u32, &mut len_buf);

        self.ensure_capacity(len_bytes as u64 + blob.len() as u64)?;

        let start = self.write_offset as usize;
        self.mmap[start..start + len_bytes].copy_from_slice(&len_buf[..len_bytes]);
        let payload_start = start + len_bytes;
        self.mmap[payload_start..payload_start + blob.len()].copy_from_slice(blob);

        self.write_offset += (len_bytes + blob.len()) as u64;
        Ok(())
    }

    fn ensure_capacity(&mut self, additional: u64) -> Result<(), SerializerError> {
        if self.write_offset + additional <= self.file_len {
            return Ok(());
        }

        self.mmap.flush()?;
        let needed = self.write_offset + additional;
        let windows = needed.div_ceil(self.window_len);
        let new_len = windows * self.window_len;

        self.file.set_len(new_len)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.file_len = new_len;
        Ok(())
    }

    /// Truncates the backing file to exactly the bytes written and drops
    /// the mapping. Consumes `self` so a closed serializer cannot be
    /// written to again.
    pub fn close(mut self) -> Result<(), SerializerError> {
        self.mmap.flush()?;
        self.file.set_len(self.write_offset)?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    // SAFETY: sysconf with _SC_PAGESIZE has no preconditions.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}

#[cfg(not(target_os = "linux"))]
fn page_size() -> u64 {
    4096
}

#[cfg(test)]
mod test {
    use super::*;
    use octf_proto::gen::SimpleValue;
    use tempfile::tempdir;

    #[test]
    fn write_and_reread_length_delimited_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events");

        {
            let mut ser = Serializer::create(&path).unwrap();
            for v in 0..1000u64 {
                ser.write_message(&SimpleValue { value: v }).unwrap();
            }
            ser.close().unwrap();
        }

        let bytes = std::fs::read(&path).unwrap();
        let mut offset = 0usize;
        let mut count = 0u64;
        while offset < bytes.len() {
            let (len, consumed) = crate::varint::decode_u32(&bytes[offset..]).unwrap();
            offset += consumed;
            let msg = SimpleValue::decode(&bytes[offset..offset + len as usize]).unwrap();
            assert_eq!(msg.value, count);
            offset += len as usize;
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    #[test]
    fn write_past_window_boundary_remaps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events");
        let mut ser = Serializer::create(&path).unwrap();

        let blob = vec![0x42u8; 64 * 1024];
        for _ in 0..64 {
            ser.write_bytes(&blob).unwrap();
        }
        let expected = ser.bytes_written();
        ser.close().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), expected);
    }
}
