//! Per-queue trace pipeline: pops raw records from an [`octf_ring::Ring`],
//! converts them to typed [`octf_proto::gen::Event`]s, and serializes them
//! to a memory-mapped, varint-length-delimited file per queue.

mod affinity;
mod converter;
mod pipeline;
mod reader;
mod serializer;
mod varint;

pub use affinity::{pin_current_thread, QueueAffinity};
pub use converter::{ConvertError, Converter, FnConverter};
pub use pipeline::{PipelineError, SessionState, Summary, TraceExecutor, TracePipeline};
pub use reader::{EventReader, ReaderError};
pub use serializer::{Serializer, SerializerError};
pub use varint::{decode_u32, encode_u32, VarintError, MAX_ENCODED_LEN};
