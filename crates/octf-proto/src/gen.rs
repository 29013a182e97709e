// Checked-in equivalent of what `prost_build`/`pbjson_build` emit from
// `proto/octf.proto`. Regenerate with `cargo build -p octf-proto --features
// generate` after editing the schema.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventHeader {
    #[prost(uint64, tag = "1")]
    pub sid: u64,
    #[prost(uint64, tag = "2")]
    pub timestamp_ns: u64,
    #[prost(uint32, tag = "3")]
    pub queue_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceDescription {
    #[prost(uint64, tag = "1")]
    pub device_id: u64,
    #[prost(string, tag = "2")]
    pub device_name: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub sector_size: u64,
    #[prost(uint64, tag = "4")]
    pub device_size_sectors: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, ::prost::Enumeration)]
#[repr(i32)]
pub enum IoDirection {
    Unspecified = 0,
    Read = 1,
    Write = 2,
    Discard = 3,
    Flush = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IoRequest {
    #[prost(uint64, tag = "1")]
    pub device_id: u64,
    #[prost(uint64, tag = "2")]
    pub request_id: u64,
    #[prost(uint64, tag = "3")]
    pub lba: u64,
    #[prost(uint64, tag = "4")]
    pub len: u64,
    #[prost(enumeration = "IoDirection", tag = "5")]
    pub direction: i32,
    #[prost(uint32, tag = "6")]
    pub partition: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IoCompletion {
    #[prost(uint64, tag = "1")]
    pub device_id: u64,
    #[prost(uint64, tag = "2")]
    pub request_id: u64,
    #[prost(bool, tag = "3")]
    pub error: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FsMeta {
    #[prost(uint64, tag = "1")]
    pub partition_id: u64,
    #[prost(uint64, tag = "2")]
    pub request_id: u64,
    #[prost(uint64, tag = "3")]
    pub file_id: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FsFileName {
    #[prost(uint64, tag = "1")]
    pub partition_id: u64,
    #[prost(uint64, tag = "2")]
    pub file_id: u64,
    #[prost(uint64, tag = "3")]
    pub parent_id: u64,
    #[prost(string, tag = "4")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, ::prost::Enumeration)]
#[repr(i32)]
pub enum FsFileEventKind {
    Unspecified = 0,
    Create = 1,
    Delete = 2,
    Move = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FsFileEvent {
    #[prost(uint64, tag = "1")]
    pub partition_id: u64,
    #[prost(uint64, tag = "2")]
    pub file_id: u64,
    #[prost(enumeration = "FsFileEventKind", tag = "3")]
    pub kind: i32,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum EventPayload {
    #[prost(message, tag = "2")]
    DeviceDescription(DeviceDescription),
    #[prost(message, tag = "3")]
    IoRequest(IoRequest),
    #[prost(message, tag = "4")]
    IoCompletion(IoCompletion),
    #[prost(message, tag = "5")]
    FsMeta(FsMeta),
    #[prost(message, tag = "6")]
    FsFileName(FsFileName),
    #[prost(message, tag = "7")]
    FsFileEvent(FsFileEvent),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<EventHeader>,
    #[prost(oneof = "EventPayload", tags = "2, 3, 4, 5, 6, 7")]
    pub payload: ::core::option::Option<EventPayload>,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct InterfaceId {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub version: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MethodRequest {
    #[prost(string, repeated, tag = "1")]
    pub node_path: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "2")]
    pub interface: ::core::option::Option<InterfaceId>,
    #[prost(uint32, tag = "3")]
    pub method_index: u32,
    #[prost(uint64, tag = "4")]
    pub sid: u64,
    #[prost(bytes = "vec", tag = "5")]
    pub request: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MethodResponse {
    #[prost(uint64, tag = "1")]
    pub sid: u64,
    #[prost(bool, tag = "2")]
    pub success: bool,
    #[prost(string, tag = "3")]
    pub error_text: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "4")]
    pub response: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cancel {
    #[prost(uint64, tag = "1")]
    pub sid: u64,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum PacketKind {
    #[prost(message, tag = "1")]
    MethodRequest(MethodRequest),
    #[prost(message, tag = "2")]
    MethodResponse(MethodResponse),
    #[prost(message, tag = "3")]
    Cancel(Cancel),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Packet {
    #[prost(oneof = "PacketKind", tags = "1, 2, 3")]
    pub kind: ::core::option::Option<PacketKind>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, ::prost::Enumeration)]
#[repr(i32)]
pub enum TraceState {
    Unspecified = 0,
    Running = 1,
    Complete = 2,
    Error = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TraceSummary {
    #[prost(string, repeated, tag = "1")]
    pub source_node_path: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(uint32, tag = "2")]
    pub queue_count: u32,
    #[prost(uint64, tag = "3")]
    pub duration_ms: u64,
    #[prost(string, tag = "4")]
    pub start_date_rfc3339: ::prost::alloc::string::String,
    #[prost(enumeration = "TraceState", tag = "5")]
    pub state: i32,
    #[prost(uint32, tag = "6")]
    pub major_version: u32,
    #[prost(string, tag = "7")]
    pub error_text: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CacheEntry {
    #[prost(message, optional, tag = "1")]
    pub key: ::core::option::Option<::pbjson_types::Any>,
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<::pbjson_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TraceCache {
    #[prost(message, repeated, tag = "1")]
    pub entries: ::prost::alloc::vec::Vec<CacheEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SimpleKey {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SimpleValue {
    #[prost(uint64, tag = "1")]
    pub value: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtensionHeader {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub min_sid: u64,
    #[prost(uint64, tag = "3")]
    pub max_sid: u64,
    #[prost(uint64, tag = "4")]
    pub entry_count: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtensionRecord {
    #[prost(uint64, tag = "1")]
    pub sid: u64,
    #[prost(message, optional, tag = "2")]
    pub annotation: ::core::option::Option<::pbjson_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentityNodeId {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentityChildren {
    #[prost(string, repeated, tag = "1")]
    pub ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentityInterfaces {
    #[prost(message, repeated, tag = "1")]
    pub interfaces: ::prost::alloc::vec::Vec<InterfaceId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LruAnnotation {
    #[prost(bool, tag = "1")]
    pub hit: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorksetAnnotation {
    #[prost(uint64, tag = "1")]
    pub distinct_bytes_seen: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HistogramBucket {
    #[prost(uint64, tag = "1")]
    pub upper_bound: u64,
    #[prost(uint64, tag = "2")]
    pub count: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Histogram {
    #[prost(message, repeated, tag = "1")]
    pub buckets: ::prost::alloc::vec::Vec<HistogramBucket>,
    #[prost(uint64, tag = "2")]
    pub count: u64,
    #[prost(uint64, tag = "3")]
    pub sum: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FsExtensionStatsEntry {
    #[prost(string, tag = "1")]
    pub extension: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub file_count: u64,
    #[prost(uint64, tag = "3")]
    pub sectors_written: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FsStatisticsByExtension {
    #[prost(message, repeated, tag = "1")]
    pub entries: ::prost::alloc::vec::Vec<FsExtensionStatsEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorksetResult {
    #[prost(uint64, tag = "1")]
    pub final_distinct_bytes: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LruResult {
    #[prost(uint64, tag = "1")]
    pub hits: u64,
    #[prost(uint64, tag = "2")]
    pub misses: u64,
}
