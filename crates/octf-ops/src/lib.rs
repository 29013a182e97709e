use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

pub mod tracing_layer;
pub use tracing_layer::Layer;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Origin identifies the run-time actor a [`Log`] was produced by: a trace
/// session's per-queue worker, a live connection context, or a node. Unlike
/// the generic `module` field (always present, taken from the tracing
/// target), `origin` is attached explicitly by instrumented code via a span
/// field named `origin` and lets a log consumer group messages by the thing
/// that emitted them without parsing `module` strings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Origin {
    TraceSession { path: String, queue: Option<u32> },
    Connection { id: u64 },
    Node { path: String },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Log {
    #[serde(
        serialize_with = "time::serde::rfc3339::serialize",
        deserialize_with = "time::serde::rfc3339::deserialize"
    )]
    pub ts: time::OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Box<serde_json::value::RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<Log>,
}

/// stderr_log_handler writes canonical JSON log serializations to stderr.
pub fn stderr_log_handler(log: Log) {
    let mut buf = serde_json::to_vec(&log).expect("Log always serializes");
    buf.push(b'\n');
    _ = std::io::stderr().write_all(&buf); // Best-effort.
}

/// new_encoded_json_write_handler returns a log handler that writes
/// canonical JSON log serializations to the given writer.
pub fn new_encoded_json_write_handler<W>(
    writer: std::sync::Arc<std::sync::Mutex<W>>,
) -> impl Fn(Log) + Send + Sync + 'static
where
    W: std::io::Write + Send + 'static,
{
    move |log: Log| {
        let mut buf = serde_json::to_vec(&log).expect("Log always serializes");
        buf.push(b'\n');
        _ = writer
            .lock()
            .expect("writer is never poisoned")
            .write_all(&buf); // Best-effort.
    }
}

#[cfg(test)]
mod test {
    use super::{Log, LogLevel};
    use crate::new_encoded_json_write_handler;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_encoded_json_write_handler() {
        let writer = Arc::new(Mutex::new(Vec::new()));
        let handler = new_encoded_json_write_handler(writer.clone());

        let mut log = Log {
            ts: time::OffsetDateTime::UNIX_EPOCH,
            level: LogLevel::Warn,
            message: "hello world".to_string(),
            fields: [(
                "name".to_string(),
                serde_json::value::to_raw_value("value").unwrap(),
            )]
            .into_iter()
            .collect(),
            origin: None,
            spans: Vec::new(),
        };

        handler(log.clone());
        log.message = "I'm different!".to_string();
        handler(log);

        std::mem::drop(handler);
        let writer = Arc::try_unwrap(writer).unwrap().into_inner().unwrap();

        insta::assert_snapshot!(String::from_utf8_lossy(&writer), @r###"
        {"ts":"1970-01-01T00:00:00Z","level":"warn","message":"hello world","fields":{"name":"value"}}
        {"ts":"1970-01-01T00:00:00Z","level":"warn","message":"I'm different!","fields":{"name":"value"}}
        "###);
    }
}
