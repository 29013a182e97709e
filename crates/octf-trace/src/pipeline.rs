use crate::affinity::{pin_current_thread, QueueAffinity};
use crate::converter::Converter;
use crate::serializer::Serializer;
use octf_proto::{gen::TraceState as WireTraceState, NodePath};
use octf_ring::Ring;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("a trace session is already active")]
    AlreadyActive,
    #[error("no trace session is active")]
    NotActive,
    #[error("queue {0} is out of range for this session")]
    UnknownQueue(u32),
    #[error(transparent)]
    Push(#[from] octf_ring::PushError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Fatal(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Complete,
    Error,
}

impl From<SessionState> for WireTraceState {
    fn from(s: SessionState) -> Self {
        match s {
            SessionState::Running => WireTraceState::Running,
            SessionState::Complete => WireTraceState::Complete,
            SessionState::Error => WireTraceState::Error,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Summary {
    pub source_node_path: Vec<String>,
    pub queue_count: u32,
    pub duration_ms: u64,
    pub start_date_rfc3339: String,
    pub state: SessionState,
    pub major_version: u32,
    pub error_text: String,
}

/// Supplies per-queue converters and affinity hints for a session. Owned by
/// the traced module; the pipeline never constructs one itself.
pub trait TraceExecutor: Send + Sync {
    fn converter_for_queue(&self, queue_id: u32) -> Box<dyn Converter>;
    fn affinity_for_queue(&self, _queue_id: u32) -> QueueAffinity {
        QueueAffinity::Any
    }
}

struct RunningSession {
    rings: Vec<Ring>,
    producers: Vec<octf_ring::Producer>,
    stop: Arc<AtomicBool>,
    handles: Vec<std::thread::JoinHandle<()>>,
    summary: Arc<Mutex<Summary>>,
    start_instant: Instant,
}

pub struct TracePipeline {
    trace_dir: PathBuf,
    global_seq: Arc<AtomicU64>,
    session: Mutex<Option<RunningSession>>,
}

impl TracePipeline {
    pub fn new(trace_dir: impl Into<PathBuf>) -> Self {
        Self {
            trace_dir: trace_dir.into(),
            global_seq: Arc::new(AtomicU64::new(0)),
            session: Mutex::new(None),
        }
    }

    pub fn start_trace(
        &self,
        executor: Arc<dyn TraceExecutor>,
        source_path: &NodePath,
        queue_count: u32,
        max_duration: Duration,
        max_size: u64,
        ring_capacity: usize,
    ) -> Result<(), PipelineError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(PipelineError::AlreadyActive);
        }

        self.global_seq.store(0, Ordering::SeqCst);

        let trace_dir = self.trace_dir.join(source_path.basename());
        std::fs::create_dir_all(&trace_dir)?;

        let start_date = current_rfc3339();
        let summary = Arc::new(Mutex::new(Summary {
            source_node_path: source_path.to_wire(),
            queue_count,
            duration_ms: 0,
            start_date_rfc3339: start_date,
            state: SessionState::Running,
            major_version: 4,
            error_text: String::new(),
        }));

        let stop = Arc::new(AtomicBool::new(false));
        let start_instant = Instant::now();
        let mut rings = Vec::with_capacity(queue_count as usize);
        let mut producers = Vec::with_capacity(queue_count as usize);
        let mut handles = Vec::with_capacity(queue_count as usize);

        for queue_id in 0..queue_count {
            let ring = Ring::new(ring_capacity);
            let producer = ring.producer();
            let consumer = ring.consumer().expect("freshly created ring has no consumer yet");
            producers.push(producer);

            let converter = executor.converter_for_queue(queue_id);
            let affinity = executor.affinity_for_queue(queue_id);
            let queue_path = trace_dir.join(format!("octf.trace.{queue_id}"));
            let stop = stop.clone();
            let summary = summary.clone();
            let global_seq = self.global_seq.clone();

            let handle = std::thread::Builder::new()
                .name(format!("octf-trace-q{queue_id}"))
                .spawn(move || {
                    run_queue_worker(QueueWorkerArgs {
                        queue_id,
                        consumer,
                        converter,
                        affinity,
                        queue_path,
                        stop,
                        summary,
                        start_instant,
                        max_duration,
                        max_size,
                        global_seq,
                    })
                })
                .expect("spawning a trace worker thread");
            handles.push(handle);
            rings.push(ring);
        }

        *session = Some(RunningSession {
            rings,
            producers,
            stop,
            handles,
            summary,
            start_instant,
        });
        Ok(())
    }

    pub fn push_trace(&self, queue_id: u32, bytes: &[u8]) -> Result<(), PipelineError> {
        let session = self.session.lock();
        let session = session.as_ref().ok_or(PipelineError::NotActive)?;
        let producer = session
            .producers
            .get(queue_id as usize)
            .ok_or(PipelineError::UnknownQueue(queue_id))?;
        producer.push(bytes).map_err(Into::into)
    }

    pub fn stop_trace(&self) -> Result<Summary, PipelineError> {
        let mut session = self.session.lock();
        let mut running = session.take().ok_or(PipelineError::NotActive)?;

        running.stop.store(true, Ordering::SeqCst);
        // Deactivates every ring (§4.2 "On stop... deactivate all rings"):
        // producers see further pushes rejected immediately rather than
        // waiting for the buffer to fill, and the wake-up this posts lets
        // a worker blocked in `consumer.wait` notice promptly.
        for ring in &running.rings {
            ring.close();
        }
        for handle in running.handles.drain(..) {
            let _ = handle.join();
        }

        let mut summary = running.summary.lock();
        if summary.state == SessionState::Running {
            summary.duration_ms = running.start_instant.elapsed().as_millis() as u64;
            summary.state = SessionState::Complete;
        }
        Ok(summary.clone())
    }

    pub fn get_summary(&self) -> Result<Summary, PipelineError> {
        let session = self.session.lock();
        let session = session.as_ref().ok_or(PipelineError::NotActive)?;
        Ok(session.summary.lock().clone())
    }
}

struct QueueWorkerArgs {
    queue_id: u32,
    consumer: octf_ring::Consumer,
    converter: Box<dyn Converter>,
    affinity: QueueAffinity,
    queue_path: PathBuf,
    stop: Arc<AtomicBool>,
    summary: Arc<Mutex<Summary>>,
    start_instant: Instant,
    max_duration: Duration,
    max_size: u64,
    global_seq: Arc<AtomicU64>,
}

const MAX_RECORD_LEN: usize = 1 << 20;

fn run_queue_worker(mut args: QueueWorkerArgs) {
    pin_current_thread(args.affinity);

    let mut serializer = match Serializer::create(&args.queue_path) {
        Ok(s) => s,
        Err(err) => {
            fail_session(&args.summary, format!("queue {}: {err}", args.queue_id));
            return;
        }
    };

    let mut buf = vec![0u8; MAX_RECORD_LEN];

    loop {
        let deadline_elapsed = args.start_instant.elapsed() >= args.max_duration;
        let stop_requested = args.stop.load(Ordering::SeqCst);
        let terminal = {
            let summary = args.summary.lock();
            summary.state != SessionState::Running
        };

        if deadline_elapsed || stop_requested || terminal {
            if deadline_elapsed {
                complete_session(&args.summary, &args.start_instant);
            }
            drain_remaining(&mut args, &mut serializer, &mut buf);
            break;
        }

        args.consumer.wait(Duration::from_millis(200));

        while !args.consumer.is_empty() {
            match args.consumer.pop(&mut buf) {
                Ok(0) => break,
                Ok(len) => process_one(&mut args, &mut serializer, &buf[..len]),
                Err(err) => {
                    fail_session(&args.summary, format!("queue {}: {err}", args.queue_id));
                    return;
                }
            }
            if args.summary.lock().state != SessionState::Running {
                break;
            }
        }
    }

    let _ = serializer.close();
}

fn process_one(args: &mut QueueWorkerArgs, serializer: &mut Serializer, raw: &[u8]) {
    let mut event = match args.converter.convert(raw) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(queue = args.queue_id, %err, "dropping record that failed conversion");
            return;
        }
    };

    let sid = args.global_seq.fetch_add(1, Ordering::SeqCst);
    let timestamp_ns = args.start_instant.elapsed().as_nanos() as u64;
    event.header = Some(octf_proto::gen::EventHeader {
        sid,
        timestamp_ns,
        queue_id: args.queue_id,
    });

    if let Err(err) = serializer.write_message(&event) {
        fail_session(&args.summary, format!("queue {}: {err}", args.queue_id));
        return;
    }

    if serializer.bytes_written() > args.max_size {
        complete_session(&args.summary, &args.start_instant);
    }
}

fn drain_remaining(args: &mut QueueWorkerArgs, serializer: &mut Serializer, buf: &mut [u8]) {
    while let Ok(len) = args.consumer.pop(buf) {
        if len == 0 {
            break;
        }
        process_one(args, serializer, &buf[..len]);
    }
}

fn complete_session(summary: &Mutex<Summary>, start_instant: &Instant) {
    let mut summary = summary.lock();
    if summary.state == SessionState::Running {
        summary.duration_ms = start_instant.elapsed().as_millis() as u64;
        summary.state = SessionState::Complete;
    }
}

fn fail_session(summary: &Mutex<Summary>, error_text: String) {
    let mut summary = summary.lock();
    if summary.state == SessionState::Running {
        summary.state = SessionState::Error;
        summary.error_text = error_text;
    }
}

fn current_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::converter::{ConvertError, FnConverter};
    use crate::reader::EventReader;
    use octf_proto::gen::{Event, EventPayload, SimpleValue};
    use octf_proto::{NodeId, NodePath};
    use prost::Message;
    use tempfile::tempdir;

    fn value_converter() -> Box<dyn Converter> {
        Box::new(FnConverter(|raw: &[u8]| {
            let value = SimpleValue::decode(raw).map_err(|e| ConvertError(e.to_string()))?;
            Ok(Event {
                header: None,
                payload: Some(EventPayload::IoCompletion(octf_proto::gen::IoCompletion {
                    device_id: value.value,
                    request_id: value.value,
                    error: false,
                })),
            })
        }))
    }

    struct TwoQueueExecutor;

    impl TraceExecutor for TwoQueueExecutor {
        fn converter_for_queue(&self, _queue_id: u32) -> Box<dyn Converter> {
            value_converter()
        }
    }

    fn source_path() -> NodePath {
        NodePath::root(NodeId::new("disk0").unwrap())
    }

    #[test]
    fn two_queue_trace_writes_every_pushed_event_per_queue() {
        let dir = tempdir().unwrap();
        let pipeline = TracePipeline::new(dir.path());
        let executor = Arc::new(TwoQueueExecutor);

        pipeline
            .start_trace(executor, &source_path(), 2, Duration::from_secs(30), u64::MAX, 1 << 16)
            .unwrap();

        for i in 0..10u64 {
            let msg = SimpleValue { value: i }.encode_to_vec();
            pipeline.push_trace(0, &msg).unwrap();
            pipeline.push_trace(1, &msg).unwrap();
        }

        let summary = pipeline.stop_trace().unwrap();
        assert_eq!(summary.queue_count, 2);
        assert_eq!(summary.state, SessionState::Complete);

        let trace_dir = dir.path().join(source_path().basename());
        for queue_id in 0..2 {
            let mut reader = EventReader::open(trace_dir.join(format!("octf.trace.{queue_id}"))).unwrap();
            let mut count = 0u64;
            let mut last_sid = None;
            while let Some(event) = reader.next::<Event>().unwrap() {
                let sid = event.header.unwrap().sid;
                if let Some(last) = last_sid {
                    assert!(sid > last, "sids must be strictly increasing within a queue");
                }
                last_sid = Some(sid);
                count += 1;
            }
            assert_eq!(count, 10);
        }
    }

    #[test]
    fn starting_a_second_session_while_one_is_active_fails() {
        let dir = tempdir().unwrap();
        let pipeline = TracePipeline::new(dir.path());
        let executor = Arc::new(TwoQueueExecutor);

        pipeline
            .start_trace(executor.clone(), &source_path(), 1, Duration::from_secs(30), u64::MAX, 4096)
            .unwrap();
        let err = pipeline
            .start_trace(executor, &source_path(), 1, Duration::from_secs(30), u64::MAX, 4096)
            .unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyActive));

        pipeline.stop_trace().unwrap();
    }

    #[test]
    fn stop_before_any_event_yields_complete_with_empty_queue_files() {
        let dir = tempdir().unwrap();
        let pipeline = TracePipeline::new(dir.path());
        let executor = Arc::new(TwoQueueExecutor);

        pipeline
            .start_trace(executor, &source_path(), 1, Duration::from_secs(30), u64::MAX, 4096)
            .unwrap();
        let summary = pipeline.stop_trace().unwrap();
        assert_eq!(summary.state, SessionState::Complete);

        let trace_dir = dir.path().join(source_path().basename());
        let mut reader = EventReader::open(trace_dir.join("octf.trace.0")).unwrap();
        assert!(reader.next::<Event>().unwrap().is_none());
    }

    #[test]
    fn stop_trace_records_elapsed_duration() {
        let dir = tempdir().unwrap();
        let pipeline = TracePipeline::new(dir.path());
        let executor = Arc::new(TwoQueueExecutor);

        pipeline
            .start_trace(executor, &source_path(), 1, Duration::from_secs(30), u64::MAX, 4096)
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let summary = pipeline.stop_trace().unwrap();
        assert!(summary.duration_ms >= 15, "expected elapsed duration to be recorded, got {}", summary.duration_ms);
    }

    #[test]
    fn pushing_without_an_active_session_fails() {
        let dir = tempdir().unwrap();
        let pipeline = TracePipeline::new(dir.path());
        let err = pipeline.push_trace(0, b"x").unwrap_err();
        assert!(matches!(err, PipelineError::NotActive));
    }

    #[test]
    fn converter_error_drops_the_record_without_killing_the_session() {
        let dir = tempdir().unwrap();
        let pipeline = TracePipeline::new(dir.path());

        struct FailFirstExecutor;
        impl TraceExecutor for FailFirstExecutor {
            fn converter_for_queue(&self, _queue_id: u32) -> Box<dyn Converter> {
                Box::new(FnConverter(|raw: &[u8]| {
                    if raw == b"bad" {
                        return Err(ConvertError("unparseable".into()));
                    }
                    let value = SimpleValue::decode(raw).map_err(|e| ConvertError(e.to_string()))?;
                    Ok(Event {
                        header: None,
                        payload: Some(EventPayload::IoCompletion(octf_proto::gen::IoCompletion {
                            device_id: value.value,
                            request_id: value.value,
                            error: false,
                        })),
                    })
                }))
            }
        }

        pipeline
            .start_trace(Arc::new(FailFirstExecutor), &source_path(), 1, Duration::from_secs(30), u64::MAX, 4096)
            .unwrap();
        pipeline.push_trace(0, b"bad").unwrap();
        pipeline.push_trace(0, &SimpleValue { value: 7 }.encode_to_vec()).unwrap();

        let summary = pipeline.stop_trace().unwrap();
        assert_eq!(summary.state, SessionState::Complete);

        let trace_dir = dir.path().join(source_path().basename());
        let mut reader = EventReader::open(trace_dir.join("octf.trace.0")).unwrap();
        let mut count = 0;
        while reader.next::<Event>().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1, "the unparseable record must be dropped, not crash the session");
    }
}
