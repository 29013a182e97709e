use crate::{Log, LogLevel};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Layer renders tracing spans and events into [`Log`] records and hands
/// each one to a caller-supplied handler. `H` is the handler closure and `T`
/// a zero-sized marker tying the layer to its `Subscriber` type, matching
/// the teacher's `ops::tracing::Layer<H, T>` split so the handler itself
/// stays free of subscriber generics.
pub struct Layer<H, T> {
    handler: H,
    _marker: PhantomData<fn(T)>,
}

impl<H, T> Layer<H, T>
where
    H: Fn(Log) + Send + Sync + 'static,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

struct SpanFields {
    fields: BTreeMap<String, Box<serde_json::value::RawValue>>,
}

impl<H, T> tracing_subscriber::Layer<T> for Layer<H, T>
where
    H: Fn(Log) + Send + Sync + 'static,
    T: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, T>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        let span = ctx.span(id).expect("span must exist in on_new_span");
        span.extensions_mut().insert(SpanFields {
            fields: visitor.fields,
        });
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, T>) {
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let span = ctx.span(id).expect("span must exist in on_record");
        let mut extensions = span.extensions_mut();
        if let Some(existing) = extensions.get_mut::<SpanFields>() {
            existing.fields.extend(visitor.fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, T>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut spans = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                let extensions = span.extensions();
                let fields = extensions
                    .get::<SpanFields>()
                    .map(|s| s.fields.clone())
                    .unwrap_or_default();
                spans.push(Log {
                    ts: time::OffsetDateTime::now_utc(),
                    level: LogLevel::Info,
                    message: span.metadata().name().to_string(),
                    fields,
                    origin: None,
                    spans: Vec::new(),
                });
            }
        }

        let meta = event.metadata();
        (self.handler)(Log {
            ts: time::OffsetDateTime::now_utc(),
            level: level_from_tracing(meta.level()),
            message: visitor.message.unwrap_or_else(|| meta.target().to_string()),
            fields: visitor.fields,
            origin: visitor.origin,
            spans,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    origin: Option<crate::Origin>,
    fields: BTreeMap<String, Box<serde_json::value::RawValue>>,
}

impl FieldVisitor {
    fn insert(&mut self, name: &str, value: serde_json::Value) {
        if let Ok(raw) = serde_json::value::to_raw_value(&value) {
            self.fields.insert(name.to_string(), raw);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field.name(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field.name(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field.name(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field.name(), value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
            return;
        }
        if field.name() == "origin" {
            if let Ok(origin) = serde_json::from_str::<crate::Origin>(value) {
                self.origin = Some(origin);
                return;
            }
        }
        self.insert(field.name(), value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field.name(), value.to_string().into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
            return;
        }
        self.insert(field.name(), format!("{value:?}").into());
    }
}

fn level_from_tracing(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}
