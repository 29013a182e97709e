use octf_proto::gen::Event;

/// Transforms one opaque producer record (as pushed onto the ring) into a
/// typed `Event`. Supplied by the traced module; the pipeline treats a
/// converter error as a single dropped record, not a session failure.
pub trait Converter: Send {
    fn convert(&mut self, raw: &[u8]) -> Result<Event, ConvertError>;
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("{0}")]
pub struct ConvertError(pub String);

/// A converter driven by a plain function, for callers that don't need
/// converter-local state.
pub struct FnConverter<F>(pub F);

impl<F> Converter for FnConverter<F>
where
    F: FnMut(&[u8]) -> Result<Event, ConvertError> + Send,
{
    fn convert(&mut self, raw: &[u8]) -> Result<Event, ConvertError> {
        (self.0)(raw)
    }
}
