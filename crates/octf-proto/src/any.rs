//! Minimal `google.protobuf.Any` pack/unpack helpers for the trace cache
//! (§4.10) and the extension store (§4.11), both of which store a
//! type-tagged message without the sender needing to know the concrete
//! type ahead of time.
//!
//! `pbjson_types::Any` only carries the wire encoding; this module adds the
//! pack/unpack convention (`type_url` = `type.googleapis.com/octf.<Name>`)
//! prost-types' `Any::pack`/`to_msg` already follow, so key and value bytes
//! compare the same way a packed `google.protobuf.Any` would in any other
//! octf language binding.

use pbjson_types::Any;
use prost::Message;

const TYPE_URL_PREFIX: &str = "type.googleapis.com/octf.";

#[derive(thiserror::Error, Debug)]
pub enum AnyError {
    #[error("expected type {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("failed to decode packed message: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Packs `msg` into an `Any` tagged with `type_name` (e.g. `"SimpleKey"`).
pub fn pack(type_name: &str, msg: &impl Message) -> Any {
    Any {
        type_url: format!("{TYPE_URL_PREFIX}{type_name}"),
        value: msg.encode_to_vec(),
    }
}

/// Unpacks `any` as `T`, checking that its `type_url` matches `type_name`.
pub fn unpack<T: Message + Default>(type_name: &str, any: &Any) -> Result<T, AnyError> {
    let expected = format!("{TYPE_URL_PREFIX}{type_name}");
    if any.type_url != expected {
        return Err(AnyError::TypeMismatch {
            expected,
            found: any.type_url.clone(),
        });
    }
    Ok(T::decode(any.value.as_slice())?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gen::SimpleKey;

    #[test]
    fn pack_unpack_round_trip() {
        let key = SimpleKey {
            key: "workset".to_string(),
        };
        let any = pack("SimpleKey", &key);
        let decoded: SimpleKey = unpack("SimpleKey", &any).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn unpack_rejects_wrong_type() {
        let key = SimpleKey {
            key: "workset".to_string(),
        };
        let any = pack("SimpleKey", &key);
        let err = unpack::<crate::gen::SimpleValue>("SimpleValue", &any).unwrap_err();
        assert!(matches!(err, AnyError::TypeMismatch { .. }));
    }
}
