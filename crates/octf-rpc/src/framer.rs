//! One bidirectional stream carries discrete [`Packet`]s, each prefixed by
//! a fixed-grammar ASCII header `PKT:<decimal-length>\n`. The header lets a
//! receiver detect desynchronization outright -- anything that doesn't
//! parse as `PKT:<digits>\n` is ambiguous noise, not a packet, and the
//! connection is closed rather than guessed at.

use octf_proto::gen::Packet;
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard cap on a single packet's payload, matching §6: a request exceeding
/// this is a protocol error.
pub const MAX_PACKET_PAYLOAD_BYTES: usize = octf_proto::MAX_PACKET_PAYLOAD_BYTES;

const HEADER_PREFIX: &str = "PKT:";
/// `PKT:` + 8 decimal digits (more than enough for a 32 MiB bound) + `\n`.
const MAX_HEADER_BYTES: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum FramingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed packet header")]
    BadHeader,
    #[error("packet payload of {0} bytes exceeds the {1} byte limit")]
    TooLarge(usize, usize),
    #[error("payload did not decode as a Packet: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Encodes and writes one packet: header then payload, in that order, on
/// the given writer. Callers are responsible for serializing this against
/// other writers of the same stream (the connection's TX lock), since the
/// framer itself holds no state across calls.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
) -> Result<(), FramingError> {
    let payload = packet.encode_to_vec();
    if payload.len() > MAX_PACKET_PAYLOAD_BYTES {
        return Err(FramingError::TooLarge(
            payload.len(),
            MAX_PACKET_PAYLOAD_BYTES,
        ));
    }
    let header = format!("{HEADER_PREFIX}{}\n", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads and decodes one packet. Any header-parse failure or oversized
/// length is returned to the caller, who closes the connection per §4.4;
/// the framer never attempts to resynchronize on a bad header itself.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet, FramingError> {
    let mut header = Vec::with_capacity(MAX_HEADER_BYTES);
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        header.push(byte[0]);
        if header.len() > MAX_HEADER_BYTES {
            return Err(FramingError::BadHeader);
        }
    }

    let header = std::str::from_utf8(&header).map_err(|_| FramingError::BadHeader)?;
    let len_str = header.strip_prefix(HEADER_PREFIX).ok_or(FramingError::BadHeader)?;
    let len: usize = len_str.parse().map_err(|_| FramingError::BadHeader)?;
    if len > MAX_PACKET_PAYLOAD_BYTES {
        return Err(FramingError::TooLarge(len, MAX_PACKET_PAYLOAD_BYTES));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Packet::decode(payload.as_slice())?)
}

#[cfg(test)]
mod test {
    use super::*;
    use octf_proto::gen::{Cancel, MethodResponse, PacketKind as Kind};
    use quickcheck_macros::quickcheck;

    async fn round_trip(packet: Packet) -> Packet {
        let mut buf = Vec::new();
        write_packet(&mut buf, &packet).await.unwrap();
        read_packet(&mut &buf[..]).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_cancel_packet() {
        let packet = Packet {
            kind: Some(Kind::Cancel(Cancel { sid: 7 })),
        };
        assert_eq!(round_trip(packet.clone()).await, packet);
    }

    #[tokio::test]
    async fn round_trips_a_method_response() {
        let packet = Packet {
            kind: Some(Kind::MethodResponse(MethodResponse {
                sid: 42,
                success: true,
                error_text: String::new(),
                response: vec![1, 2, 3, 4],
            })),
        };
        assert_eq!(round_trip(packet.clone()).await, packet);
    }

    #[tokio::test]
    async fn oversized_header_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(format!("PKT:{}\n", MAX_PACKET_PAYLOAD_BYTES + 1).as_bytes());
        let err = read_packet(&mut &buf[..]).await.unwrap_err();
        assert!(matches!(err, FramingError::TooLarge(_, _)));
    }

    #[tokio::test]
    async fn garbage_header_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"not-a-header\n");
        let err = read_packet(&mut &buf[..]).await.unwrap_err();
        assert!(matches!(err, FramingError::BadHeader));
    }

    #[quickcheck]
    fn prop_round_trip_cancel(sid: u64) -> bool {
        let packet = Packet {
            kind: Some(Kind::Cancel(Cancel { sid })),
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(round_trip(packet.clone())) == packet
    }
}
