use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::trace;

use crate::{
    codec::{decode_variable_byte_int, length_field, variable_byte_int_len, Encoder},
    error::{DecodingError, EncodingError, PacketError, ProtocolError},
    packets::Packet,
    protocol::{PacketType, ProtocolVersion, ReasonCode},
};

/// One MQTT control packet as it travels on the wire, payload still undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: PacketType,

    /// Low nibble of the fixed header.
    pub flags: u8,

    /// Everything after the remaining length. Its length is the remaining length.
    pub payload: Bytes,
}

impl Frame {
    /// Writes the fixed header, the remaining length and the payload.
    ///
    /// # Errors
    /// - Returns `EncodingError::ValueTooLarge` if the payload does not fit a remaining length.
    pub fn encode(&self) -> Result<Bytes, EncodingError> {
        let remaining_len = length_field(self.payload.len());

        let mut buf = BytesMut::with_capacity(
            1 + variable_byte_int_len(remaining_len) + self.payload.len(),
        );
        buf.put_u8(self.kind.control_byte(self.flags));
        buf.put_variable_byte_int(remaining_len)?;
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }

    /// Parses the payload into a packet.
    ///
    /// # Errors
    /// - Returns a `PacketError` if the payload does not fit the packet kind.
    pub fn into_packet(self, version: ProtocolVersion) -> Result<Packet, PacketError> {
        Packet::parse(self.kind.to_u8(), self.flags, self.payload, version)
    }
}

/// Serializes a packet into a complete wire frame.
///
/// # Errors
/// - Returns an `EncodingError` if a field or the whole packet exceeds what the wire format can carry.
pub fn encode_frame(packet: &Packet, version: ProtocolVersion) -> Result<Bytes, EncodingError> {
    let bytes = packet.serialize(version)?.encode()?;
    trace!("encoded {} frame: {}", packet.kind(), hex::encode(&bytes));

    Ok(bytes)
}

/// Decodes one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied.
///
/// # Errors
/// - Returns `DecodingError::Truncated` if `buf` does not hold the whole frame yet.
/// - Returns `DecodingError::UnknownPacketKind` for a packet type of 0.
/// - Returns a `ProtocolError` with `MalformedPacket` for reserved flag violations.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize), PacketError> {
    let (kind, flags, header_len, remaining_len) = decode_fixed_header(buf)?;

    let frame_len = header_len + remaining_len;
    if buf.len() < frame_len {
        return Err(DecodingError::Truncated.into());
    }

    let payload = Bytes::copy_from_slice(&buf[header_len..frame_len]);

    Ok((Frame { kind, flags, payload }, frame_len))
}

/// Reads and checks the fixed header: control byte and remaining length.
///
/// Returns the packet type, its flags, the header length and the remaining length.
fn decode_fixed_header(buf: &[u8]) -> Result<(PacketType, u8, usize, usize), PacketError> {
    let Some(&control_byte) = buf.first() else {
        return Err(DecodingError::Truncated.into());
    };

    let value = control_byte >> 4;
    let kind = PacketType::from_u8(value).ok_or(DecodingError::UnknownPacketKind(value))?;
    let flags = control_byte & 0b0000_1111;

    validate_flags(kind, flags)?;

    let (remaining_len, len_bytes) = decode_variable_byte_int(&buf[1..])?;

    Ok((kind, flags, 1 + len_bytes, remaining_len as usize))
}

fn validate_flags(kind: PacketType, flags: u8) -> Result<(), ProtocolError> {
    match kind.fixed_flags() {
        Some(expected) if flags != expected => Err(ProtocolError::malformed(format!(
            "{kind} fixed header flags must be {expected:#06b}, got {flags:#06b}"
        ))),
        Some(_) => Ok(()),
        // PUBLISH: QoS bits may not both be set
        None if flags & 0b0110 == 0b0110 => {
            Err(ProtocolError::malformed("PUBLISH fixed header carries QoS 3"))
        }
        None => Ok(()),
    }
}

/// Pulls complete frames out of a growing read buffer.
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    /// Largest frame accepted, fixed header included. `None` accepts anything the
    /// remaining length can express.
    maximum_packet_size: Option<u32>,
}

impl FrameDecoder {
    pub fn new(maximum_packet_size: Option<u32>) -> Self {
        Self { maximum_packet_size }
    }

    /// Splits the next complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. The buffer is left untouched in that case.
    ///
    /// # Errors
    /// - Returns a `ProtocolError` with `PacketTooLarge` if the announced frame exceeds the maximum,
    ///   before waiting for its payload.
    /// - Returns a `PacketError` for malformed headers.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>, PacketError> {
        let (kind, flags, header_len, remaining_len) = match decode_fixed_header(&buf[..]) {
            Ok(header) => header,
            Err(e) if e.is_truncated() => return Ok(None),
            Err(e) => return Err(e),
        };

        let frame_len = header_len + remaining_len;
        if let Some(maximum) = self.maximum_packet_size {
            if frame_len > maximum as usize {
                let message = format!("{kind} of {frame_len} bytes exceeds {maximum} bytes");
                return Err(ProtocolError::new(ReasonCode::PacketTooLarge, message).into());
            }
        }

        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(frame_len);
        frame.advance(header_len);
        trace!("decoded {kind} frame, {remaining_len} bytes of payload");

        Ok(Some(Frame { kind, flags, payload: frame.freeze() }))
    }
}
