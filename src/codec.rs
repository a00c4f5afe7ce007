use std::convert::Infallible;

use bytes::{Buf, BufMut, Bytes};

use crate::{
    constants::MAX_VARIABLE_BYTE_INT,
    error::{DecodingError, EncodingError},
};

/// Number of bytes the variable byte integer encoding of `value` occupies.
///
/// Values above the 4-byte ceiling report 4; encoding them fails.
pub fn variable_byte_int_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encode a variable byte integer.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901011>
///
/// **Specification:**
///
/// ```text
/// do
///    encodedByte = X MOD 128
///    X = X DIV 128
///    // if there are more data to encode, set the top bit of this byte
///    if (X > 0)
///       encodedByte = encodedByte OR 128
///    endif
///    'output' encodedByte
/// while (X > 0)
/// ```
///
/// # Errors
/// - Returns `EncodingError::ValueTooLarge` if the value needs more than 4 bytes.
pub fn encode_variable_byte_int(mut value: u32) -> Result<Vec<u8>, EncodingError> {
    if value > MAX_VARIABLE_BYTE_INT {
        return Err(EncodingError::ValueTooLarge(value.into()));
    }

    let capacity = variable_byte_int_len(value);
    let mut encoded_value = Vec::with_capacity(capacity);

    for _ in 0..capacity {
        // Extract the 7 least significant bits from the current value
        let mut encoded_byte = (value % 128) as u8;

        // Divide the value by 128 to remove the 7 bits just processed
        value /= 128;

        // If there are still remaining bits, mark this byte as continuation
        if value > 0 {
            encoded_byte |= 128;
        }

        encoded_value.push(encoded_byte);
    }

    Ok(encoded_value)
}

/// Decode a variable byte integer.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901011>
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
/// - Returns `DecodingError::Truncated` if the input ends before the last byte.
/// - Returns `DecodingError::MalformedVarInt` if the 4th byte still carries a continuation bit.
pub fn decode_variable_byte_int(buf: &[u8]) -> Result<(u32, usize), DecodingError> {
    let mut multiplier = 1;
    let mut decoded_value = 0;

    for (i, &encoded_byte) in buf.iter().enumerate() {
        // Take the 7 least significant bits and add them at the current position
        decoded_value += u32::from(encoded_byte & 127) * multiplier;

        // If the continuation bit is not set, we are done
        if encoded_byte & 128 == 0 {
            return Ok((decoded_value, i + 1));
        }

        // A fourth byte may not announce a fifth one
        if i == 3 {
            return Err(DecodingError::MalformedVarInt);
        }

        multiplier *= 128;
    }

    Err(DecodingError::Truncated)
}

/// Encode a UTF-8 string.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901010>
///
/// # Errors
/// - Returns `EncodingError::StringTooLong` if the string is longer than 65,535 bytes.
pub fn encode_utf8_string(value: &str) -> Result<Vec<u8>, EncodingError> {
    let mut encoded_value = Vec::with_capacity(2 + value.len());
    encoded_value.put_binary_data(value.as_bytes())?;

    Ok(encoded_value)
}

/// Decode a UTF-8 string.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901010>
///
/// Returns the string and the number of bytes consumed.
///
/// # Errors
/// - Returns `DecodingError::Truncated` if fewer bytes are available than declared.
/// - Returns `DecodingError::MalformedString` if the data is not valid UTF-8.
pub fn decode_utf8_string(buf: &[u8]) -> Result<(String, usize), DecodingError> {
    let (data, consumed) = decode_binary_data(buf)?;
    let value = std::str::from_utf8(data).map_err(|_| DecodingError::MalformedString)?;

    Ok((value.to_owned(), consumed))
}

/// Decode binary data.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901012>
fn decode_binary_data(buf: &[u8]) -> Result<(&[u8], usize), DecodingError> {
    if buf.len() < 2 {
        return Err(DecodingError::Truncated);
    }

    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let data = buf.get(2..2 + len).ok_or(DecodingError::Truncated)?;

    Ok((data, 2 + len))
}

/// Sink for the MQTT data representations.
///
/// Writing into a `BytesMut` or a `Vec<u8>` serializes. Writing into a [`SizeCounter`]
/// only adds up lengths, so sizes are always computed by the serializing code itself.
pub trait Encoder {
    type Error;

    fn put_byte(&mut self, value: u8);

    fn put_two_byte_int(&mut self, value: u16);

    fn put_four_byte_int(&mut self, value: u32);

    fn put_raw(&mut self, value: &[u8]);

    fn put_variable_byte_int(&mut self, value: u32) -> Result<(), Self::Error>;

    /// Binary data: 2-byte length followed by the bytes.
    fn put_binary_data(&mut self, value: &[u8]) -> Result<(), Self::Error>;

    fn put_utf8_string(&mut self, value: &str) -> Result<(), Self::Error> {
        self.put_binary_data(value.as_bytes())
    }

    /// UTF-8 String Pair: a name string followed by a value string.
    ///
    /// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901013>
    fn put_utf8_string_pair(&mut self, name: &str, value: &str) -> Result<(), Self::Error> {
        self.put_utf8_string(name)?;
        self.put_utf8_string(value)
    }
}

impl<B: BufMut> Encoder for B {
    type Error = EncodingError;

    fn put_byte(&mut self, value: u8) {
        self.put_u8(value);
    }

    fn put_two_byte_int(&mut self, value: u16) {
        // Network byte order
        self.put_u16(value);
    }

    fn put_four_byte_int(&mut self, value: u32) {
        self.put_u32(value);
    }

    fn put_raw(&mut self, value: &[u8]) {
        self.put_slice(value);
    }

    fn put_variable_byte_int(&mut self, value: u32) -> Result<(), EncodingError> {
        let encoded_value = encode_variable_byte_int(value)?;
        self.put_slice(&encoded_value);

        Ok(())
    }

    fn put_binary_data(&mut self, value: &[u8]) -> Result<(), EncodingError> {
        // MQTT requires that the length must fit within 2 bytes (0 to 65_535).
        let len = u16::try_from(value.len())
            .map_err(|_| EncodingError::StringTooLong(value.len()))?;

        self.put_u16(len);
        self.put_slice(value);

        Ok(())
    }
}

/// Encoder that counts bytes instead of writing them.
#[derive(Debug, Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    /// Runs `write` against a fresh counter and returns the number of bytes it produced.
    pub fn measure(write: impl FnOnce(&mut SizeCounter) -> Result<(), Infallible>) -> usize {
        let mut counter = SizeCounter::default();
        match write(&mut counter) {
            Ok(()) => counter.len,
            Err(never) => match never {},
        }
    }
}

impl Encoder for SizeCounter {
    type Error = Infallible;

    fn put_byte(&mut self, _value: u8) {
        self.len += 1;
    }

    fn put_two_byte_int(&mut self, _value: u16) {
        self.len += 2;
    }

    fn put_four_byte_int(&mut self, _value: u32) {
        self.len += 4;
    }

    fn put_raw(&mut self, value: &[u8]) {
        self.len += value.len();
    }

    fn put_variable_byte_int(&mut self, value: u32) -> Result<(), Infallible> {
        self.len += variable_byte_int_len(value);
        Ok(())
    }

    fn put_binary_data(&mut self, value: &[u8]) -> Result<(), Infallible> {
        self.len += 2 + value.len();
        Ok(())
    }
}

/// Converts a buffer length into the `u32` a length field carries.
///
/// Lengths that do not fit saturate, which the encoder then rejects as too large.
pub(crate) fn length_field(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn ensure_remaining(buf: &Bytes, len: usize) -> Result<(), DecodingError> {
    if buf.remaining() < len {
        return Err(DecodingError::Truncated);
    }

    Ok(())
}

/// Read a 1-byte unsigned integer.
pub(crate) fn read_u8(buf: &mut Bytes) -> Result<u8, DecodingError> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a 2-byte big-endian unsigned integer.
pub(crate) fn read_u16(buf: &mut Bytes) -> Result<u16, DecodingError> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_u16())
}

/// Read a 4-byte big-endian unsigned integer.
pub(crate) fn read_u32(buf: &mut Bytes) -> Result<u32, DecodingError> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_u32())
}

pub(crate) fn read_variable_byte_int(buf: &mut Bytes) -> Result<u32, DecodingError> {
    let (value, consumed) = decode_variable_byte_int(buf.chunk())?;
    buf.advance(consumed);

    Ok(value)
}

pub(crate) fn read_utf8_string(buf: &mut Bytes) -> Result<String, DecodingError> {
    let (value, consumed) = decode_utf8_string(buf.chunk())?;
    buf.advance(consumed);

    Ok(value)
}

/// Read binary data without copying it out of the buffer.
pub(crate) fn read_binary_data(buf: &mut Bytes) -> Result<Bytes, DecodingError> {
    let len = usize::from(read_u16(buf)?);
    ensure_remaining(buf, len)?;

    Ok(buf.split_to(len))
}

pub(crate) fn read_utf8_string_pair(buf: &mut Bytes) -> Result<(String, String), DecodingError> {
    let name = read_utf8_string(buf)?;
    let value = read_utf8_string(buf)?;

    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::constants::MAX_STRING_LENGTH;

    #[test]
    fn variable_byte_int_uses_shortest_encoding() {
        let cases: [(u32, &[u8]); 8] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
            (2_097_151, &[0xFF, 0xFF, 0x7F]),
            (2_097_152, &[0x80, 0x80, 0x80, 0x01]),
            (268_435_455, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];

        for (value, expected) in cases {
            let encoded = encode_variable_byte_int(value).unwrap();
            assert_eq!(encoded, expected, "encoding {value}");
            assert_eq!(decode_variable_byte_int(&encoded).unwrap(), (value, expected.len()));
            assert_eq!(variable_byte_int_len(value), expected.len());
        }
    }

    #[test]
    fn variable_byte_int_boundaries_round_trip() {
        for exponent in 0..4 {
            let boundary = 128u32.pow(exponent + 1);
            for value in [boundary - 2, boundary - 1, boundary.min(MAX_VARIABLE_BYTE_INT)] {
                let encoded = encode_variable_byte_int(value).unwrap();
                assert_eq!(decode_variable_byte_int(&encoded).unwrap(), (value, encoded.len()));
            }
        }
    }

    #[test]
    fn variable_byte_int_above_ceiling_fails() {
        assert_eq!(
            encode_variable_byte_int(268_435_456),
            Err(EncodingError::ValueTooLarge(268_435_456))
        );

        let mut buf = BytesMut::new();
        assert!(buf.put_variable_byte_int(u32::MAX).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn variable_byte_int_with_fifth_byte_is_malformed() {
        assert_eq!(
            decode_variable_byte_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]),
            Err(DecodingError::MalformedVarInt)
        );
    }

    #[test]
    fn variable_byte_int_waits_for_more_bytes() {
        assert_eq!(decode_variable_byte_int(&[]), Err(DecodingError::Truncated));
        assert_eq!(decode_variable_byte_int(&[0x80, 0x80]), Err(DecodingError::Truncated));
    }

    #[test]
    fn string_at_ceiling_round_trips() {
        let value = "a".repeat(MAX_STRING_LENGTH);
        let encoded = encode_utf8_string(&value).unwrap();

        assert_eq!(&encoded[..2], &[0xFF, 0xFF]);
        assert_eq!(decode_utf8_string(&encoded).unwrap(), (value, MAX_STRING_LENGTH + 2));
    }

    #[test]
    fn string_above_ceiling_fails() {
        let value = "a".repeat(MAX_STRING_LENGTH + 1);
        assert_eq!(
            encode_utf8_string(&value),
            Err(EncodingError::StringTooLong(MAX_STRING_LENGTH + 1))
        );
    }

    #[test]
    fn string_length_counts_bytes_not_chars() {
        let encoded = encode_utf8_string("né").unwrap();
        assert_eq!(encoded, [0x00, 0x03, b'n', 0xC3, 0xA9]);
    }

    #[test]
    fn truncated_string_waits_for_more_bytes() {
        assert_eq!(decode_utf8_string(&[0x00]), Err(DecodingError::Truncated));
        assert_eq!(decode_utf8_string(&[0x00, 0x03, b'a']), Err(DecodingError::Truncated));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        assert_eq!(
            decode_utf8_string(&[0x00, 0x02, 0xC3, 0x28]),
            Err(DecodingError::MalformedString)
        );
    }

    #[test]
    fn counter_matches_writer() {
        let mut buf = BytesMut::new();
        buf.put_byte(1);
        buf.put_two_byte_int(2);
        buf.put_four_byte_int(3);
        buf.put_variable_byte_int(300).unwrap();
        buf.put_utf8_string_pair("key", "value").unwrap();

        let size = SizeCounter::measure(|out| {
            out.put_byte(1);
            out.put_two_byte_int(2);
            out.put_four_byte_int(3);
            out.put_variable_byte_int(300)?;
            out.put_utf8_string_pair("key", "value")
        });

        assert_eq!(size, buf.len());
    }

    #[test]
    fn readers_consume_exactly() {
        let mut buf = Bytes::from_static(&[0x00, 0x01, b'a', 0x00, 0x02, 0xAB, 0xCD, 0x7F]);

        assert_eq!(read_utf8_string(&mut buf).unwrap(), "a");
        assert_eq!(read_binary_data(&mut buf).unwrap(), Bytes::from_static(&[0xAB, 0xCD]));
        assert_eq!(read_variable_byte_int(&mut buf).unwrap(), 127);
        assert_eq!(read_u8(&mut buf), Err(DecodingError::Truncated));
    }
}
