//! Primitive field codec for protocol records.
//!
//! The ZooKeeper binary format is a fixed sequence of primitively-typed
//! fields per record, with no tags and no padding:
//!
//! | Kind       | Encoding                                          |
//! |------------|---------------------------------------------------|
//! | bool       | 1 byte, 0 or 1                                    |
//! | i32, i64   | fixed-width, big-endian                           |
//! | string     | u32 length N, then N UTF-8 bytes                  |
//! | byte array | i32 length N; N = -1 encodes a null array         |
//! | array of T | u32 count, then that many encoded elements        |
//!
//! Readers advance a `&mut &[u8]` cursor and fail with a recoverable
//! [`WireError::ShortBuffer`] when a field runs past the payload; writers
//! append to a growable [`BytesMut`] and cannot fail.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{WireError, WireResult};

/// Ensures the cursor has at least `need` bytes remaining.
pub(crate) const fn ensure_remaining(buf: &[u8], need: usize) -> WireResult<()> {
    if buf.len() < need {
        return Err(WireError::ShortBuffer {
            need,
            have: buf.len(),
        });
    }
    Ok(())
}

/// Decodes a single-byte bool.
///
/// # Errors
/// Returns `ShortBuffer` if the payload is exhausted.
pub fn get_bool(buf: &mut &[u8]) -> WireResult<bool> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

/// Decodes a big-endian i32.
///
/// # Errors
/// Returns `ShortBuffer` if the payload is exhausted.
pub fn get_i32(buf: &mut &[u8]) -> WireResult<i32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_i32())
}

/// Decodes a big-endian i64.
///
/// # Errors
/// Returns `ShortBuffer` if the payload is exhausted.
pub fn get_i64(buf: &mut &[u8]) -> WireResult<i64> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_i64())
}

/// Decodes a u32-length-prefixed UTF-8 string.
///
/// # Errors
/// Returns `ShortBuffer` if the payload is exhausted, `InvalidString` if
/// the bytes are not UTF-8.
pub fn get_string(buf: &mut &[u8]) -> WireResult<String> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_u32() as usize;
    ensure_remaining(buf, len)?;

    let s = std::str::from_utf8(&buf[..len]).map_err(|_| WireError::InvalidString)?;
    let s = s.to_owned();
    buf.advance(len);
    Ok(s)
}

/// Decodes an i32-length-prefixed byte array. A `-1` length (the wire's
/// null array) decodes as an empty vector.
///
/// # Errors
/// Returns `ShortBuffer` if the payload is exhausted.
pub fn get_buffer(buf: &mut &[u8]) -> WireResult<Vec<u8>> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_i32();
    if len < 0 {
        return Ok(Vec::new());
    }

    let len = len as usize;
    ensure_remaining(buf, len)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

/// Decodes a u32-counted array of strings.
///
/// # Errors
/// Returns `ShortBuffer` or `InvalidString` from the element decoder.
pub fn get_string_vec(buf: &mut &[u8]) -> WireResult<Vec<String>> {
    ensure_remaining(buf, 4)?;
    let count = buf.get_u32() as usize;

    // An element is at least its 4-byte length prefix, so a hostile count
    // cannot reserve more memory than the payload can justify.
    let mut items = Vec::with_capacity(count.min(buf.len() / 4));
    for _ in 0..count {
        items.push(get_string(buf)?);
    }
    Ok(items)
}

/// Encodes a bool as one byte.
pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Encodes a big-endian i32.
pub fn put_i32(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

/// Encodes a big-endian i64.
pub fn put_i64(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

/// Encodes a u32-length-prefixed UTF-8 string.
pub fn put_string(buf: &mut BytesMut, value: &str) {
    // Safe cast: frame sizes are bounded well under u32::MAX.
    #[allow(clippy::cast_possible_truncation)]
    let len = value.len() as u32;
    buf.put_u32(len);
    buf.put_slice(value.as_bytes());
}

/// Encodes an i32-length-prefixed byte array.
pub fn put_buffer(buf: &mut BytesMut, value: &[u8]) {
    // Safe cast: frame sizes are bounded well under i32::MAX.
    #[allow(clippy::cast_possible_truncation)]
    let len = value.len() as i32;
    buf.put_i32(len);
    buf.put_slice(value);
}

/// Encodes a u32-counted array of strings.
pub fn put_string_vec(buf: &mut BytesMut, values: &[String]) {
    // Safe cast: element counts are bounded by the frame size.
    #[allow(clippy::cast_possible_truncation)]
    let count = values.len() as u32;
    buf.put_u32(count);
    for value in values {
        put_string(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_round_trip() {
        let mut buf = BytesMut::new();
        put_i32(&mut buf, -11);
        assert_eq!(&buf[..], &[0xff, 0xff, 0xff, 0xf5]);

        let mut cursor = &buf[..];
        assert_eq!(get_i32(&mut cursor).unwrap(), -11);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_i64_big_endian() {
        let mut buf = BytesMut::new();
        put_i64(&mut buf, 0x0102_0304_0506_0708);
        assert_eq!(&buf[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "/a/b");

        let mut cursor = &buf[..];
        assert_eq!(get_string(&mut cursor).unwrap(), "/a/b");
    }

    #[test]
    fn test_string_rejects_bad_utf8() {
        let raw = [0u8, 0, 0, 2, 0xff, 0xfe];
        let mut cursor = &raw[..];
        assert!(matches!(
            get_string(&mut cursor),
            Err(WireError::InvalidString)
        ));
    }

    #[test]
    fn test_null_buffer_decodes_empty() {
        let raw = [0xffu8, 0xff, 0xff, 0xff];
        let mut cursor = &raw[..];
        assert_eq!(get_buffer(&mut cursor).unwrap(), Vec::<u8>::new());
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_buffer_round_trip() {
        let mut buf = BytesMut::new();
        put_buffer(&mut buf, b"hi");

        let mut cursor = &buf[..];
        assert_eq!(get_buffer(&mut cursor).unwrap(), b"hi");
    }

    #[test]
    fn test_short_buffer_is_recoverable_error() {
        let raw = [0u8, 0, 0];
        let mut cursor = &raw[..];
        assert!(matches!(
            get_i32(&mut cursor),
            Err(WireError::ShortBuffer { need: 4, have: 3 })
        ));
    }

    #[test]
    fn test_string_vec_round_trip() {
        let values = vec!["a".to_owned(), "bc".to_owned()];
        let mut buf = BytesMut::new();
        put_string_vec(&mut buf, &values);

        let mut cursor = &buf[..];
        assert_eq!(get_string_vec(&mut cursor).unwrap(), values);
    }

    #[test]
    fn test_hostile_count_does_not_overallocate() {
        // Announces u32::MAX strings with no payload behind it.
        let raw = [0xffu8, 0xff, 0xff, 0xff];
        let mut cursor = &raw[..];
        assert!(matches!(
            get_string_vec(&mut cursor),
            Err(WireError::ShortBuffer { .. })
        ));
    }
}
