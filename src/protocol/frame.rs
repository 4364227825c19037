use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Size of a request frame on the wire
pub const REQUEST_LEN: usize = 16;

/// Size of one id in a response
pub const ID_LEN: usize = 4;

/// Identifier of an indexed entity
pub type EntityId = i32;

/// Axis-aligned query rectangle, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A box with inverted (or NaN) bounds contains nothing
    pub fn is_degenerate(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        f64::from(self.min_x) <= x
            && x <= f64::from(self.max_x)
            && f64::from(self.min_y) <= y
            && y <= f64::from(self.max_y)
    }
}

/// Decode a complete request frame
#[inline]
pub fn decode_request(frame: &[u8; REQUEST_LEN]) -> BoundingBox {
    let mut buf = &frame[..];
    BoundingBox {
        min_x: buf.get_f32_ne(),
        min_y: buf.get_f32_ne(),
        max_x: buf.get_f32_ne(),
        max_y: buf.get_f32_ne(),
    }
}

/// Encode a request frame (client side)
pub fn encode_request(bbox: &BoundingBox) -> [u8; REQUEST_LEN] {
    let mut frame = [0u8; REQUEST_LEN];
    let mut buf = &mut frame[..];
    buf.put_f32_ne(bbox.min_x);
    buf.put_f32_ne(bbox.min_y);
    buf.put_f32_ne(bbox.max_x);
    buf.put_f32_ne(bbox.max_y);
    frame
}

/// Append `ids` to `out`, refusing result sets larger than `limit`
///
/// Nothing is written when the limit is exceeded. Returns the number of bytes
/// appended.
pub fn encode_response(ids: &[EntityId], limit: usize, out: &mut BytesMut) -> Result<usize> {
    if ids.len() > limit {
        return Err(Error::ResponseTooLarge {
            count: ids.len(),
            limit,
        });
    }

    let len = ids.len() * ID_LEN;
    out.reserve(len);
    for &id in ids {
        out.put_i32_ne(id);
    }
    Ok(len)
}

/// Decode a response body (client side)
///
/// Trailing bytes that do not form a whole id are a protocol error.
pub fn decode_response(mut data: &[u8]) -> Result<Vec<EntityId>> {
    if data.len() % ID_LEN != 0 {
        return Err(Error::Protocol(format!(
            "response length {} is not a multiple of {}",
            data.len(),
            ID_LEN
        )));
    }

    let mut ids = Vec::with_capacity(data.len() / ID_LEN);
    while data.has_remaining() {
        ids.push(data.get_i32_ne());
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_native_endian_floats() {
        let mut frame = [0u8; REQUEST_LEN];
        frame[0..4].copy_from_slice(&0.5f32.to_ne_bytes());
        frame[4..8].copy_from_slice(&(-1.0f32).to_ne_bytes());
        frame[8..12].copy_from_slice(&10.0f32.to_ne_bytes());
        frame[12..16].copy_from_slice(&20.25f32.to_ne_bytes());

        let bbox = decode_request(&frame);
        assert_eq!(bbox, BoundingBox::new(0.5, -1.0, 10.0, 20.25));
        assert_eq!(encode_request(&bbox), frame);
    }

    #[test]
    fn encodes_ids_contiguously() {
        let mut out = BytesMut::new();
        let written = encode_response(&[5, -3, 9], 8, &mut out).unwrap();

        assert_eq!(written, 12);
        assert_eq!(&out[0..4], &5i32.to_ne_bytes());
        assert_eq!(&out[4..8], &(-3i32).to_ne_bytes());
        assert_eq!(&out[8..12], &9i32.to_ne_bytes());
        assert_eq!(decode_response(&out).unwrap(), vec![5, -3, 9]);
    }

    #[test]
    fn empty_result_encodes_nothing() {
        let mut out = BytesMut::new();
        assert_eq!(encode_response(&[], 8, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn oversized_result_is_rejected_untouched() {
        let mut out = BytesMut::new();
        let err = encode_response(&[1, 2, 3], 2, &mut out).unwrap_err();

        assert!(matches!(err, Error::ResponseTooLarge { count: 3, limit: 2 }));
        assert!(out.is_empty());
    }

    #[test]
    fn ragged_response_is_a_protocol_error() {
        assert!(matches!(
            decode_response(&[0u8; 6]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn degenerate_boxes() {
        assert!(BoundingBox::new(10.0, 0.0, 0.0, 10.0).is_degenerate());
        assert!(BoundingBox::new(0.0, 10.0, 10.0, 0.0).is_degenerate());
        assert!(BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0).is_degenerate());
        assert!(!BoundingBox::new(1.0, 1.0, 1.0, 1.0).is_degenerate());
    }

    #[test]
    fn containment_is_closed() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(bbox.contains(0.0, 0.0));
        assert!(bbox.contains(10.0, 10.0));
        assert!(bbox.contains(1.0, 1.0));
        assert!(!bbox.contains(10.5, 1.0));
        assert!(!bbox.contains(20.0, 20.0));
    }
}
