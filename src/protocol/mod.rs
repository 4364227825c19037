//! Fixed-width binary query protocol
//!
//! A request is 16 bytes: four native-endian `f32`s `[min_x, min_y, max_x, max_y]`.
//! A response is the matching ids as native-endian `i32`s with no length prefix.

pub mod frame;

pub use frame::{
    decode_request, decode_response, encode_request, encode_response, BoundingBox, EntityId,
    ID_LEN, REQUEST_LEN,
};
