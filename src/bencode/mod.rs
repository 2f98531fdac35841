pub mod bvalue;
pub mod decode;
pub mod encode;
pub mod error;

pub use bvalue::BValue;
pub use decode::decode_bencode;
pub use encode::{bvalue_to_json, encode_bvalue};
pub use error::BencodeError;
