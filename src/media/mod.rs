//! Media module for item representation and parsing.

pub mod item;
pub mod parser;

pub use item::{
    AcquisitionItem, CodecFamily, DrmType, Encoding, ItemKind, ParentRef, QualityTier,
};
pub use parser::{parse_codec, parse_item};
