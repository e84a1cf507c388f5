//! Format selection module.

pub mod selector;

pub use selector::{select, FormatChoice, Preferences};
