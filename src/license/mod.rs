//! License module.
//!
//! Provides:
//! - License negotiation with voucher reuse
//! - Voucher persistence

pub mod negotiator;
pub mod voucher;

pub use negotiator::{License, LicenseNegotiator};
pub use voucher::{load_voucher, save_voucher, Voucher};
