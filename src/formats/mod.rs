//! Binary formats
//!
//! On-disk files share one layout: a fixed little-endian header, a body,
//! and a 16-byte footer holding the CRC-64 of the body and of header+body.

pub mod contracted;
pub mod crc;
pub(crate) mod le;
pub mod restrictions;

pub use contracted::ContractedDbFile;
pub use restrictions::RestrictionsFile;
