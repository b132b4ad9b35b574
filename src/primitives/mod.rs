//! Low-level building blocks shared by the codec and the session.

/// Byte-level utilities and encoding/decoding.
///
/// Big-endian integers, a bounds-checked cursor and growth-on-write helpers.
pub mod bytes;

/// Query/response channel to the helper process.
pub mod channel;
