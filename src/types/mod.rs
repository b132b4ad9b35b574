//! Identifier types shared by every layer of the bridge.
//!
//! Both histories address objects by 160-bit digests. They are kept as raw
//! bytes internally and rendered as 40 lower-case hex characters externally.

pub mod checksum;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use crate::error::{BridgeError, CorruptionKind, Result, Transience};

/// Width of a raw object identifier.
pub const OID_LEN: usize = 20;
/// Width of a hex-rendered object identifier.
pub const OID_HEX_LEN: usize = OID_LEN * 2;

macro_rules! oid_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
        pub struct $name([u8; OID_LEN]);

        impl $name {
            /// The all-zero identifier.
            pub const NULL: Self = Self([0; OID_LEN]);

            /// Wraps raw digest bytes.
            pub const fn from_raw(bytes: [u8; OID_LEN]) -> Self {
                Self(bytes)
            }

            /// Builds an identifier from a raw slice, which must be exactly 20 bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let raw: [u8; OID_LEN] = bytes.try_into().map_err(|_| {
                    BridgeError::InvalidId(format!(
                        "expected {OID_LEN} raw bytes, got {}",
                        bytes.len()
                    ))
                })?;
                Ok(Self(raw))
            }

            /// Decodes 40 hex characters, accepting either case.
            pub fn from_hex(hex: impl AsRef<[u8]>) -> Result<Self> {
                let hex = hex.as_ref();
                let mut raw = [0u8; OID_LEN];
                hex::decode_to_slice(hex, &mut raw).map_err(|err| {
                    BridgeError::InvalidId(format!(
                        "{:?}: {err}",
                        String::from_utf8_lossy(hex)
                    ))
                })?;
                Ok(Self(raw))
            }

            /// Raw digest bytes.
            pub fn as_bytes(&self) -> &[u8; OID_LEN] {
                &self.0
            }

            /// Lower-case hex rendering.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Whether this is the null identifier.
            pub fn is_null(&self) -> bool {
                self.0 == [0; OID_LEN]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = BridgeError;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_hex(s)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                Self::from_hex(&text).map_err(serde::de::Error::custom)
            }
        }
    };
}

oid_type!(
    /// Source-side revision identity: digest over sorted parents and full text.
    NodeId
);

oid_type!(
    /// Destination-side object identity.
    GitOid
);

impl NodeId {
    /// Orders the two parents bytewise, as the digest preimage requires.
    pub fn sorted_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
