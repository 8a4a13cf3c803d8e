//! UUID utilities

use uuid::{Builder, Uuid};

/// Build a version-4 UUID from 16 random bytes
///
/// Version and variant bits are overwritten, leaving 122 bits of randomness.
pub fn from_random_bytes(bytes: [u8; 16]) -> Uuid {
    Builder::from_random_bytes(bytes).into_uuid()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}
