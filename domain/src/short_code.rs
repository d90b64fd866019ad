//! Short code generation strategies.

use uuid::Uuid;

use crate::base62::encode_u128;
use crate::{ShortCode, ShortCodeGenerator};

/// Renders a fresh UUIDv7 in base62. Codes are time ordered and carry 74
/// random bits, so they never depend on what the caller asked for.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidShortCodeGenerator;

impl UuidShortCodeGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ShortCodeGenerator for UuidShortCodeGenerator {
    fn next_code(&self) -> ShortCode {
        let raw = encode_u128(Uuid::now_v7().as_u128());
        // base62 output is alphanumeric and at most 22 chars
        ShortCode::new(raw).unwrap_or_else(|_| ShortCode(Uuid::now_v7().simple().to_string()))
    }
}
