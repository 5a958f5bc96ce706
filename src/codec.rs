//! Payload transcoding — `spec.md` §4.1.
//!
//! `none` is the identity transform. `base64` encodes with the standard
//! alphabet and `=` padding (via the `base64` crate), but *decodes*
//! permissively: absent padding is fine, and the scan simply stops at the
//! first byte outside the alphabet rather than erroring. That quirk is
//! inherited from `original_source/src/encoders.hpp`'s hand-rolled decoder,
//! so it is reproduced by hand here rather than deferred to a strict
//! library decode.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::GatewayError;

const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    None,
    Base64,
}

impl Codec {
    /// Parses a `request_encoding`/`response_encoding` handshake field.
    /// Empty string means `none`; anything else unrecognized is a
    /// handshake error.
    pub fn parse(name: &str) -> Result<Self, GatewayError> {
        match name {
            "" | "none" => Ok(Codec::None),
            "base64" => Ok(Codec::Base64),
            other => Err(GatewayError::handshake(format!(
                "unknown codec: {other}"
            ))),
        }
    }

    pub fn decode(&self, s: &str) -> Vec<u8> {
        match self {
            Codec::None => s.as_bytes().to_vec(),
            Codec::Base64 => base64_decode_permissive(s),
        }
    }

    /// Encodes outgoing payload bytes. `none` requires valid UTF-8 (JSON
    /// strings can't carry arbitrary bytes) and surfaces a
    /// `SerializationError` otherwise — see SPEC_FULL.md Open Question #2.
    pub fn encode(&self, bytes: &[u8]) -> Result<String, GatewayError> {
        match self {
            Codec::None => String::from_utf8(bytes.to_vec())
                .map_err(|e| GatewayError::serialization(format!("payload is not valid utf-8: {e}"))),
            Codec::Base64 => Ok(STANDARD.encode(bytes)),
        }
    }
}

fn base64_decode_permissive(input: &str) -> Vec<u8> {
    let mut table = [-1i16; 256];
    for (i, &b) in ALPHABET.iter().enumerate() {
        table[b as usize] = i as i16;
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits: i32 = -8;
    for &b in input.as_bytes() {
        let v = table[b as usize];
        if v < 0 {
            break;
        }
        acc = (acc << 6) | v as u32;
        bits += 6;
        if bits >= 0 {
            out.push(((acc >> bits) & 0xFF) as u8);
            bits -= 8;
        }
    }
    out
}
