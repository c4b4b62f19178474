//! # Opaque Reference Tokens
//!
//! Tokens are the JSON serialization of a [`Reference`] encoded with
//! URL-safe base64 without padding, so they can be embedded in URLs as-is.
//! They are not meant to be built by clients.
//!
//! Every content item gets two tokens: one pinned to the concrete version it
//! was listed at, and one with the version forced to 0 ("latest").
//!
//! [`parse_reference`] is the single entry point for inbound reference
//! strings: anything starting with `/` is a legacy link, everything else is
//! a token. Each encoding keeps its own encode/decode pair.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::link::LegacyLink;
use crate::reference::{BackendId, Reference, ReferenceKind, LATEST_VERSION};

/// Serialized form of a reference. Field names are short to keep URLs short.
#[derive(Debug, Serialize, Deserialize)]
struct SerialReference {
    #[serde(rename = "d", default)]
    domain: String,
    #[serde(rename = "b", default)]
    backend: String,
    #[serde(rename = "k")]
    kind: u8,
    #[serde(rename = "v", default)]
    version: u64,
    #[serde(rename = "t", default)]
    texts: Vec<String>,
}

/// The two tokens generated for each content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Token carrying the concrete version.
    pub pinned: String,
    /// Token with version 0, re-resolved on every use.
    pub latest: String,
}

/// Encode a reference as an opaque token.
pub fn encode_token(reference: &Reference) -> Result<String, CodecError> {
    let serial = SerialReference {
        domain: reference.domain().to_string(),
        backend: reference.backend().as_str().to_string(),
        kind: reference.kind().tag(),
        version: reference.version(),
        texts: reference.texts().to_vec(),
    };
    let json = serde_json::to_vec(&serial).map_err(|e| CodecError::Malformed(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Encode the pinned and the latest token for a reference.
pub fn encode_token_pair(reference: &Reference) -> Result<TokenPair, CodecError> {
    Ok(TokenPair {
        pinned: encode_token(reference)?,
        latest: encode_token(&reference.with_version(LATEST_VERSION))?,
    })
}

/// Decode an opaque token back into a validated [`Reference`].
pub fn decode_token(token: &str) -> Result<Reference, CodecError> {
    if token.is_empty() {
        return Err(CodecError::Missing);
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| CodecError::Malformed(e.to_string()))?;
    let serial: SerialReference =
        serde_json::from_slice(&bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let kind = ReferenceKind::from_tag(serial.kind)?;
    Reference::from_parts(
        kind,
        serial.domain,
        BackendId::from_raw(serial.backend),
        serial.version,
        serial.texts,
    )
}

/// An inbound reference string, decoded according to its encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReference {
    /// An opaque token.
    Token(Reference),
    /// A legacy `/artefacts/...` or `/builds/downloads/...` link.
    Link(LegacyLink),
}

/// Decode either encoding.
pub fn parse_reference(input: &str) -> Result<ParsedReference, CodecError> {
    if input.is_empty() {
        return Err(CodecError::Missing);
    }
    if input.starts_with('/') {
        LegacyLink::parse(input).map(ParsedReference::Link)
    } else {
        decode_token(input).map(ParsedReference::Token)
    }
}
