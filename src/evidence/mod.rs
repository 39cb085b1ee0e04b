// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evidence negotiation records exchanged in the client's hello.
//!
//! The encoding is private to the two endpoints of this crate: integers are
//! written in native byte order and records carry no length prefix, so every
//! decoder reports how many bytes it consumed.
//!
//! ```text
//! EvidenceType          := credential_kind(u8) | type_encoding(u8) | variant
//!   variant(CONTENT_FORMAT) := content_format(u8)
//!   variant(MEDIA_TYPE)     := media_type (NUL-terminated)
//! EvidenceRequestClient := count(usize) | nonce(i64) | EvidenceType{count}
//! ```

use std::fmt;
use std::mem::size_of;
use thiserror::Error;

mod reader;

pub(crate) use reader::Reader;

/// Longest media type accepted, excluding the terminating NUL.
pub const MAX_MEDIA_TYPE_LEN: usize = 255;

const COUNT_SIZE: usize = size_of::<usize>();
const NONCE_SIZE: usize = size_of::<i64>();
const MIN_EVIDENCE_TYPE_SIZE: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed evidence data")]
    MalformedEvidenceData,
    #[error("unsupported credential kind {0:#04x}")]
    UnsupportedCredentialKind(u8),
    #[error("unsupported type encoding {0:#04x}")]
    UnsupportedEncoding(u8),
    #[error("unsupported content format {0:#04x}")]
    UnsupportedContentFormat(u8),
    #[error("invalid media type")]
    InvalidMediaType,
}

/// Attestation scheme that produced a piece of evidence.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    AmdSevSnp = 0,
}

impl TryFrom<u8> for CredentialKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CredentialKind::AmdSevSnp),
            other => Err(WireError::UnsupportedCredentialKind(other)),
        }
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeEncoding {
    ContentFormat = 0,
    MediaType = 1,
}

impl TryFrom<u8> for TypeEncoding {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TypeEncoding::ContentFormat),
            1 => Ok(TypeEncoding::MediaType),
            other => Err(WireError::UnsupportedEncoding(other)),
        }
    }
}

/// Known binary layouts.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// Raw [`AttestationReport`](crate::report::AttestationReport) followed by the certificate blob.
    BinaryFormat = 0,
}

impl TryFrom<u8> for ContentFormat {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ContentFormat::BinaryFormat),
            other => Err(WireError::UnsupportedContentFormat(other)),
        }
    }
}

/// A content type name: non-empty printable ASCII of at most
/// [`MAX_MEDIA_TYPE_LEN`] bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    pub fn new(name: &str) -> Result<Self, WireError> {
        let printable = name.bytes().all(|b| b == b' ' || b.is_ascii_graphic());
        if name.is_empty() || name.len() > MAX_MEDIA_TYPE_LEN || !printable {
            return Err(WireError::InvalidMediaType);
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The evidence representation a party supports, keyed by its encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SupportedContent {
    ContentFormat(ContentFormat),
    MediaType(MediaType),
}

impl SupportedContent {
    pub fn type_encoding(&self) -> TypeEncoding {
        match self {
            SupportedContent::ContentFormat(_) => TypeEncoding::ContentFormat,
            SupportedContent::MediaType(_) => TypeEncoding::MediaType,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EvidenceType {
    pub credential_kind: CredentialKind,
    pub supported_content: SupportedContent,
}

impl EvidenceType {
    /// SEV-SNP evidence in the raw binary layout.
    pub const SEV_SNP_BINARY: EvidenceType = EvidenceType {
        credential_kind: CredentialKind::AmdSevSnp,
        supported_content: SupportedContent::ContentFormat(ContentFormat::BinaryFormat),
    };

    pub fn type_encoding(&self) -> TypeEncoding {
        self.supported_content.type_encoding()
    }

    pub fn encoded_len(&self) -> usize {
        let variant = match &self.supported_content {
            SupportedContent::ContentFormat(_) => 1,
            SupportedContent::MediaType(media_type) => media_type.0.len() + 1,
        };
        2 + variant
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.credential_kind as u8);
        out.push(self.type_encoding() as u8);
        match &self.supported_content {
            SupportedContent::ContentFormat(format) => out.push(*format as u8),
            SupportedContent::MediaType(media_type) => {
                out.extend_from_slice(media_type.0.as_bytes());
                out.push(0);
            }
        }
    }

    /// Decode one record from the front of `bytes`, returning it together with
    /// the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), WireError> {
        let mut reader = Reader::new(bytes);
        let evidence_type = Self::read(&mut reader)?;
        Ok((evidence_type, reader.position()))
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let credential_kind = CredentialKind::try_from(reader.u8()?)?;
        // the discriminant decides how the rest of the record is read
        let type_encoding = TypeEncoding::try_from(reader.u8()?)?;
        let supported_content = match type_encoding {
            TypeEncoding::ContentFormat => {
                SupportedContent::ContentFormat(ContentFormat::try_from(reader.u8()?)?)
            }
            TypeEncoding::MediaType => {
                let raw = reader.c_str(MAX_MEDIA_TYPE_LEN)?;
                let name =
                    std::str::from_utf8(raw).map_err(|_| WireError::MalformedEvidenceData)?;
                SupportedContent::MediaType(
                    MediaType::new(name).map_err(|_| WireError::MalformedEvidenceData)?,
                )
            }
        };
        Ok(Self {
            credential_kind,
            supported_content,
        })
    }
}

/// The evidence types a client accepts, in order of preference, and the
/// request nonce used to match a response to this request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvidenceRequestClient {
    pub evidence_types: Vec<EvidenceType>,
    pub nonce: i64,
}

impl EvidenceRequestClient {
    pub fn new(evidence_types: Vec<EvidenceType>, nonce: i64) -> Self {
        Self {
            evidence_types,
            nonce,
        }
    }

    /// Whether `kind` is among the advertised credential kinds.
    pub fn accepts(&self, kind: CredentialKind) -> bool {
        self.evidence_types
            .iter()
            .any(|evidence_type| evidence_type.credential_kind == kind)
    }

    pub fn encoded_len(&self) -> usize {
        COUNT_SIZE
            + NONCE_SIZE
            + self
                .evidence_types
                .iter()
                .map(EvidenceType::encoded_len)
                .sum::<usize>()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.evidence_types.len().to_ne_bytes());
        out.extend_from_slice(&self.nonce.to_ne_bytes());
        for evidence_type in &self.evidence_types {
            evidence_type.encode_into(&mut out);
        }
        out
    }

    /// Decode a request from the front of `bytes`, returning it together with
    /// the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), WireError> {
        let mut reader = Reader::new(bytes);
        let count = usize::from_ne_bytes(reader.array::<COUNT_SIZE>()?);
        let nonce = i64::from_ne_bytes(reader.array::<NONCE_SIZE>()?);

        if count > reader.remaining() / MIN_EVIDENCE_TYPE_SIZE {
            return Err(WireError::MalformedEvidenceData);
        }

        let mut evidence_types = Vec::with_capacity(count);
        for _ in 0..count {
            evidence_types.push(EvidenceType::read(&mut reader)?);
        }

        let request = Self {
            evidence_types,
            nonce,
        };
        Ok((request, reader.position()))
    }
}
