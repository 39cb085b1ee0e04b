// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::evidence::{CredentialKind, Reader, WireError};
use crate::report::{AttestationReport, REPORT_SIZE};

/// SEV-SNP evidence: one attestation report and the certificate chain that
/// endorses it.
///
/// On the wire the report occupies its fixed layout and the certificate blob
/// takes every remaining byte.
#[derive(Clone, Debug, PartialEq)]
pub struct EvidencePayload {
    pub report: AttestationReport,
    pub cert_chain: Vec<u8>,
}

impl Default for EvidencePayload {
    fn default() -> Self {
        Self {
            report: AttestationReport::zeroed(),
            cert_chain: Vec::new(),
        }
    }
}

impl EvidencePayload {
    pub fn new(report: AttestationReport, cert_chain: Vec<u8>) -> Self {
        Self { report, cert_chain }
    }

    pub fn encoded_len(&self) -> usize {
        REPORT_SIZE + self.cert_chain.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(self.report.to_bytes());
        out.extend_from_slice(&self.cert_chain);
        out
    }

    /// Decode a payload spanning all of `bytes`. A payload without a
    /// certificate blob is malformed.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        Self::read(&mut reader)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let report = AttestationReport::read_from_prefix(reader.take(REPORT_SIZE)?)
            .map_err(|_| WireError::MalformedEvidenceData)?;
        let cert_chain = reader.rest();
        if cert_chain.is_empty() {
            return Err(WireError::MalformedEvidenceData);
        }
        Ok(Self {
            report,
            cert_chain: cert_chain.to_vec(),
        })
    }
}

/// What the server attaches to its certificate message: the credential
/// kind of the evidence followed by the evidence itself.
#[derive(Clone, Debug, PartialEq)]
pub struct AttestationExtension {
    pub credential_kind: CredentialKind,
    pub payload: EvidencePayload,
}

impl AttestationExtension {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.encoded_len());
        out.push(self.credential_kind as u8);
        out.extend_from_slice(self.payload.report.to_bytes());
        out.extend_from_slice(&self.payload.cert_chain);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let credential_kind = CredentialKind::try_from(reader.u8()?)?;
        let payload = EvidencePayload::read(&mut reader)?;
        Ok(Self {
            credential_kind,
            payload,
        })
    }
}
