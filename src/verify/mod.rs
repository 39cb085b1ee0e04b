// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evidence checkers.
//!
//! A [`Verifier`] walks `Unconfigured → RequestBound → EvidenceBound →
//! Verified | Rejected`. The evidence it receives is the server's
//! [`AttestationExtension`] record; its credential kind must be one the
//! bound request advertised.
//!
//! Every variant checks, in order, that the evidence is well formed and that
//! its `report_data` equals the value the verifying party sent. The SEV-SNP
//! variant then checks the certificate chain, the report signature and the
//! measurement through an [`EvidenceAuthority`](crate::tool::EvidenceAuthority).

use crate::evidence::{EvidenceRequestClient, WireError};
use crate::payload::{AttestationExtension, EvidencePayload};
use crate::report::{AttestationReport, ReportData};
use crate::tool::ToolError;
use log::{error, warn};
use subtle::ConstantTimeEq;
use thiserror::Error;

mod mock;
mod snp;

pub use mock::MockVerifier;
pub use snp::SnpVerifier;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("verifier used out of order")]
    NotConfigured,
    #[error("malformed evidence data")]
    MalformedEvidenceData,
    #[error("credential kind was not requested or is unknown")]
    UnsupportedCredentialKind,
    #[error("certificate chain is not valid")]
    InvalidCertificateChain,
    #[error("report signature is not valid")]
    InvalidSignature,
    #[error("measurement mismatch")]
    MeasurementMismatch,
    #[error("report data does not match the nonce")]
    NonceMismatch,
    #[error("verification tool failure")]
    ToolFailure(#[from] ToolError),
}

impl From<WireError> for VerifyError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::UnsupportedCredentialKind(_) => VerifyError::UnsupportedCredentialKind,
            _ => VerifyError::MalformedEvidenceData,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VerifierState {
    Unconfigured,
    RequestBound,
    EvidenceBound,
    Verified,
    Rejected,
}

pub trait Verifier: Send + Sync {
    /// Bind the request the evidence answers. Resets any earlier evidence.
    fn set_request_context(&mut self, request: EvidenceRequestClient);

    /// Bind the received attestation extension record.
    fn set_evidence(&mut self, evidence: Vec<u8>) -> Result<(), VerifyError>;

    /// Check the bound evidence against `expected`, the report data this
    /// party sent. Only legal once evidence is bound.
    fn verify(&mut self, expected: &ReportData, peer_key: Option<&[u8]>)
        -> Result<(), VerifyError>;

    fn state(&self) -> VerifierState;
}

/// The state every verifier variant shares.
#[derive(Debug)]
struct Session {
    state: VerifierState,
    request: Option<EvidenceRequestClient>,
    evidence: Option<Vec<u8>>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: VerifierState::Unconfigured,
            request: None,
            evidence: None,
        }
    }

    fn bind_request(&mut self, request: EvidenceRequestClient) {
        self.request = Some(request);
        self.evidence = None;
        self.state = VerifierState::RequestBound;
    }

    fn bind_evidence(&mut self, evidence: Vec<u8>) -> Result<(), VerifyError> {
        if self.state == VerifierState::Unconfigured {
            error!("verifier: evidence bound before the request context");
            return Err(VerifyError::NotConfigured);
        }
        self.evidence = Some(evidence);
        self.state = VerifierState::EvidenceBound;
        Ok(())
    }

    /// Decode the bound evidence, checking it answers the bound request.
    fn payload(&self) -> Result<EvidencePayload, VerifyError> {
        let (Some(request), Some(evidence)) = (&self.request, &self.evidence) else {
            return Err(VerifyError::NotConfigured);
        };
        if self.state != VerifierState::EvidenceBound {
            return Err(VerifyError::NotConfigured);
        }
        let extension = AttestationExtension::decode(evidence)?;
        if !request.accepts(extension.credential_kind) {
            return Err(VerifyError::UnsupportedCredentialKind);
        }
        Ok(extension.payload)
    }

    /// Record the outcome of a verification attempt.
    fn finish(&mut self, result: Result<(), VerifyError>) -> Result<(), VerifyError> {
        match &result {
            Ok(()) => self.state = VerifierState::Verified,
            Err(VerifyError::NotConfigured) => {
                error!("verifier: verify called in state {:?}", self.state);
            }
            Err(e) => {
                warn!("verifier: evidence rejected: {e}");
                self.state = VerifierState::Rejected;
            }
        }
        result
    }
}

/// Compare the report's nonce slot with `expected` in constant time.
fn check_report_data(report: &AttestationReport, expected: &ReportData) -> Result<(), VerifyError> {
    let equal: bool = report.report_data[..].ct_eq(&expected[..]).into();
    if !equal {
        return Err(VerifyError::NonceMismatch);
    }
    Ok(())
}
