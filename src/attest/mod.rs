// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evidence producers.
//!
//! An [`Attester`] fills a caller-owned [`EvidencePayload`]: the payload is
//! moved in with [`Attester::set_evidence_buffer`], populated by
//! [`Attester::attest`] and moved back out with [`Attester::take_evidence`].

use crate::evidence::CredentialKind;
use crate::payload::EvidencePayload;
use crate::report::ReportData;
use crate::tool::ToolError;
use thiserror::Error;

mod mock;
mod snp;

pub use mock::{mock_measurement, MockAttester, MOCK_CERT_CHAIN_LEN, MOCK_PATTERN};
pub use snp::SnpAttester;

#[derive(Error, Debug)]
pub enum AttestError {
    #[error("attest called before an evidence buffer was bound")]
    NotConfigured,
    #[error("attestation tool failure")]
    ToolFailure(#[from] ToolError),
}

pub trait Attester: Send + Sync {
    /// Bind the payload the next [`attest`](Attester::attest) call fills in.
    fn set_evidence_buffer(&mut self, payload: EvidencePayload);

    /// Populate the bound payload with evidence carrying `report_data`.
    fn attest(&mut self, report_data: &ReportData) -> Result<(), AttestError>;

    /// Unbind and return the payload.
    fn take_evidence(&mut self) -> Option<EvidencePayload>;

    fn credential_kind(&self) -> CredentialKind {
        CredentialKind::AmdSevSnp
    }
}
