// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{check_report_data, Session, VerifierState, VerifyError, Verifier};
use crate::evidence::EvidenceRequestClient;
use crate::payload::EvidencePayload;
use crate::report::ReportData;
use crate::tool::{self, EvidenceAuthority};
use log::{debug, info};
use sha2::{Digest, Sha384};
use std::sync::Arc;
use std::time::Duration;

/// Verifies SEV-SNP evidence against an [`EvidenceAuthority`].
///
/// After the local checks, the certificate chain, the report signature and
/// the measurement are checked in that order; the first failure wins. The
/// external checks share one call bounded by `timeout`.
pub struct SnpVerifier {
    session: Session,
    authority: Arc<dyn EvidenceAuthority>,
    timeout: Duration,
}

impl SnpVerifier {
    pub fn new(authority: Arc<dyn EvidenceAuthority>, timeout: Duration) -> Self {
        Self {
            session: Session::new(),
            authority,
            timeout,
        }
    }

    fn check(&self, expected: &ReportData) -> Result<(), VerifyError> {
        let payload = self.session.payload()?;
        check_report_data(&payload.report, expected)?;

        let authority = self.authority.clone();
        tool::bounded(self.timeout, move || external_checks(&*authority, &payload))?
    }
}

fn external_checks(
    authority: &dyn EvidenceAuthority,
    payload: &EvidencePayload,
) -> Result<Result<(), VerifyError>, tool::ToolError> {
    if !authority.validate_cert_chain(&payload.cert_chain)? {
        return Ok(Err(VerifyError::InvalidCertificateChain));
    }
    if !authority.verify_signature(&payload.report, &payload.cert_chain)? {
        return Ok(Err(VerifyError::InvalidSignature));
    }
    let expected = authority.expected_measurement()?;
    if payload.report.measurement != expected {
        debug!(
            "snp verifier: measurement {} expected {}",
            hex::encode(payload.report.measurement),
            hex::encode(expected)
        );
        return Ok(Err(VerifyError::MeasurementMismatch));
    }
    Ok(Ok(()))
}

impl Verifier for SnpVerifier {
    fn set_request_context(&mut self, request: EvidenceRequestClient) {
        self.session.bind_request(request);
    }

    fn set_evidence(&mut self, evidence: Vec<u8>) -> Result<(), VerifyError> {
        self.session.bind_evidence(evidence)
    }

    fn verify(&mut self, expected: &ReportData, peer_key: Option<&[u8]>) -> Result<(), VerifyError> {
        if let Some(key) = peer_key {
            debug!(
                "snp verifier: peer key sha384 {}",
                hex::encode(Sha384::digest(key))
            );
        }
        let result = self.check(expected);
        if result.is_ok() {
            info!("snp verifier: evidence accepted");
        }
        self.session.finish(result)
    }

    fn state(&self) -> VerifierState {
        self.session.state
    }
}
