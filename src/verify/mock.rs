// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{check_report_data, Session, VerifierState, VerifyError, Verifier};
use crate::evidence::EvidenceRequestClient;
use crate::report::ReportData;
use log::info;

/// Checks only that the evidence is well formed and bound to the expected
/// report data. Exercises the handshake wiring without hardware.
pub struct MockVerifier {
    session: Session,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self {
            session: Session::new(),
        }
    }
}

impl Default for MockVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier for MockVerifier {
    fn set_request_context(&mut self, request: EvidenceRequestClient) {
        self.session.bind_request(request);
    }

    fn set_evidence(&mut self, evidence: Vec<u8>) -> Result<(), VerifyError> {
        self.session.bind_evidence(evidence)
    }

    fn verify(&mut self, expected: &ReportData, _peer_key: Option<&[u8]>) -> Result<(), VerifyError> {
        let result = self
            .session
            .payload()
            .and_then(|payload| check_report_data(&payload.report, expected));
        if result.is_ok() {
            info!("mock verifier: evidence accepted");
        }
        self.session.finish(result)
    }

    fn state(&self) -> VerifierState {
        self.session.state
    }
}

#[cfg(all(test, feature = "attester"))]
mod tests {
    use super::*;
    use crate::attest::{Attester, MockAttester};
    use crate::evidence::{CredentialKind, EvidenceType};
    use crate::payload::{AttestationExtension, EvidencePayload};

    fn mock_evidence(report_data: &ReportData) -> Vec<u8> {
        let mut attester = MockAttester::new();
        attester.set_evidence_buffer(EvidencePayload::default());
        attester.attest(report_data).unwrap();
        AttestationExtension {
            credential_kind: CredentialKind::AmdSevSnp,
            payload: attester.take_evidence().unwrap(),
        }
        .encode()
    }

    fn bound_verifier(evidence: Vec<u8>) -> MockVerifier {
        let mut verifier = MockVerifier::new();
        verifier.set_request_context(EvidenceRequestClient::new(
            vec![EvidenceType::SEV_SNP_BINARY],
            1,
        ));
        verifier.set_evidence(evidence).unwrap();
        verifier
    }

    #[test]
    fn accepts_evidence_bound_to_nonce() {
        let nonce = [0x33; 64];
        let mut verifier = bound_verifier(mock_evidence(&nonce));
        verifier.verify(&nonce, None).unwrap();
        assert_eq!(verifier.state(), VerifierState::Verified);
    }

    #[test]
    fn rejects_other_nonce() {
        let mut verifier = bound_verifier(mock_evidence(&[0x33; 64]));
        let result = verifier.verify(&[0x34; 64], None);
        assert!(matches!(result, Err(VerifyError::NonceMismatch)));
        assert_eq!(verifier.state(), VerifierState::Rejected);
    }

    #[test]
    fn verify_before_evidence_is_not_configured() {
        let mut verifier = MockVerifier::new();
        assert!(matches!(
            verifier.verify(&[0; 64], None),
            Err(VerifyError::NotConfigured)
        ));
        verifier.set_request_context(EvidenceRequestClient::new(vec![], 0));
        assert!(matches!(
            verifier.verify(&[0; 64], None),
            Err(VerifyError::NotConfigured)
        ));
        assert_eq!(verifier.state(), VerifierState::RequestBound);
    }

    #[test]
    fn verify_twice_is_not_configured() {
        let nonce = [1; 64];
        let mut verifier = bound_verifier(mock_evidence(&nonce));
        verifier.verify(&nonce, None).unwrap();
        assert!(matches!(
            verifier.verify(&nonce, None),
            Err(VerifyError::NotConfigured)
        ));
        assert_eq!(verifier.state(), VerifierState::Verified);
    }

    #[test]
    fn truncated_evidence_is_malformed() {
        let mut evidence = mock_evidence(&[1; 64]);
        evidence.truncate(200);
        let mut verifier = bound_verifier(evidence);
        assert!(matches!(
            verifier.verify(&[1; 64], None),
            Err(VerifyError::MalformedEvidenceData)
        ));
        assert_eq!(verifier.state(), VerifierState::Rejected);
    }

    #[test]
    fn unknown_credential_kind_is_unsupported() {
        let mut evidence = mock_evidence(&[1; 64]);
        evidence[0] = 0xEE;
        let mut verifier = bound_verifier(evidence);
        assert!(matches!(
            verifier.verify(&[1; 64], None),
            Err(VerifyError::UnsupportedCredentialKind)
        ));
    }

    #[test]
    fn unrequested_credential_kind_is_unsupported() {
        let mut verifier = MockVerifier::new();
        verifier.set_request_context(EvidenceRequestClient::new(vec![], 1));
        verifier.set_evidence(mock_evidence(&[1; 64])).unwrap();
        assert!(matches!(
            verifier.verify(&[1; 64], None),
            Err(VerifyError::UnsupportedCredentialKind)
        ));
    }
}
