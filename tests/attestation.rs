// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(all(feature = "attester", feature = "verifier"))]

use seats::evidence::{CredentialKind, EvidenceType};
use seats::ext::{
    AdapterConfig, AttestationOutcome, AttesterBackend, ClientExtension, ExtensionError,
    FailurePolicy, ServerExtension, ServerState, VerifierBackend,
};
use seats::nonce::ClientRandom;
use seats::payload::AttestationExtension;
use seats::report::{AttestationReport, Measurement, ReportData, REPORT_SIZE};
use seats::tool::{EvidenceAuthority, ReportSource, ToolError};
use seats::verify::VerifyError;
use std::sync::Arc;
use std::time::Duration;

fn client(config: &AdapterConfig, backend: VerifierBackend) -> ClientExtension {
    ClientExtension::new(config.verifier(backend), config.policy)
}

fn server(config: &AdapterConfig, backend: AttesterBackend) -> ServerExtension {
    ServerExtension::new(config.attester(backend))
}

/// Run both sides of the exchange without a TLS stack. Returns the server's
/// extension data, if any.
fn exchange(
    client: &mut ClientExtension,
    server: &mut ServerExtension,
    client_random: &ClientRandom,
) -> Result<Option<Vec<u8>>, ExtensionError> {
    let hello = client.add(client_random)?;
    server.parse(hello.as_ref())?;
    let Some(evidence) = server.add()? else {
        return Ok(None);
    };
    client.parse(evidence.as_ref(), None)?;
    Ok(Some(evidence.as_ref().to_vec()))
}

#[test]
fn mock_exchange_is_accepted() {
    let config = AdapterConfig::default();
    let mut client = client(&config, VerifierBackend::Mock);
    let mut server = server(&config, AttesterBackend::Mock);

    let evidence = exchange(&mut client, &mut server, &[0xa5; 32])
        .unwrap()
        .unwrap();
    assert!(client.outcome().is_accepted());
    assert!(matches!(server.state(), ServerState::Attested));

    let extension = AttestationExtension::decode(&evidence).unwrap();
    assert_eq!(extension.credential_kind, CredentialKind::AmdSevSnp);
    assert_eq!(extension.payload.report.report_data, [0xa5; 64]);
}

#[test]
fn replayed_evidence_is_rejected() {
    let config = AdapterConfig {
        policy: FailurePolicy::Flag,
        ..Default::default()
    };
    let mut first = client(&config, VerifierBackend::Mock);
    let mut server_one = server(&config, AttesterBackend::Mock);
    let captured = exchange(&mut first, &mut server_one, &[1; 32])
        .unwrap()
        .unwrap();
    assert!(first.outcome().is_accepted());

    // same client, new connection with a new random
    first.prepare_connection();
    first.add(&[2; 32]).unwrap();
    first.parse(&captured, None).unwrap();
    assert!(matches!(
        first.outcome(),
        AttestationOutcome::Rejected(VerifyError::NonceMismatch)
    ));
}

#[test]
fn truncated_evidence_never_verifies() {
    let config = AdapterConfig::default();
    let mut donor = client(&config, VerifierBackend::Mock);
    let mut server = server(&config, AttesterBackend::Mock);
    let random = [7; 32];
    let evidence = exchange(&mut donor, &mut server, &random).unwrap().unwrap();

    // every cut through the kind byte, the report or the first chain byte
    for len in 0..=1 + REPORT_SIZE {
        let mut client = client(&config, VerifierBackend::Mock);
        client.add(&random).unwrap();
        let result = client.parse(&evidence[..len], None);
        assert!(
            matches!(result, Err(ExtensionError::AttestationRejected)),
            "prefix of {len} bytes"
        );
        assert!(matches!(
            client.outcome(),
            AttestationOutcome::Rejected(VerifyError::MalformedEvidenceData)
        ));
    }
}

#[test]
fn server_declining_leaves_outcome_missing() {
    let config = AdapterConfig::default();
    let media = EvidenceType {
        credential_kind: CredentialKind::AmdSevSnp,
        supported_content: seats::evidence::SupportedContent::MediaType(
            seats::evidence::MediaType::new("application/cbor").unwrap(),
        ),
    };
    let mut client = ClientExtension::with_evidence_types(
        config.verifier(VerifierBackend::Mock),
        config.policy,
        vec![media],
    );
    let mut server = server(&config, AttesterBackend::Mock);

    assert!(exchange(&mut client, &mut server, &[3; 32]).unwrap().is_none());
    assert!(matches!(server.state(), ServerState::Declined(_)));
    assert!(matches!(client.outcome(), AttestationOutcome::Missing));
}

/// Stands in for both sides of the SEV-SNP tooling.
struct FakePlatform {
    measurement: Measurement,
    expected: Measurement,
    delay: Duration,
}

impl FakePlatform {
    fn new() -> Self {
        Self {
            measurement: [0x33; 48],
            expected: [0x33; 48],
            delay: Duration::ZERO,
        }
    }
}

const CHAIN: &[u8] = b"-----BEGIN CERTIFICATE-----\nfake\n-----END CERTIFICATE-----\n";

impl ReportSource for FakePlatform {
    fn generate_report(&self, report_data: &ReportData) -> Result<AttestationReport, ToolError> {
        std::thread::sleep(self.delay);
        let mut report = AttestationReport::zeroed();
        report.report_data = *report_data;
        report.measurement = self.measurement;
        report.signature[..4].copy_from_slice(b"sig!");
        Ok(report)
    }

    fn certificate_chain(&self) -> Result<Vec<u8>, ToolError> {
        Ok(CHAIN.to_vec())
    }
}

impl EvidenceAuthority for FakePlatform {
    fn validate_cert_chain(&self, cert_chain: &[u8]) -> Result<bool, ToolError> {
        Ok(cert_chain == CHAIN)
    }

    fn verify_signature(
        &self,
        report: &AttestationReport,
        _cert_chain: &[u8],
    ) -> Result<bool, ToolError> {
        Ok(&report.signature[..4] == b"sig!")
    }

    fn expected_measurement(&self) -> Result<Measurement, ToolError> {
        Ok(self.expected)
    }
}

#[test]
fn snp_backends_accept_matching_platform() {
    let config = AdapterConfig::default();
    let platform = Arc::new(FakePlatform::new());
    let mut client = client(&config, VerifierBackend::Snp(platform.clone()));
    let mut server = server(&config, AttesterBackend::Snp(platform));

    exchange(&mut client, &mut server, &[9; 32]).unwrap().unwrap();
    assert!(client.outcome().is_accepted());
}

#[test]
fn snp_backends_reject_unexpected_measurement() {
    let config = AdapterConfig::default();
    let platform = Arc::new(FakePlatform {
        expected: [0x44; 48],
        ..FakePlatform::new()
    });
    let mut client = client(&config, VerifierBackend::Snp(platform.clone()));
    let mut server = server(&config, AttesterBackend::Snp(platform));

    let result = exchange(&mut client, &mut server, &[9; 32]);
    assert!(matches!(result, Err(ExtensionError::AttestationRejected)));
    assert!(matches!(
        client.outcome(),
        AttestationOutcome::Rejected(VerifyError::MeasurementMismatch)
    ));
}

#[test]
fn slow_report_source_fails_attestation() {
    let config = AdapterConfig {
        tool_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let platform = Arc::new(FakePlatform {
        delay: Duration::from_secs(2),
        ..FakePlatform::new()
    });
    let mut client = client(&config, VerifierBackend::Mock);
    let mut server = server(&config, AttesterBackend::Snp(platform));

    let result = exchange(&mut client, &mut server, &[9; 32]);
    assert!(matches!(result, Err(ExtensionError::Attest(_))));
    assert!(matches!(server.state(), ServerState::Failed));
    assert!(matches!(client.outcome(), AttestationOutcome::Missing));
}
