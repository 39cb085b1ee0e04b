// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{ExtensionBuffer, ExtensionError, Role};
use crate::attest::{AttestError, Attester};
use crate::evidence::{
    ContentFormat, EvidenceRequestClient, SupportedContent, TypeEncoding, WireError,
};
use crate::nonce::{self, ClientRandom};
use crate::payload::{AttestationExtension, EvidencePayload};
use crate::report::ReportData;
use log::{debug, info, warn};

#[derive(Debug)]
pub enum ServerState {
    Idle,
    /// A request arrived and names evidence this server can produce.
    Requested {
        request: EvidenceRequestClient,
        report_data: ReportData,
    },
    /// A request arrived but names nothing this server can produce.
    Declined(WireError),
    Attested,
    Failed,
}

/// Server half of the adapter. One per connection.
pub struct ServerExtension {
    attester: Box<dyn Attester>,
    state: ServerState,
}

impl ServerExtension {
    pub fn new(attester: Box<dyn Attester>) -> Self {
        Self {
            attester,
            state: ServerState::Idle,
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Inbound hook for the ClientHello.
    ///
    /// Malformed data fails the hook. A request this server cannot satisfy is
    /// declined and the handshake carries on without evidence.
    pub fn parse(&mut self, data: &[u8]) -> Result<(), ExtensionError> {
        let (request, used) = EvidenceRequestClient::decode(data)?;
        let client_random: ClientRandom = data[used..]
            .try_into()
            .map_err(|_| WireError::MalformedEvidenceData)?;
        debug!(
            "server: attestation requested, nonce {} client random {}",
            request.nonce,
            hex::encode(client_random)
        );

        if let Err(e) = self.negotiate(&request) {
            warn!("server: declining attestation request: {e}");
            self.state = ServerState::Declined(e);
            return Ok(());
        }

        self.state = ServerState::Requested {
            request,
            report_data: nonce::report_data_from_client_random(&client_random),
        };
        Ok(())
    }

    /// Check the request names evidence this server produces.
    fn negotiate(&self, request: &EvidenceRequestClient) -> Result<(), WireError> {
        let kind = self.attester.credential_kind();
        let mut offered = request
            .evidence_types
            .iter()
            .filter(|evidence_type| evidence_type.credential_kind == kind)
            .peekable();
        if offered.peek().is_none() {
            return Err(WireError::UnsupportedCredentialKind(kind as u8));
        }
        let binary = SupportedContent::ContentFormat(ContentFormat::BinaryFormat);
        if !offered.any(|evidence_type| evidence_type.supported_content == binary) {
            return Err(WireError::UnsupportedEncoding(TypeEncoding::MediaType as u8));
        }
        Ok(())
    }

    /// Outbound hook for the server's Certificate message.
    ///
    /// Returns `None` when the client asked for nothing this server can
    /// provide, or when evidence was already sent.
    pub fn add(&mut self) -> Result<Option<ExtensionBuffer>, ExtensionError> {
        let ServerState::Requested { report_data, .. } = &self.state else {
            return Ok(None);
        };
        let report_data = *report_data;

        match self.produce(&report_data) {
            Ok(bytes) => {
                info!("server: attaching {} bytes of evidence", bytes.len());
                self.state = ServerState::Attested;
                Ok(Some(ExtensionBuffer::new(Role::Server, bytes)))
            }
            Err(e) => {
                self.state = ServerState::Failed;
                Err(e.into())
            }
        }
    }

    fn produce(&mut self, report_data: &ReportData) -> Result<Vec<u8>, AttestError> {
        self.attester.set_evidence_buffer(EvidencePayload::default());
        let attested = self.attester.attest(report_data);
        let payload = self.attester.take_evidence();
        attested?;
        let payload = payload.ok_or(AttestError::NotConfigured)?;
        let extension = AttestationExtension {
            credential_kind: self.attester.credential_kind(),
            payload,
        };
        Ok(extension.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attest::MockAttester;
    use crate::evidence::{CredentialKind, EvidenceType, MediaType};

    fn client_hello(evidence_types: Vec<EvidenceType>, random: ClientRandom) -> Vec<u8> {
        let mut bytes = EvidenceRequestClient::new(evidence_types, 5).encode();
        bytes.extend_from_slice(&random);
        bytes
    }

    #[test]
    fn attests_with_doubled_client_random() {
        let mut server = ServerExtension::new(Box::new(MockAttester::new()));
        let random = [0x5c; 32];
        server
            .parse(&client_hello(vec![EvidenceType::SEV_SNP_BINARY], random))
            .unwrap();

        let buffer = server.add().unwrap().unwrap();
        let extension = AttestationExtension::decode(buffer.as_ref()).unwrap();
        assert_eq!(extension.credential_kind, CredentialKind::AmdSevSnp);
        assert_eq!(extension.payload.report.report_data, [0x5c; 64]);
        assert!(matches!(server.state(), ServerState::Attested));
        assert!(server.add().unwrap().is_none());
    }

    #[test]
    fn add_without_request_sends_nothing() {
        let mut server = ServerExtension::new(Box::new(MockAttester::new()));
        assert!(server.add().unwrap().is_none());
    }

    #[test]
    fn missing_client_random_is_malformed() {
        let mut server = ServerExtension::new(Box::new(MockAttester::new()));
        let bytes = EvidenceRequestClient::new(vec![EvidenceType::SEV_SNP_BINARY], 5).encode();
        assert!(matches!(
            server.parse(&bytes),
            Err(ExtensionError::Wire(WireError::MalformedEvidenceData))
        ));
    }

    #[test]
    fn media_type_only_request_is_declined() {
        let mut server = ServerExtension::new(Box::new(MockAttester::new()));
        let media = EvidenceType {
            credential_kind: CredentialKind::AmdSevSnp,
            supported_content: SupportedContent::MediaType(MediaType::new("text/plain").unwrap()),
        };
        server.parse(&client_hello(vec![media], [1; 32])).unwrap();
        assert!(matches!(
            server.state(),
            ServerState::Declined(WireError::UnsupportedEncoding(_))
        ));
        assert!(server.add().unwrap().is_none());
    }

    #[test]
    fn empty_request_is_declined() {
        let mut server = ServerExtension::new(Box::new(MockAttester::new()));
        server.parse(&client_hello(vec![], [1; 32])).unwrap();
        assert!(matches!(
            server.state(),
            ServerState::Declined(WireError::UnsupportedCredentialKind(_))
        ));
    }

    #[test]
    fn unknown_credential_kind_fails_parse() {
        let mut server = ServerExtension::new(Box::new(MockAttester::new()));
        let mut bytes = client_hello(vec![EvidenceType::SEV_SNP_BINARY], [1; 32]);
        bytes[std::mem::size_of::<usize>() + 8] = 0x42;
        assert!(matches!(
            server.parse(&bytes),
            Err(ExtensionError::Wire(WireError::UnsupportedCredentialKind(0x42)))
        ));
    }
}
