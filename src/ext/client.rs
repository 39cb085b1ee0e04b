// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{AttestationOutcome, ExtensionBuffer, ExtensionError, FailurePolicy, Role};
use crate::evidence::{EvidenceRequestClient, EvidenceType};
use crate::nonce::{self, ClientRandom};
use crate::report::ReportData;
use crate::verify::Verifier;
use log::{debug, info, warn};

static NOT_ATTEMPTED: AttestationOutcome = AttestationOutcome::NotAttempted;
static MISSING: AttestationOutcome = AttestationOutcome::Missing;

#[derive(Debug)]
pub enum ClientState {
    Idle,
    /// The request went out bound to this report data.
    Sent { report_data: ReportData },
    Verified(AttestationOutcome),
}

/// Client half of the adapter. One per connection.
pub struct ClientExtension {
    request: EvidenceRequestClient,
    verifier: Box<dyn Verifier>,
    policy: FailurePolicy,
    state: ClientState,
}

impl ClientExtension {
    /// Build an adapter advertising SEV-SNP binary evidence.
    pub fn new(verifier: Box<dyn Verifier>, policy: FailurePolicy) -> Self {
        Self::with_evidence_types(verifier, policy, vec![EvidenceType::SEV_SNP_BINARY])
    }

    /// Build an adapter advertising `evidence_types`, most preferred first.
    pub fn with_evidence_types(
        verifier: Box<dyn Verifier>,
        policy: FailurePolicy,
        evidence_types: Vec<EvidenceType>,
    ) -> Self {
        Self {
            request: EvidenceRequestClient::new(evidence_types, nonce::request_nonce()),
            verifier,
            policy,
            state: ClientState::Idle,
        }
    }

    /// Start a new connection attempt: draw a fresh request nonce and forget
    /// any earlier outcome.
    pub fn prepare_connection(&mut self) {
        self.request.nonce = nonce::request_nonce();
        self.state = ClientState::Idle;
    }

    pub fn request(&self) -> &EvidenceRequestClient {
        &self.request
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Outbound hook for the ClientHello.
    ///
    /// A retried ClientHello re-sends the request under the new random.
    pub fn add(&mut self, client_random: &ClientRandom) -> Result<ExtensionBuffer, ExtensionError> {
        if let ClientState::Verified(_) = self.state {
            return Err(ExtensionError::UnexpectedMessage);
        }

        let report_data = nonce::report_data_from_client_random(client_random);
        let mut bytes = self.request.encode();
        bytes.extend_from_slice(client_random);

        self.verifier.set_request_context(self.request.clone());
        self.state = ClientState::Sent { report_data };
        debug!(
            "client: requesting attestation, nonce {} client random {}",
            self.request.nonce,
            hex::encode(client_random)
        );
        Ok(ExtensionBuffer::new(Role::Client, bytes))
    }

    /// Inbound hook for the server's evidence.
    ///
    /// With [`FailurePolicy::Abort`] a rejection fails the hook; with
    /// [`FailurePolicy::Flag`] it is only recorded.
    pub fn parse(&mut self, data: &[u8], peer_key: Option<&[u8]>) -> Result<(), ExtensionError> {
        let ClientState::Sent { report_data } = self.state else {
            return Err(ExtensionError::UnexpectedMessage);
        };

        let result = self
            .verifier
            .set_evidence(data.to_vec())
            .and_then(|()| self.verifier.verify(&report_data, peer_key));

        match result {
            Ok(()) => {
                info!("client: server attestation verified");
                self.state = ClientState::Verified(AttestationOutcome::Accepted);
                Ok(())
            }
            Err(e) => {
                warn!("client: server attestation rejected: {e}");
                self.state = ClientState::Verified(AttestationOutcome::Rejected(e));
                match self.policy {
                    FailurePolicy::Abort => Err(ExtensionError::AttestationRejected),
                    FailurePolicy::Flag => Ok(()),
                }
            }
        }
    }

    /// The attestation outcome so far. Consult it before trusting the peer.
    pub fn outcome(&self) -> &AttestationOutcome {
        match &self.state {
            ClientState::Idle => &NOT_ATTEMPTED,
            ClientState::Sent { .. } => &MISSING,
            ClientState::Verified(outcome) => outcome,
        }
    }
}
