// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Handshake extension adapter.
//!
//! Each side of a connection owns one adapter whose `add` and `parse`
//! methods are driven by the TLS stack's custom-extension hooks for
//! [`ATTESTATION_EXTENSION_TYPE`]:
//!
//! 1. client `add`: the request and the TLS client random go into the ClientHello;
//! 2. server `parse`: the request is negotiated and the report data derived;
//! 3. server `add`: the attester runs and the evidence goes into the Certificate message;
//! 4. client `parse`: the verifier runs and the outcome is recorded.
//!
//! Buffers returned by `add` are [`ExtensionBuffer`]s, released when the
//! stack drops them after sending, on every path.
//!
//! A peer that never answers leaves the client with
//! [`AttestationOutcome::Missing`]; whether that is acceptable is for the
//! application to decide.

#[cfg(feature = "attester")]
use crate::attest::{AttestError, Attester, MockAttester, SnpAttester};
use crate::evidence::WireError;
#[cfg(feature = "attester")]
use crate::tool::ReportSource;
#[cfg(feature = "verifier")]
use crate::tool::EvidenceAuthority;
#[cfg(feature = "verifier")]
use crate::verify::{MockVerifier, SnpVerifier, Verifier, VerifyError};
use log::debug;
#[cfg(any(feature = "attester", feature = "verifier"))]
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "verifier")]
mod client;
#[cfg(feature = "attester")]
mod server;

#[cfg(feature = "verifier")]
pub use client::{ClientExtension, ClientState};
#[cfg(feature = "attester")]
pub use server::{ServerExtension, ServerState};

/// Custom TLS extension type carrying attestation data.
pub const ATTESTATION_EXTENSION_TYPE: u16 = 0xFF00;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("extension hook called out of order")]
    UnexpectedMessage,
    #[error("malformed extension data")]
    Wire(#[from] WireError),
    #[cfg(feature = "attester")]
    #[error("attestation failed")]
    Attest(#[from] AttestError),
    #[error("peer attestation was rejected")]
    AttestationRejected,
}

/// What a client does when the server's evidence fails verification.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Fail the handshake.
    #[default]
    Abort,
    /// Complete the handshake and leave the rejection in the outcome.
    Flag,
}

#[cfg(feature = "attester")]
pub enum AttesterBackend {
    Mock,
    Snp(Arc<dyn ReportSource>),
}

#[cfg(feature = "verifier")]
pub enum VerifierBackend {
    Mock,
    Snp(Arc<dyn EvidenceAuthority>),
}

#[derive(Clone, Debug)]
pub struct AdapterConfig {
    /// Upper bound for every call across the tool boundary.
    pub tool_timeout: Duration,
    pub policy: FailurePolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            policy: FailurePolicy::default(),
        }
    }
}

impl AdapterConfig {
    #[cfg(feature = "attester")]
    pub fn attester(&self, backend: AttesterBackend) -> Box<dyn Attester> {
        match backend {
            AttesterBackend::Mock => Box::new(MockAttester::new()),
            AttesterBackend::Snp(source) => Box::new(SnpAttester::new(source, self.tool_timeout)),
        }
    }

    #[cfg(feature = "verifier")]
    pub fn verifier(&self, backend: VerifierBackend) -> Box<dyn Verifier> {
        match backend {
            VerifierBackend::Mock => Box::new(MockVerifier::new()),
            VerifierBackend::Snp(authority) => {
                Box::new(SnpVerifier::new(authority, self.tool_timeout))
            }
        }
    }
}

/// The client's view of the server's attestation after the handshake.
#[cfg(feature = "verifier")]
#[derive(Debug)]
pub enum AttestationOutcome {
    /// The request was never sent.
    NotAttempted,
    /// The request was sent but the server attached no evidence.
    Missing,
    Accepted,
    Rejected(VerifyError),
}

#[cfg(feature = "verifier")]
impl AttestationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttestationOutcome::Accepted)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Extension data handed to the TLS stack. Released when dropped.
#[derive(Debug)]
pub struct ExtensionBuffer {
    role: Role,
    bytes: Vec<u8>,
}

impl ExtensionBuffer {
    fn new(role: Role, bytes: Vec<u8>) -> Self {
        Self { role, bytes }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for ExtensionBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for ExtensionBuffer {
    fn drop(&mut self) {
        debug!(
            "{:?} attestation extension buffer released ({} bytes)",
            self.role,
            self.bytes.len()
        );
    }
}
