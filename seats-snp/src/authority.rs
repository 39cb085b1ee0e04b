// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::amd_kds::{self, AmdKdsError};
use crate::certs::{AmdChain, EvidenceChain, ParseError, X509};
use crate::report;
use log::{debug, warn};
use seats::report::{AttestationReport, Measurement};
use seats::tool::{EvidenceAuthority, ToolError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("failed to read trusted root")]
    Io(#[from] std::io::Error),
    #[error("invalid trusted root")]
    Parse(#[from] ParseError),
    #[error("trusted root is not self-consistent")]
    Validate(#[from] crate::certs::ValidateError),
    #[error("failed to fetch trusted root")]
    Kds(#[from] AmdKdsError),
}

/// Where the trusted ARK comes from.
#[derive(Clone, Debug)]
pub enum TrustedRoot {
    /// An ASK + ARK PEM file.
    Pem(PathBuf),
    /// AMD's KDS, for the named product.
    Kds(String),
}

#[derive(Clone, Debug)]
pub struct AuthorityConfig {
    pub measurement: Measurement,
    pub root: TrustedRoot,
}

/// Checks SEV-SNP evidence in-process with openssl.
///
/// The certificate blob must hold the VCEK, ASK and ARK PEM certificates in
/// that order, with the ARK matching the trusted root.
pub struct OpensslAuthority {
    ark: X509,
    measurement: Measurement,
}

impl OpensslAuthority {
    pub fn new(config: &AuthorityConfig) -> Result<Self, AuthorityError> {
        let chain = match &config.root {
            TrustedRoot::Pem(path) => AmdChain::from_pem(&std::fs::read(path)?)?,
            TrustedRoot::Kds(product) => amd_kds::get_cert_chain(product)?,
        };
        chain.validate()?;
        Ok(Self::with_root(chain.ark, config.measurement))
    }

    pub fn with_root(ark: X509, measurement: Measurement) -> Self {
        Self { ark, measurement }
    }
}

impl EvidenceAuthority for OpensslAuthority {
    fn validate_cert_chain(&self, cert_chain: &[u8]) -> Result<bool, ToolError> {
        let chain = match EvidenceChain::from_pem(cert_chain) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("authority: unreadable certificate blob: {e}");
                return Ok(false);
            }
        };
        match chain.validate(&self.ark) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("authority: certificate chain rejected: {e}");
                Ok(false)
            }
        }
    }

    fn verify_signature(
        &self,
        report: &AttestationReport,
        cert_chain: &[u8],
    ) -> Result<bool, ToolError> {
        let Ok(chain) = EvidenceChain::from_pem(cert_chain) else {
            return Ok(false);
        };
        debug!(
            "authority: report digest {}",
            hex::encode(report::digest(report))
        );
        match report::validate(report, &chain.vcek) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("authority: report signature rejected: {e}");
                Ok(false)
            }
        }
    }

    fn expected_measurement(&self) -> Result<Measurement, ToolError> {
        Ok(self.measurement)
    }
}
