// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The AMD chain of trust: ARK (root) signs ASK, ASK signs the chip's VCEK,
//! and the VCEK signs attestation reports.

use openssl::error::ErrorStack;
pub use openssl::x509::X509;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("openssl error")]
    OpenSsl(#[from] ErrorStack),
    #[error("ARK is not self-signed")]
    ArkNotSelfSigned,
    #[error("ASK is not signed by ARK")]
    AskNotSignedByArk,
    #[error("VCEK is not signed by ASK")]
    VcekNotSignedByAsk,
    #[error("ARK is not the trusted root")]
    UntrustedArk,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("openssl error")]
    OpenSsl(#[from] ErrorStack),
    #[error("wrong amount of certificates (expected {0:?}, found {1:?})")]
    WrongAmount(usize, usize),
}

fn certs_from_pem(pem: &[u8], expected: usize) -> Result<Vec<X509>, ParseError> {
    let certs = X509::stack_from_pem(pem)?;
    if certs.len() != expected {
        return Err(ParseError::WrongAmount(expected, certs.len()));
    }
    Ok(certs)
}

/// ASK and ARK, as served by AMD's KDS.
pub struct AmdChain {
    pub ask: X509,
    pub ark: X509,
}

impl AmdChain {
    /// Parse an ASK + ARK multi-PEM document, in that order.
    pub fn from_pem(pem: &[u8]) -> Result<Self, ParseError> {
        let mut certs = certs_from_pem(pem, 2)?.into_iter();
        match (certs.next(), certs.next()) {
            (Some(ask), Some(ark)) => Ok(Self { ask, ark }),
            _ => Err(ParseError::WrongAmount(2, 0)),
        }
    }

    pub fn validate(&self) -> Result<(), ValidateError> {
        let ark_pubkey = self.ark.public_key()?;

        if !self.ark.verify(&ark_pubkey)? {
            return Err(ValidateError::ArkNotSelfSigned);
        }
        if !self.ask.verify(&ark_pubkey)? {
            return Err(ValidateError::AskNotSignedByArk);
        }
        Ok(())
    }
}

/// The certificate blob a server sends with its report: VCEK, ASK and ARK
/// as one multi-PEM document.
pub struct EvidenceChain {
    pub vcek: X509,
    pub amd: AmdChain,
}

impl EvidenceChain {
    pub fn from_pem(pem: &[u8]) -> Result<Self, ParseError> {
        let mut certs = certs_from_pem(pem, 3)?.into_iter();
        match (certs.next(), certs.next(), certs.next()) {
            (Some(vcek), Some(ask), Some(ark)) => Ok(Self {
                vcek,
                amd: AmdChain { ask, ark },
            }),
            _ => Err(ParseError::WrongAmount(3, 0)),
        }
    }

    /// Check every link, then that the chain ends in `trusted_ark`.
    pub fn validate(&self, trusted_ark: &X509) -> Result<(), ValidateError> {
        self.amd.validate()?;

        let ask_pubkey = self.amd.ask.public_key()?;
        if !self.vcek.verify(&ask_pubkey)? {
            return Err(ValidateError::VcekNotSignedByAsk);
        }

        let trusted_pubkey = trusted_ark.public_key()?;
        if !self.amd.ark.public_key()?.public_eq(&trusted_pubkey) {
            return Err(ValidateError::UntrustedArk);
        }
        Ok(())
    }
}
