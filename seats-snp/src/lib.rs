// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//!  Backends that connect the [seats](seats) attestation adapter to a real [SEV-SNP](https://www.amd.com/en/developer/sev.html) guest. [`SnpGuest`](snpguest::SnpGuest) drives the `snpguest` and `sev-snp-measure` tools; [`OpensslAuthority`](authority::OpensslAuthority) checks evidence in-process against the AMD certificate chain.
//!
//!  # Evidence Validation
//!
//!  The following code validates a captured attestation extension record against the AMD root of trust published on AMD's KDS, and an expected launch measurement.
//!
//!  #
//!  ```no_run
//!  use seats::payload::AttestationExtension;
//!  use seats::tool::EvidenceAuthority;
//!  use seats_snp::authority::{AuthorityConfig, OpensslAuthority, TrustedRoot};
//!  use std::error::Error;
//!
//!  fn main() -> Result<(), Box<dyn Error>> {
//!    let bytes = std::fs::read("evidence.bin")?;
//!    let evidence = AttestationExtension::decode(&bytes)?.payload;
//!
//!    let config = AuthorityConfig {
//!      measurement: [0; 48],
//!      root: TrustedRoot::Kds("Milan".to_string()),
//!    };
//!    let authority = OpensslAuthority::new(&config)?;
//!
//!    if !authority.validate_cert_chain(&evidence.cert_chain)? {
//!      return Err("invalid certificate chain".into());
//!    }
//!    if !authority.verify_signature(&evidence.report, &evidence.cert_chain)? {
//!      return Err("invalid report signature".into());
//!    }
//!    if evidence.report.measurement != authority.expected_measurement()? {
//!      return Err("measurement mismatch".into());
//!    }
//!
//!    Ok(())
//!  }
//!  ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP error")]
    Http(#[from] Box<ureq::Error>),
    #[error("failed to read HTTP response")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "verifier")]
pub mod amd_kds;
#[cfg(feature = "verifier")]
pub mod authority;
#[cfg(feature = "verifier")]
pub mod certs;
pub mod config;
#[cfg(feature = "verifier")]
pub mod report;
pub mod snpguest;
