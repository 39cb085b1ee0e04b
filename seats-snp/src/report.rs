// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::sha::Sha384;
use openssl::x509::X509Ref;
use seats::report::AttestationReport;
use thiserror::Error;

/// Width of each little-endian ECDSA component in the report signature.
const COMPONENT_SIZE: usize = 72;

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("openssl error")]
    OpenSsl(#[from] ErrorStack),
    #[error("TCB data is not valid")]
    Tcb,
    #[error("Measurement signature is not valid")]
    MeasurementSignature,
}

fn component(bytes: &[u8]) -> Result<BigNum, ErrorStack> {
    let mut big_endian = bytes.to_vec();
    big_endian.reverse();
    BigNum::from_slice(&big_endian)
}

/// The report's ECDSA signature. `r` and `s` sit at the front of the
/// signature field, each little-endian and zero-padded.
pub fn signature(report: &AttestationReport) -> Result<EcdsaSig, ErrorStack> {
    let (r, rest) = report.signature.split_at(COMPONENT_SIZE);
    let r = component(r)?;
    let s = component(&rest[..COMPONENT_SIZE])?;
    EcdsaSig::from_private_components(r, s)
}

pub fn digest(report: &AttestationReport) -> [u8; 48] {
    let mut hasher = Sha384::new();
    hasher.update(report.signed_bytes());
    hasher.finish()
}

fn is_tcb_data_valid(report: &AttestationReport) -> bool {
    report.reported_tcb == report.committed_tcb
}

/// Check `report` was signed by the key in `vcek`.
pub fn validate(report: &AttestationReport, vcek: &X509Ref) -> Result<(), ValidateError> {
    if !is_tcb_data_valid(report) {
        return Err(ValidateError::Tcb);
    }

    let report_sig = signature(report)?;
    let vcek_pubkey = vcek.public_key()?.ec_key()?;

    if !report_sig.verify(&digest(report), &vcek_pubkey)? {
        return Err(ValidateError::MeasurementSignature);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_util::sign;
    use super::*;
    use crate::certs::test_util::Hierarchy;

    fn signed_report(hierarchy: &Hierarchy) -> AttestationReport {
        let mut report = AttestationReport::zeroed();
        report.version = 2;
        report.report_data = [0x61; 64];
        report.measurement = [0x4d; 48];
        sign(&mut report, &hierarchy.vcek_key);
        report
    }

    #[test]
    fn signed_report_validates() {
        let hierarchy = Hierarchy::new();
        let report = signed_report(&hierarchy);
        validate(&report, &hierarchy.vcek).unwrap();
    }

    #[test]
    fn tampered_report_fails() {
        let hierarchy = Hierarchy::new();
        let mut report = signed_report(&hierarchy);
        report.measurement[0] ^= 1;
        assert!(matches!(
            validate(&report, &hierarchy.vcek),
            Err(ValidateError::MeasurementSignature)
        ));
    }

    #[test]
    fn tcb_mismatch_fails() {
        let hierarchy = Hierarchy::new();
        let mut report = signed_report(&hierarchy);
        report.reported_tcb = 3;
        sign(&mut report, &hierarchy.vcek_key);
        assert!(matches!(
            validate(&report, &hierarchy.vcek),
            Err(ValidateError::Tcb)
        ));
    }

    #[test]
    fn other_key_fails() {
        let hierarchy = Hierarchy::new();
        let other = Hierarchy::new();
        let report = signed_report(&hierarchy);
        assert!(matches!(
            validate(&report, &other.vcek),
            Err(ValidateError::MeasurementSignature)
        ));
    }
}
