// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{AttestError, Attester};
use crate::payload::EvidencePayload;
use crate::report::{AttestationReport, Measurement, ReportData, MEASUREMENT_SIZE};
use log::{debug, error};

/// Filler for every mocked field. Recognizable, not meaningful.
pub const MOCK_PATTERN: &[u8] = b"SEATS-MOCK-EVIDENCE|";
pub const MOCK_CERT_CHAIN_LEN: usize = 64;

pub(crate) fn fill_mock(buf: &mut [u8]) {
    for (byte, pattern) in buf.iter_mut().zip(MOCK_PATTERN.iter().cycle()) {
        *byte = *pattern;
    }
}

/// The measurement every mocked report carries.
pub fn mock_measurement() -> Measurement {
    let mut measurement = [0u8; MEASUREMENT_SIZE];
    fill_mock(&mut measurement);
    measurement
}

/// Produces canned evidence without hardware. Only `report_data` is real.
#[derive(Default)]
pub struct MockAttester {
    payload: Option<EvidencePayload>,
}

impl MockAttester {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Attester for MockAttester {
    fn set_evidence_buffer(&mut self, payload: EvidencePayload) {
        self.payload = Some(payload);
    }

    fn attest(&mut self, report_data: &ReportData) -> Result<(), AttestError> {
        let Some(payload) = self.payload.as_mut() else {
            error!("mock attester: attest called before set_evidence_buffer");
            return Err(AttestError::NotConfigured);
        };

        let mut report = AttestationReport::zeroed();
        fill_mock(&mut report.signature);
        fill_mock(&mut report.measurement);
        report.report_data = *report_data;
        payload.report = report;

        payload.cert_chain.clear();
        payload.cert_chain.resize(MOCK_CERT_CHAIN_LEN, 0);
        fill_mock(&mut payload.cert_chain);

        debug!("mock attester: report data {}", hex::encode(report_data));
        Ok(())
    }

    fn take_evidence(&mut self) -> Option<EvidencePayload> {
        self.payload.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attest_without_buffer_is_not_configured() {
        let mut attester = MockAttester::new();
        let result = attester.attest(&[1; 64]);
        assert!(matches!(result, Err(AttestError::NotConfigured)));
    }

    #[test]
    fn report_data_is_copied_verbatim() {
        let report_data: ReportData = std::array::from_fn(|i| i as u8);
        let mut attester = MockAttester::new();
        attester.set_evidence_buffer(EvidencePayload::default());
        attester.attest(&report_data).unwrap();

        let payload = attester.take_evidence().unwrap();
        assert_eq!(payload.report.report_data, report_data);
        assert_eq!(payload.report.measurement, mock_measurement());
        assert_eq!(&payload.report.signature[..MOCK_PATTERN.len()], MOCK_PATTERN);
        assert_eq!(payload.cert_chain.len(), MOCK_CERT_CHAIN_LEN);
        assert!(attester.take_evidence().is_none());
    }

    #[test]
    fn mock_evidence_is_deterministic() {
        let mut attester = MockAttester::new();
        let mut run = || {
            attester.set_evidence_buffer(EvidencePayload::default());
            attester.attest(&[9; 64]).unwrap();
            attester.take_evidence().unwrap()
        };
        assert_eq!(run(), run());
    }
}
