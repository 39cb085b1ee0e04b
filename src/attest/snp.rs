// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{AttestError, Attester};
use crate::payload::EvidencePayload;
use crate::report::ReportData;
use crate::tool::{self, ReportSource};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;

/// Produces genuine SEV-SNP evidence through a [`ReportSource`].
///
/// Failures are not retried: fresh evidence needs a new attempt tied to a
/// new nonce.
pub struct SnpAttester {
    source: Arc<dyn ReportSource>,
    timeout: Duration,
    payload: Option<EvidencePayload>,
}

impl SnpAttester {
    pub fn new(source: Arc<dyn ReportSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            payload: None,
        }
    }
}

impl Attester for SnpAttester {
    fn set_evidence_buffer(&mut self, payload: EvidencePayload) {
        self.payload = Some(payload);
    }

    fn attest(&mut self, report_data: &ReportData) -> Result<(), AttestError> {
        let Some(payload) = self.payload.as_mut() else {
            error!("snp attester: attest called before set_evidence_buffer");
            return Err(AttestError::NotConfigured);
        };

        let source = self.source.clone();
        let report_data = *report_data;
        debug!("snp attester: requesting report for {}", hex::encode(report_data));
        let (report, cert_chain) = tool::bounded(self.timeout, move || {
            let cert_chain = source.certificate_chain()?;
            let report = source.generate_report(&report_data)?;
            Ok((report, cert_chain))
        })?;

        payload.report = report;
        payload.cert_chain = cert_chain;
        info!(
            "snp attester: produced evidence with {} byte certificate blob",
            payload.cert_chain.len()
        );
        Ok(())
    }

    fn take_evidence(&mut self) -> Option<EvidencePayload> {
        self.payload.take()
    }
}
