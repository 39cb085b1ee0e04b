// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The boundary to platform attestation tooling.
//!
//! Report generation, certificate retrieval, certificate validation and
//! measurement recomputation happen outside this crate. Implementations may
//! run a process, call a library or reach a remote service; callers only see
//! blocking calls that succeed or fail. Because those calls carry no timeout
//! of their own, [`bounded`] is used to cap how long a handshake waits.

use crate::report::{AttestationReport, Measurement, ReportData};
use std::process::ExitStatus;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("`{command}` failed ({status})")]
    CommandFailed { command: String, status: ExitStatus },
    #[error("tool did not answer within {0:?}")]
    Timeout(Duration),
    #[error("tool call ended without a result")]
    Disconnected,
    #[error("tool output is malformed: {0}")]
    Malformed(String),
    #[error("tool error")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Attester side of the boundary.
pub trait ReportSource: Send + Sync {
    /// Request a fresh attestation report carrying `report_data`.
    fn generate_report(&self, report_data: &ReportData) -> Result<AttestationReport, ToolError>;

    /// Retrieve the certificate blob endorsing this platform's reports.
    fn certificate_chain(&self) -> Result<Vec<u8>, ToolError>;
}

/// Verifier side of the boundary.
pub trait EvidenceAuthority: Send + Sync {
    /// Whether `cert_chain` chains to a trusted hardware-vendor root.
    fn validate_cert_chain(&self, cert_chain: &[u8]) -> Result<bool, ToolError>;

    /// Whether the report signature verifies against the endorsement key in `cert_chain`.
    fn verify_signature(
        &self,
        report: &AttestationReport,
        cert_chain: &[u8],
    ) -> Result<bool, ToolError>;

    /// The measurement the expected guest image launches with.
    fn expected_measurement(&self) -> Result<Measurement, ToolError>;
}

/// Run `call` on a helper thread and give up after `timeout`.
///
/// A call that times out keeps running detached; its result is dropped.
/// Implementations that hold a process or a lock enforce their own deadline
/// as well.
pub fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("seats-tool".into())
        .spawn(move || {
            let _ = tx.send(call());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ToolError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ToolError::Disconnected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_returns_result() {
        let value = bounded(Duration::from_secs(5), || Ok(7)).unwrap();
        assert_eq!(value, 7);

        let error = bounded::<(), _>(Duration::from_secs(5), || {
            Err(ToolError::Malformed("bad".into()))
        })
        .unwrap_err();
        assert!(matches!(error, ToolError::Malformed(_)));
    }

    #[test]
    fn bounded_times_out() {
        let error = bounded(Duration::from_millis(20), || {
            thread::sleep(Duration::from_secs(2));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(error, ToolError::Timeout(_)));
    }

    #[test]
    fn bounded_reports_panicking_call() {
        let error = bounded::<(), _>(Duration::from_secs(5), || panic!("tool crashed")).unwrap_err();
        assert!(matches!(error, ToolError::Disconnected));
    }
}
