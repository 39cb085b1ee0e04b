// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The SEV-SNP guest tools as a [`ReportSource`] and an [`EvidenceAuthority`].
//!
//! The certificate blob is the VCEK, ASK and ARK as one PEM document, the
//! same format [`OpensslAuthority`](crate::authority::OpensslAuthority)
//! reads. Artifacts pass through files in the configured work directory, so
//! calls on one [`SnpGuest`] are serialized. Every tool run is killed once it
//! outlives [`SnpGuestConfig::tool_timeout`].

#[cfg(feature = "verifier")]
use crate::certs::{AmdChain, EvidenceChain, X509};
use crate::config::SnpGuestConfig;
use log::{debug, warn};
#[cfg(feature = "attester")]
use log::info;
#[cfg(feature = "attester")]
use once_cell::sync::OnceCell;
use seats::report::AttestationReport;
#[cfg(feature = "attester")]
use seats::report::ReportData;
#[cfg(feature = "verifier")]
use seats::report::{Measurement, MEASUREMENT_SIZE};
#[cfg(feature = "verifier")]
use seats::tool::EvidenceAuthority;
#[cfg(feature = "attester")]
use seats::tool::ReportSource;
use seats::tool::ToolError;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Certificate file names in the certificate directory, in blob order.
const CERT_FILES: [&str; 3] = ["vcek.pem", "ask.pem", "ark.pem"];

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct SnpGuest {
    config: SnpGuestConfig,
    work_dir: Mutex<()>,
    /// Set once `snpguest certificates` has filled this guest's cert dir.
    #[cfg(feature = "attester")]
    certificates: OnceCell<()>,
    #[cfg(feature = "verifier")]
    trusted_ark: Option<X509>,
}

/// Run `program` with `args`, failing on a non-zero exit code. The child is
/// killed and reaped if it has not exited after `timeout`.
fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!("running {command:?}");

    let mut child = command.spawn()?;
    let deadline = Instant::now() + timeout;
    while child.try_wait()?.is_none() {
        if Instant::now() >= deadline {
            warn!("{program} did not exit within {timeout:?}, killing it");
            // the child may exit between try_wait and kill
            let _ = child.kill();
            child.wait()?;
            return Err(ToolError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        debug!(
            "{program} stderr: {}",
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
        return Err(ToolError::CommandFailed {
            command: format!("{command:?}"),
            status: output.status,
        });
    }
    Ok(output)
}

#[cfg(feature = "verifier")]
fn load_trusted_ark(path: &Path) -> Result<X509, ToolError> {
    let chain = AmdChain::from_pem(&fs::read(path)?).map_err(|e| ToolError::Other(Box::new(e)))?;
    chain.validate().map_err(|e| ToolError::Other(Box::new(e)))?;
    Ok(chain.ark)
}

impl SnpGuest {
    pub fn new(config: SnpGuestConfig) -> Result<Self, ToolError> {
        fs::create_dir_all(&config.work_dir)?;
        #[cfg(feature = "verifier")]
        let trusted_ark = match &config.trusted_root {
            Some(path) => Some(load_trusted_ark(path)?),
            None => None,
        };
        Ok(Self {
            config,
            work_dir: Mutex::new(()),
            #[cfg(feature = "attester")]
            certificates: OnceCell::new(),
            #[cfg(feature = "verifier")]
            trusted_ark,
        })
    }

    /// Pin peer certificate chains to `ark`, e.g. one fetched from AMD's KDS.
    #[cfg(feature = "verifier")]
    pub fn with_trusted_root(mut self, ark: X509) -> Self {
        self.trusted_ark = Some(ark);
        self
    }

    pub fn config(&self) -> &SnpGuestConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.work_dir.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<I, S>(&self, program: &str, args: I) -> Result<Output, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run(program, args, self.config.tool_timeout())
    }

    #[cfg(feature = "attester")]
    fn read_report(path: &Path) -> Result<AttestationReport, ToolError> {
        let bytes = fs::read(path)?;
        AttestationReport::read_from_prefix(&bytes).map_err(|e| ToolError::Malformed(e.to_string()))
    }

    /// `snpguest report` over the request file.
    #[cfg(feature = "attester")]
    fn request_report(&self, report_data: &ReportData) -> Result<AttestationReport, ToolError> {
        let report = self.config.report_path();
        let request = self.config.request_path();
        fs::write(&request, report_data)?;
        self.run(
            &self.config.snpguest,
            [OsStr::new("report"), report.as_os_str(), request.as_os_str()],
        )?;
        Self::read_report(&report)
    }

    #[cfg(feature = "attester")]
    fn fetch_certificates(&self, dir: &Path) -> Result<(), ToolError> {
        fs::create_dir_all(dir)?;
        self.run(
            &self.config.snpguest,
            [OsStr::new("certificates"), OsStr::new("pem"), dir.as_os_str()],
        )?;
        Ok(())
    }

    /// Write the VCEK and ASK from `chain` into the certificate directory.
    /// The ARK written is the trusted one when configured.
    #[cfg(feature = "verifier")]
    fn export_chain(&self, chain: &EvidenceChain) -> Result<(), ToolError> {
        let dir = self.config.cert_dir_path();
        fs::create_dir_all(&dir)?;
        let ark = self.trusted_ark.as_ref().unwrap_or(&chain.amd.ark);
        for (name, cert) in CERT_FILES.iter().zip([&chain.vcek, &chain.amd.ask, ark]) {
            let pem = cert
                .to_pem()
                .map_err(|e| ToolError::Other(Box::new(e)))?;
            fs::write(dir.join(name), pem)?;
        }
        Ok(())
    }

    #[cfg(feature = "verifier")]
    fn measure_args(&self) -> Vec<String> {
        let measure = &self.config.measure;
        let mut args = vec![
            "--mode".to_string(),
            "snp".to_string(),
            format!("--vcpus={}", measure.vcpus),
            format!("--vcpu-type={}", measure.vcpu_type),
            format!("--ovmf={}", measure.ovmf.display()),
        ];
        if let Some(kernel) = &measure.kernel {
            args.push(format!("--kernel={}", kernel.display()));
        }
        if let Some(initrd) = &measure.initrd {
            args.push(format!("--initrd={}", initrd.display()));
        }
        if let Some(append) = &measure.append {
            args.push(format!("--append={append}"));
        }
        args.push("--output-format=hex".to_string());
        args
    }
}

#[cfg(feature = "attester")]
fn certificates_present(dir: &Path) -> bool {
    CERT_FILES.iter().all(|name| dir.join(name).is_file())
}

#[cfg(feature = "attester")]
impl ReportSource for SnpGuest {
    fn generate_report(&self, report_data: &ReportData) -> Result<AttestationReport, ToolError> {
        let _guard = self.lock();
        let report = self.request_report(report_data)?;
        info!("snpguest: report generated, version {}", report.version);
        Ok(report)
    }

    fn certificate_chain(&self) -> Result<Vec<u8>, ToolError> {
        let _guard = self.lock();
        let dir = self.config.cert_dir_path();

        let mut fetched = false;
        self.certificates.get_or_try_init(|| {
            fetched = true;
            self.fetch_certificates(&dir)
        })?;
        if !fetched && !certificates_present(&dir) {
            info!("snpguest: {} lost its certificates, fetching again", dir.display());
            self.fetch_certificates(&dir)?;
        }

        let mut blob = Vec::new();
        for name in CERT_FILES {
            blob.extend(fs::read(dir.join(name))?);
        }
        Ok(blob)
    }
}

#[cfg(feature = "verifier")]
impl EvidenceAuthority for SnpGuest {
    fn validate_cert_chain(&self, cert_chain: &[u8]) -> Result<bool, ToolError> {
        let Some(trusted_ark) = &self.trusted_ark else {
            warn!("snpguest: no trusted root configured, rejecting certificate chain");
            return Ok(false);
        };
        let chain = match EvidenceChain::from_pem(cert_chain) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("snpguest: unreadable certificate blob: {e}");
                return Ok(false);
            }
        };
        if let Err(e) = chain.validate(trusted_ark) {
            warn!("snpguest: certificate chain rejected: {e}");
            return Ok(false);
        }

        let _guard = self.lock();
        self.export_chain(&chain)?;
        let dir = self.config.cert_dir_path();
        match self.run(
            &self.config.snpguest,
            [OsStr::new("verify"), OsStr::new("certs"), dir.as_os_str()],
        ) {
            Ok(_) => Ok(true),
            Err(ToolError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn verify_signature(
        &self,
        report: &AttestationReport,
        cert_chain: &[u8],
    ) -> Result<bool, ToolError> {
        let chain = match EvidenceChain::from_pem(cert_chain) {
            Ok(chain) => chain,
            Err(e) => {
                debug!("snpguest: unreadable certificate blob: {e}");
                return Ok(false);
            }
        };

        let _guard = self.lock();
        self.export_chain(&chain)?;
        let report_path = self.config.report_path();
        fs::write(&report_path, report.to_bytes())?;
        let dir = self.config.cert_dir_path();
        match self.run(
            &self.config.snpguest,
            [
                OsStr::new("verify"),
                OsStr::new("attestation"),
                dir.as_os_str(),
                report_path.as_os_str(),
            ],
        ) {
            Ok(_) => Ok(true),
            Err(ToolError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn expected_measurement(&self) -> Result<Measurement, ToolError> {
        let output = self.run(&self.config.measure_tool, self.measure_args())?;
        parse_measurement(&output.stdout)
    }
}

#[cfg(feature = "verifier")]
fn parse_measurement(stdout: &[u8]) -> Result<Measurement, ToolError> {
    let text = String::from_utf8_lossy(stdout);
    let bytes = hex::decode(text.trim()).map_err(|e| ToolError::Malformed(e.to_string()))?;
    let measurement: [u8; MEASUREMENT_SIZE] = bytes.try_into().map_err(|bytes: Vec<u8>| {
        ToolError::Malformed(format!("measurement of {} bytes", bytes.len()))
    })?;
    Ok(measurement)
}
