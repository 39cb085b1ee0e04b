// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Settings for the SEV-SNP guest tools, loaded from JSON. Every field has a
//! default, so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config")]
    Io(#[from] std::io::Error),
    #[error("invalid config")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SnpGuestConfig {
    /// Holds every intermediate artifact. One attestation at a time.
    pub work_dir: PathBuf,
    pub report_file: String,
    pub request_file: String,
    pub cert_dir: String,
    pub snpguest: String,
    pub measure_tool: String,
    /// A tool still running after this long is killed.
    pub tool_timeout_ms: u64,
    /// ASK + ARK PEM file that peer certificate chains must end in.
    pub trusted_root: Option<PathBuf>,
    pub measure: MeasureConfig,
}

impl Default for SnpGuestConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/seats"),
            report_file: "report.bin".to_string(),
            request_file: "request-data.txt".to_string(),
            cert_dir: "certs".to_string(),
            snpguest: "snpguest".to_string(),
            measure_tool: "sev-snp-measure".to_string(),
            tool_timeout_ms: 5000,
            trusted_root: None,
            measure: MeasureConfig::default(),
        }
    }
}

/// Inputs of the launch measurement recomputation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct MeasureConfig {
    pub ovmf: PathBuf,
    pub kernel: Option<PathBuf>,
    pub initrd: Option<PathBuf>,
    pub append: Option<String>,
    pub vcpus: u32,
    pub vcpu_type: String,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            ovmf: PathBuf::from("/usr/share/ovmf/OVMF.amdsev.fd"),
            kernel: None,
            initrd: None,
            append: None,
            vcpus: 1,
            vcpu_type: "EPYC-v4".to_string(),
        }
    }
}

impl SnpGuestConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn report_path(&self) -> PathBuf {
        self.work_dir.join(&self.report_file)
    }

    pub fn request_path(&self) -> PathBuf {
        self.work_dir.join(&self.request_file)
    }

    pub fn cert_dir_path(&self) -> PathBuf {
        self.work_dir.join(&self.cert_dir)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(SnpGuestConfig::from_json("{}").unwrap(), SnpGuestConfig::default());
    }

    #[test]
    fn partial_json_overrides() {
        let config = SnpGuestConfig::from_json(
            r#"{ "work-dir": "/run/seats", "tool-timeout-ms": 250, "trusted-root": "/etc/seats/milan.pem", "measure": { "vcpus": 4, "kernel": "/boot/vmlinuz" } }"#,
        )
        .unwrap();
        assert_eq!(config.tool_timeout(), Duration::from_millis(250));
        assert_eq!(config.trusted_root, Some(PathBuf::from("/etc/seats/milan.pem")));
        assert_eq!(config.report_path(), PathBuf::from("/run/seats/report.bin"));
        assert_eq!(config.measure.vcpus, 4);
        assert_eq!(config.measure.kernel, Some(PathBuf::from("/boot/vmlinuz")));
        assert_eq!(config.measure.vcpu_type, "EPYC-v4");
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(matches!(
            SnpGuestConfig::from_json(r#"{ "measure": { "vcpus": "four" } }"#),
            Err(ConfigError::Json(_))
        ));
    }
}
