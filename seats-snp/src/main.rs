// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use clap::Parser;
use seats::attest::{Attester, SnpAttester};
use seats::evidence::{EvidenceRequestClient, EvidenceType};
use seats::payload::{AttestationExtension, EvidencePayload};
use seats::report::{AttestationReport, Measurement, ReportData};
use seats::tool::EvidenceAuthority;
use seats::verify::{SnpVerifier, Verifier};
use seats_snp::authority::{AuthorityConfig, OpensslAuthority, TrustedRoot};
use seats_snp::config::SnpGuestConfig;
use seats_snp::snpguest::SnpGuest;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(clap::Subcommand)]
enum Action {
    /// Print an attestation report
    Report {
        /// Raw report bytes
        #[arg(short, long)]
        file: PathBuf,

        /// Print as JSON instead of one field per line
        #[arg(short, long)]
        json: bool,
    },
    /// Produce an attestation extension record on this guest
    Attest {
        /// Report data to bind, hex
        #[arg(short, long)]
        report_data: String,

        /// Guest tool settings, JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the record
        #[arg(short, long)]
        out: PathBuf,

        /// Upper bound for the tool calls, in seconds
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,
    },
    /// Verify a captured attestation extension record
    Verify {
        /// Extension record: credential kind, report, certificate blob
        #[arg(short, long)]
        evidence: PathBuf,

        /// Expected report data, hex
        #[arg(short, long)]
        report_data: String,

        /// Expected launch measurement, hex
        #[arg(short, long, required_unless_present = "config")]
        measurement: Option<String>,

        /// Guest tool settings, JSON. The expected measurement is recomputed
        /// from its `measure` section.
        #[arg(long, conflicts_with = "measurement")]
        config: Option<PathBuf>,

        /// Trusted ASK + ARK PEM file
        #[arg(short, long, conflicts_with = "product")]
        chain: Option<PathBuf>,

        /// Fetch the trusted chain from AMD's KDS for this product
        #[arg(short, long, default_value = "Milan")]
        product: String,

        /// Upper bound for the verification, in seconds
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,
    },
}

fn from_hex<const N: usize>(name: &str, value: &str) -> Result<[u8; N], Box<dyn Error>> {
    let bytes = hex::decode(value)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| format!("{name} must be {N} bytes, got {len}").into())
}

fn load_config(path: Option<PathBuf>, timeout: u64) -> Result<SnpGuestConfig, Box<dyn Error>> {
    let mut config = match path {
        Some(path) => SnpGuestConfig::from_file(&path)?,
        None => SnpGuestConfig::default(),
    };
    config.tool_timeout_ms = timeout.saturating_mul(1000);
    Ok(config)
}

/// The measurement evidence must match, never taken from the evidence itself.
fn expected_measurement(
    measurement: Option<String>,
    config: Option<PathBuf>,
    timeout: u64,
) -> Result<Measurement, Box<dyn Error>> {
    match (measurement, config) {
        (Some(hex), _) => from_hex("measurement", &hex),
        (None, Some(path)) => {
            let guest = SnpGuest::new(load_config(Some(path), timeout)?)?;
            Ok(guest.expected_measurement()?)
        }
        (None, None) => Err("an expected measurement or a measure config is required".into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    match args.action {
        Action::Report { file, json } => {
            let bytes = std::fs::read(file)?;
            let report = AttestationReport::read_from_prefix(&bytes)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Action::Attest {
            report_data,
            config,
            out,
            timeout,
        } => {
            let report_data: ReportData = from_hex("report data", &report_data)?;
            let guest = SnpGuest::new(load_config(config, timeout)?)?;
            let mut attester = SnpAttester::new(Arc::new(guest), Duration::from_secs(timeout));
            attester.set_evidence_buffer(EvidencePayload::default());
            attester.attest(&report_data)?;
            let payload = attester
                .take_evidence()
                .ok_or("attester produced no evidence")?;
            let record = AttestationExtension {
                credential_kind: attester.credential_kind(),
                payload,
            };
            std::fs::write(out, record.encode())?;
        }
        Action::Verify {
            evidence,
            report_data,
            measurement,
            config,
            chain,
            product,
            timeout,
        } => {
            let evidence = std::fs::read(evidence)?;
            let report_data: ReportData = from_hex("report data", &report_data)?;
            let measurement = expected_measurement(measurement, config, timeout)?;
            let root = match chain {
                Some(path) => TrustedRoot::Pem(path),
                None => TrustedRoot::Kds(product),
            };

            let authority = OpensslAuthority::new(&AuthorityConfig { measurement, root })?;
            let mut verifier =
                SnpVerifier::new(Arc::new(authority), Duration::from_secs(timeout));
            verifier.set_request_context(EvidenceRequestClient::new(
                vec![EvidenceType::SEV_SNP_BINARY],
                0,
            ));
            verifier.set_evidence(evidence)?;
            verifier.verify(&report_data, None)?;
            println!("evidence verified");
        }
    }

    Ok(())
}
