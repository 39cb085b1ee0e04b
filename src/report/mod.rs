// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Layout follows the SEV-SNP ABI specification, "Table 21. ATTESTATION_REPORT Structure".
// Integers are stored in native byte order.

use memoffset::offset_of;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::fmt;
use std::mem::size_of;
use thiserror::Error;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

pub const REPORT_DATA_SIZE: usize = 64;
pub const MEASUREMENT_SIZE: usize = 48;
pub const SIGNATURE_SIZE: usize = 512;
pub const REPORT_SIZE: usize = size_of::<AttestationReport>();
/// Length of the report prefix covered by the signature.
pub const SIGNED_LEN: usize = offset_of!(AttestationReport, signature);

pub type ReportData = [u8; REPORT_DATA_SIZE];
pub type Measurement = [u8; MEASUREMENT_SIZE];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("report truncated (expected {expected} bytes, found {found})")]
    Truncated { expected: usize, found: usize },
}

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Copy, Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AttestationReport {
    pub version: u32,
    pub guest_svn: u32,
    pub policy: u64,
    pub family_id: [u8; 16],
    pub image_id: [u8; 16],
    pub vmpl: u32,
    pub signature_algo: u32,
    pub current_tcb: u64,
    pub platform_info: u64,
    pub signing_flags: u32,
    pub _reserved_1: u32,
    #[serde(with = "BigArray")]
    pub report_data: ReportData,
    #[serde(with = "BigArray")]
    pub measurement: Measurement,
    pub host_provided_data: [u8; 32],
    #[serde(with = "BigArray")]
    pub id_key_digest: [u8; 48],
    #[serde(with = "BigArray")]
    pub author_key_digest: [u8; 48],
    pub report_id: [u8; 32],
    pub report_id_ma: [u8; 32],
    pub reported_tcb: u64,
    pub _reserved_2: [u8; 24],
    #[serde(with = "BigArray")]
    pub chip_id: [u8; 64],
    pub committed_tcb: u64,
    pub current_build: u8,
    pub current_minor: u8,
    pub current_major: u8,
    pub _reserved_3: u8,
    pub committed_build: u8,
    pub committed_minor: u8,
    pub committed_major: u8,
    pub _reserved_4: u8,
    pub launch_tcb: u64,
    #[serde(with = "BigArray")]
    pub _reserved_5: [u8; 168],
    #[serde(with = "BigArray")]
    pub signature: [u8; SIGNATURE_SIZE],
}

static_assertions::assert_eq_size!(AttestationReport, [u8; 0x4A0]);

impl AttestationReport {
    /// An all-zero report.
    pub fn zeroed() -> Self {
        Self::new_zeroed()
    }

    /// Read a whole report from the front of `bytes`.
    pub fn read_from_prefix(bytes: &[u8]) -> Result<Self, ReportError> {
        <Self as FromBytes>::read_from_prefix(bytes).ok_or(ReportError::Truncated {
            expected: REPORT_SIZE,
            found: bytes.len(),
        })
    }

    /// The raw report bytes at the fixed layout.
    pub fn to_bytes(&self) -> &[u8] {
        self.as_bytes()
    }

    /// The bytes the signature is computed over.
    pub fn signed_bytes(&self) -> &[u8] {
        &self.as_bytes()[..SIGNED_LEN]
    }
}

/// Byte offset of every field, in layout order.
pub fn field_offsets() -> Vec<(&'static str, usize)> {
    macro_rules! offsets {
        ($($field:ident),* $(,)?) => {
            vec![$((stringify!($field), offset_of!(AttestationReport, $field))),*]
        };
    }
    offsets!(
        version,
        guest_svn,
        policy,
        family_id,
        image_id,
        vmpl,
        signature_algo,
        current_tcb,
        platform_info,
        signing_flags,
        _reserved_1,
        report_data,
        measurement,
        host_provided_data,
        id_key_digest,
        author_key_digest,
        report_id,
        report_id_ma,
        reported_tcb,
        _reserved_2,
        chip_id,
        committed_tcb,
        current_build,
        current_minor,
        current_major,
        _reserved_3,
        committed_build,
        committed_minor,
        committed_major,
        _reserved_4,
        launch_tcb,
        _reserved_5,
        signature,
    )
}

impl fmt::Display for AttestationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        macro_rules! field {
            (u8 $field:ident) => {
                writeln!(f, "{:<20}: {:02x}", stringify!($field), self.$field)?
            };
            (u32 $field:ident) => {
                writeln!(f, "{:<20}: {:08x}", stringify!($field), self.$field)?
            };
            (u64 $field:ident) => {
                writeln!(f, "{:<20}: {:016x}", stringify!($field), self.$field)?
            };
            (bytes $field:ident) => {
                writeln!(f, "{:<20}: {}", stringify!($field), hex::encode(self.$field))?
            };
        }

        field!(u32 version);
        field!(u32 guest_svn);
        field!(u64 policy);
        field!(bytes family_id);
        field!(bytes image_id);
        field!(u32 vmpl);
        field!(u32 signature_algo);
        field!(u64 current_tcb);
        field!(u64 platform_info);
        field!(u32 signing_flags);
        field!(u32 _reserved_1);
        field!(bytes report_data);
        field!(bytes measurement);
        field!(bytes host_provided_data);
        field!(bytes id_key_digest);
        field!(bytes author_key_digest);
        field!(bytes report_id);
        field!(bytes report_id_ma);
        field!(u64 reported_tcb);
        field!(bytes _reserved_2);
        field!(bytes chip_id);
        field!(u64 committed_tcb);
        field!(u8 current_build);
        field!(u8 current_minor);
        field!(u8 current_major);
        field!(u8 _reserved_3);
        field!(u8 committed_build);
        field!(u8 committed_minor);
        field!(u8 committed_major);
        field!(u8 _reserved_4);
        field!(u64 launch_tcb);
        field!(bytes _reserved_5);
        write!(f, "{:<20}: {}", "signature", hex::encode(self.signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned_report() -> AttestationReport {
        let bytes: Vec<u8> = (0..REPORT_SIZE).map(|i| (i % 251) as u8).collect();
        AttestationReport::read_from_prefix(&bytes).unwrap()
    }

    #[test]
    fn layout_offsets() {
        let expected = [
            ("version", 0x00),
            ("guest_svn", 0x04),
            ("policy", 0x08),
            ("family_id", 0x10),
            ("image_id", 0x20),
            ("vmpl", 0x30),
            ("signature_algo", 0x34),
            ("current_tcb", 0x38),
            ("platform_info", 0x40),
            ("signing_flags", 0x48),
            ("_reserved_1", 0x4C),
            ("report_data", 0x50),
            ("measurement", 0x90),
            ("host_provided_data", 0xC0),
            ("id_key_digest", 0xE0),
            ("author_key_digest", 0x110),
            ("report_id", 0x140),
            ("report_id_ma", 0x160),
            ("reported_tcb", 0x180),
            ("_reserved_2", 0x188),
            ("chip_id", 0x1A0),
            ("committed_tcb", 0x1E0),
            ("current_build", 0x1E8),
            ("current_minor", 0x1E9),
            ("current_major", 0x1EA),
            ("_reserved_3", 0x1EB),
            ("committed_build", 0x1EC),
            ("committed_minor", 0x1ED),
            ("committed_major", 0x1EE),
            ("_reserved_4", 0x1EF),
            ("launch_tcb", 0x1F0),
            ("_reserved_5", 0x1F8),
            ("signature", 0x2A0),
        ];
        assert_eq!(field_offsets(), expected.to_vec());
        assert_eq!(REPORT_SIZE, 1184);
        assert_eq!(SIGNED_LEN, 0x2A0);
    }

    #[test]
    fn bytes_round_trip_keeps_reserved_fields() {
        let bytes: Vec<u8> = (0..REPORT_SIZE).map(|i| (i % 251) as u8).collect();
        let report = AttestationReport::read_from_prefix(&bytes).unwrap();
        assert_eq!(report.to_bytes(), &bytes[..]);
        assert_eq!(report._reserved_3, bytes[0x1EB]);
        assert_eq!(&report._reserved_5[..], &bytes[0x1F8..0x2A0]);
    }

    #[test]
    fn fields_read_at_documented_offsets() {
        let mut bytes = vec![0u8; REPORT_SIZE];
        bytes[0x00..0x04].copy_from_slice(&2u32.to_ne_bytes());
        bytes[0x50] = 0xAB;
        bytes[0x90] = 0xCD;
        bytes[0x2A0] = 0xEF;
        let report = AttestationReport::read_from_prefix(&bytes).unwrap();
        assert_eq!(report.version, 2);
        assert_eq!(report.report_data[0], 0xAB);
        assert_eq!(report.measurement[0], 0xCD);
        assert_eq!(report.signature[0], 0xEF);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let bytes = vec![0u8; REPORT_SIZE - 1];
        assert_eq!(
            AttestationReport::read_from_prefix(&bytes).unwrap_err(),
            ReportError::Truncated {
                expected: REPORT_SIZE,
                found: REPORT_SIZE - 1
            }
        );
    }

    #[test]
    fn dump_lists_every_field_without_mutating() {
        let report = patterned_report();
        let before = report;
        let dump = report.to_string();
        assert_eq!(dump.lines().count(), field_offsets().len());
        assert!(dump.contains(&format!("measurement         : {}", hex::encode(report.measurement))));
        assert_eq!(report, before);
    }

    #[test]
    fn serializes_to_json() {
        let report = patterned_report();
        let json = serde_json::to_string(&report).unwrap();
        let back: AttestationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
