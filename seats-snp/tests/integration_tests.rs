// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[cfg(feature = "integration_test")]
mod tests {
    use seats::report::AttestationReport;
    use seats::tool::{EvidenceAuthority, ReportSource};
    use seats_snp::config::SnpGuestConfig;
    use seats_snp::snpguest::SnpGuest;

    fn guest() -> SnpGuest {
        SnpGuest::new(SnpGuestConfig::default()).unwrap()
    }

    #[test]
    fn get_report_with_report_data() {
        let mut report_data = [0u8; 64];
        report_data[42] = 42;
        let report: AttestationReport = guest().generate_report(&report_data).unwrap();
        assert_eq!(report.report_data, report_data);
    }

    #[test]
    fn certificates_verify_on_the_guest() {
        let ark = seats_snp::amd_kds::get_cert_chain("Milan").unwrap().ark;
        let guest = guest().with_trusted_root(ark);
        let chain = guest.certificate_chain().unwrap();
        assert!(guest.validate_cert_chain(&chain).unwrap());

        let report = guest.generate_report(&[7; 64]).unwrap();
        assert!(guest.verify_signature(&report, &chain).unwrap());
    }
}
