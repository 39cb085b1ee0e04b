// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The two per-connection values a client sends.
//!
//! The request nonce matches a response to its request at the application
//! layer. The TLS client random is the freshness value bound into the
//! report's `report_data`, so captured evidence cannot be replayed on a later
//! connection.

use crate::report::{ReportData, REPORT_DATA_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, OnceLock, PoisonError};

pub const CLIENT_RANDOM_SIZE: usize = 32;

pub type ClientRandom = [u8; CLIENT_RANDOM_SIZE];

static NONCE_RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

/// Draw a fresh request nonce from the process-wide generator, seeding it from
/// OS entropy on first use.
pub fn request_nonce() -> i64 {
    let rng = NONCE_RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()));
    let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
    rng.gen()
}

/// Expand a client random into report data by writing it into both halves.
pub fn report_data_from_client_random(client_random: &ClientRandom) -> ReportData {
    let mut report_data = [0u8; REPORT_DATA_SIZE];
    let (head, tail) = report_data.split_at_mut(CLIENT_RANDOM_SIZE);
    head.copy_from_slice(client_random);
    tail.copy_from_slice(client_random);
    report_data
}
