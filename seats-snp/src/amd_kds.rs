// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::certs::{AmdChain, ParseError};
use crate::HttpError;
use log::debug;
use std::io::Read;
use thiserror::Error;

const KDS_CERT_SITE: &str = "https://kdsintf.amd.com";
const KDS_VCEK: &str = "/vcek/v1";
const KDS_CERT_CHAIN: &str = "cert_chain";

/// Product names KDS serves chains for.
pub const PRODUCTS: &[&str] = &["Milan", "Genoa", "Bergamo", "Siena", "Turin"];

fn get(url: &str) -> Result<Vec<u8>, HttpError> {
    let mut body = ureq::get(url).call().map_err(Box::new)?.into_reader();
    let mut buffer = Vec::new();
    body.read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[derive(Error, Debug)]
pub enum AmdKdsError {
    #[error("unknown product {0:?}")]
    UnknownProduct(String),
    #[error("certificate chain error")]
    Parse(#[from] ParseError),
    #[error("Http error")]
    Http(#[from] HttpError),
}

pub fn cert_chain_url(product: &str) -> Result<String, AmdKdsError> {
    let Some(product) = PRODUCTS.iter().find(|p| p.eq_ignore_ascii_case(product)) else {
        return Err(AmdKdsError::UnknownProduct(product.to_string()));
    };
    Ok(format!("{KDS_CERT_SITE}{KDS_VCEK}/{product}/{KDS_CERT_CHAIN}"))
}

/// Retrieve the AMD chain of trust (ASK & ARK) for `product` from AMD's KDS
pub fn get_cert_chain(product: &str) -> Result<AmdChain, AmdKdsError> {
    let url = cert_chain_url(product)?;
    debug!("fetching AMD certificate chain from {url}");
    let bytes = get(&url)?;
    let chain = AmdChain::from_pem(&bytes)?;
    Ok(chain)
}
