// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Registration of the adapter with OpenSSL's custom extension hooks.
//!
//! The extension is offered in the ClientHello and answered in the first
//! entry of the server's TLS 1.3 Certificate message. Each connection gets
//! its own adapter through [`ClientHooks::attach`] / [`ServerHooks::attach`];
//! a connection without one takes no part in attestation. OpenSSL drops the
//! [`ExtensionBuffer`](crate::ext::ExtensionBuffer) returned by an add hook
//! once the message is written, which releases it.

#[cfg(feature = "verifier")]
use crate::ext::{AttestationOutcome, ClientExtension};
#[cfg(feature = "attester")]
use crate::ext::ServerExtension;
use crate::ext::{ExtensionError, ATTESTATION_EXTENSION_TYPE};
#[cfg(feature = "verifier")]
use crate::nonce::CLIENT_RANDOM_SIZE;
use log::error;
use openssl::error::ErrorStack;
use openssl::ex_data::Index;
use openssl::ssl::{ExtensionContext, Ssl, SslAlert, SslContextBuilder, SslRef};
#[cfg(feature = "verifier")]
use openssl::x509::X509Ref;

/// Messages that may carry the attestation extension.
pub fn extension_context() -> ExtensionContext {
    ExtensionContext::CLIENT_HELLO | ExtensionContext::TLS1_3_CERTIFICATE
}

fn alert_for(error: &ExtensionError) -> SslAlert {
    match error {
        ExtensionError::Wire(_) => SslAlert::DECODE_ERROR,
        _ => SslAlert::ILLEGAL_PARAMETER,
    }
}

#[cfg(feature = "verifier")]
fn peer_key_der(cert: Option<(usize, &X509Ref)>) -> Option<Vec<u8>> {
    let (_, cert) = cert?;
    cert.public_key().ok()?.public_key_to_der().ok()
}

/// Client-side registration.
#[cfg(feature = "verifier")]
#[derive(Copy, Clone)]
pub struct ClientHooks {
    index: Index<Ssl, ClientExtension>,
}

#[cfg(feature = "verifier")]
impl ClientHooks {
    pub fn register(builder: &mut SslContextBuilder) -> Result<Self, ErrorStack> {
        let index = Ssl::new_ex_index::<ClientExtension>()?;

        builder.add_custom_ext(
            ATTESTATION_EXTENSION_TYPE,
            extension_context(),
            move |ssl: &mut SslRef, context: ExtensionContext, _| {
                if !context.contains(ExtensionContext::CLIENT_HELLO) {
                    return Ok(None);
                }
                let mut client_random = [0u8; CLIENT_RANDOM_SIZE];
                ssl.client_random(&mut client_random);
                let Some(client) = ssl.ex_data_mut(index) else {
                    return Ok(None);
                };
                client.add(&client_random).map(Some).map_err(|e| {
                    error!("client: cannot add attestation extension: {e}");
                    alert_for(&e)
                })
            },
            move |ssl: &mut SslRef, context: ExtensionContext, data: &[u8], cert| {
                if !context.contains(ExtensionContext::TLS1_3_CERTIFICATE) {
                    return Ok(());
                }
                let peer_key = peer_key_der(cert);
                let Some(client) = ssl.ex_data_mut(index) else {
                    return Ok(());
                };
                client
                    .parse(data, peer_key.as_deref())
                    .map_err(|e| alert_for(&e))
            },
        )?;

        Ok(Self { index })
    }

    /// Give `ssl` its adapter. Call before the handshake starts.
    pub fn attach(&self, ssl: &mut SslRef, mut client: ClientExtension) {
        client.prepare_connection();
        ssl.set_ex_data(self.index, client);
    }

    pub fn extension<'a>(&self, ssl: &'a SslRef) -> Option<&'a ClientExtension> {
        ssl.ex_data(self.index)
    }

    /// The attestation outcome of `ssl`, if it has an adapter.
    pub fn outcome<'a>(&self, ssl: &'a SslRef) -> Option<&'a AttestationOutcome> {
        self.extension(ssl).map(ClientExtension::outcome)
    }
}

/// Server-side registration.
#[cfg(feature = "attester")]
#[derive(Copy, Clone)]
pub struct ServerHooks {
    index: Index<Ssl, ServerExtension>,
}

#[cfg(feature = "attester")]
impl ServerHooks {
    pub fn register(builder: &mut SslContextBuilder) -> Result<Self, ErrorStack> {
        let index = Ssl::new_ex_index::<ServerExtension>()?;

        builder.add_custom_ext(
            ATTESTATION_EXTENSION_TYPE,
            extension_context(),
            move |ssl: &mut SslRef, context: ExtensionContext, cert| {
                if !context.contains(ExtensionContext::TLS1_3_CERTIFICATE) {
                    return Ok(None);
                }
                // evidence rides on the leaf certificate only
                if matches!(cert, Some((chain_idx, _)) if chain_idx != 0) {
                    return Ok(None);
                }
                let Some(server) = ssl.ex_data_mut(index) else {
                    return Ok(None);
                };
                server.add().map_err(|e| {
                    error!("server: cannot attach evidence: {e}");
                    alert_for(&e)
                })
            },
            move |ssl: &mut SslRef, context: ExtensionContext, data: &[u8], _| {
                if !context.contains(ExtensionContext::CLIENT_HELLO) {
                    return Ok(());
                }
                let Some(server) = ssl.ex_data_mut(index) else {
                    return Ok(());
                };
                server.parse(data).map_err(|e| {
                    error!("server: bad attestation request: {e}");
                    alert_for(&e)
                })
            },
        )?;

        Ok(Self { index })
    }

    pub fn attach(&self, ssl: &mut SslRef, server: ServerExtension) {
        ssl.set_ex_data(self.index, server);
    }

    pub fn extension<'a>(&self, ssl: &'a SslRef) -> Option<&'a ServerExtension> {
        ssl.ex_data(self.index)
    }
}
