// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//!  This library carries [AMD SEV-SNP](https://www.amd.com/en/developer/sev.html) attestation evidence inside a TLS 1.3 handshake, using a custom extension. A client advertises the evidence it accepts in its ClientHello; the server answers with a signed attestation report bound to the client's random, and the client verifies it before the handshake completes.
//!
//!  # Attested handshake
//!
//!  The following code registers the extension hooks on both sides of a connection, using the mock backends that need no SEV-SNP hardware. After the handshake the client inspects the [outcome](ext::AttestationOutcome) of the server's attestation.
//!
//!  #
//!  ```no_run
//!  use openssl::ssl::{SslAcceptor, SslConnector, SslMethod};
//!  use seats::ext::{AdapterConfig, AttesterBackend, ClientExtension, ServerExtension, VerifierBackend};
//!  use seats::tls::{ClientHooks, ServerHooks};
//!  use std::error::Error;
//!
//!  fn main() -> Result<(), Box<dyn Error>> {
//!    let config = AdapterConfig::default();
//!
//!    let mut acceptor = SslAcceptor::mozilla_modern_v5(SslMethod::tls())?;
//!    let server_hooks = ServerHooks::register(&mut acceptor)?;
//!    // ... configure the server certificate and key
//!
//!    let mut connector = SslConnector::builder(SslMethod::tls())?;
//!    let client_hooks = ClientHooks::register(&mut connector)?;
//!    let connector = connector.build();
//!
//!    let mut ssl = connector.configure()?.into_ssl("localhost")?;
//!    let verifier = config.verifier(VerifierBackend::Mock);
//!    client_hooks.attach(&mut ssl, ClientExtension::new(verifier, config.policy));
//!    // ... on the accepting side, per connection:
//!    // server_hooks.attach(&mut ssl, ServerExtension::new(config.attester(AttesterBackend::Mock)));
//!
//!    // ... run the handshake, then:
//!    if !client_hooks.outcome(&ssl).is_some_and(|o| o.is_accepted()) {
//!      return Err("server is not attested".into());
//!    }
//!
//!    Ok(())
//!  }
//!  ```

#[cfg(feature = "attester")]
pub mod attest;
pub mod evidence;
pub mod ext;
pub mod nonce;
pub mod payload;
pub mod report;
#[cfg(feature = "tls")]
pub mod tls;
pub mod tool;
#[cfg(feature = "verifier")]
pub mod verify;
