pub mod api;

use crate::relay::Relay;
use std::error::Error;
use std::net::SocketAddr;
use log::{ info, warn };

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert_path: String,
    pub key_path: String,
}

pub struct Server {
    addr: String,
    relay: Relay,
    tls: Option<TlsPaths>,
}

impl Server {
    pub fn new(addr: String, relay: Relay, tls: Option<TlsPaths>) -> Self {
        Self { addr, relay, tls }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()
            .map_err(|e| format!("Invalid server address '{}': {}", self.addr, e))?;
        let app = api::router(self.relay.clone());

        match &self.tls {
            Some(tls) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    tls.cert_path,
                    tls.key_path
                );
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    &tls.cert_path,
                    &tls.key_path
                ).await?;

                info!("HTTPS relay listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service())
                    .await?;
            }
            None => {
                warn!("TLS not enabled. Serving plain HTTP.");
                let listener = tokio::net::TcpListener::bind(addr).await
                    .map_err(|e| format!("Failed to bind relay to {}: {}. Try a different port.", addr, e))?;
                info!("HTTP relay listening on: http://{}", listener.local_addr()?);
                axum::serve(listener, app.into_make_service()).await?;
            }
        }

        Ok(())
    }
}
