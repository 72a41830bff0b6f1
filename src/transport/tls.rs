use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::{rustls, TlsConnector};

use crate::connect_options::BrokerUrl;
use crate::error::{ClientError, Result};

fn root_store() -> rustls::RootCertStore {
    let mut store = rustls::RootCertStore::empty();
    store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    store
}

pub async fn connect(
    url: &BrokerUrl,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store())
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let tcp = super::tcp::connect(url).await?;
    let domain = rustls::ServerName::try_from(url.host.as_str())
        .map_err(|_| ClientError::InvalidArgument(format!("invalid TLS server name {:?}", url.host)))?;
    let stream = connector
        .connect(domain, tcp)
        .await
        .map_err(ClientError::Transport)?;
    Ok(stream)
}
