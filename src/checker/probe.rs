//! HTTP link probe

use crate::checker::{LinkProbe, NetworkErrorKind, RawOutcome};
use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as _;

/// Probes links with GET requests through a shared client
///
/// Redirects are followed by the client, so the recorded status is the one
/// of the final response. The body is never read.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkProbe for HttpProbe {
    async fn probe(&self, url: &str) -> RawOutcome {
        match self.client.get(url).send().await {
            Ok(response) => RawOutcome::Status(response.status().as_u16()),
            Err(e) => {
                let kind = network_error_kind(&e);
                tracing::debug!(url, error = %e, kind = kind.to_db_string(), "link request failed");
                RawOutcome::Network(kind)
            }
        }
    }
}

/// Maps a reqwest error to the kind of network failure
pub(crate) fn network_error_kind(error: &reqwest::Error) -> NetworkErrorKind {
    if error.is_timeout() {
        return NetworkErrorKind::Timeout;
    }
    if error.is_redirect() {
        return NetworkErrorKind::Redirect;
    }

    let chain = error_chain_text(error);
    if chain.contains("dns") || chain.contains("lookup") || chain.contains("resolve") {
        NetworkErrorKind::Dns
    } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake") {
        NetworkErrorKind::Tls
    } else if error.is_connect() {
        NetworkErrorKind::Connect
    } else {
        NetworkErrorKind::Other
    }
}

/// Lowercased text of an error and all of its sources
fn error_chain_text(error: &reqwest::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.to_lowercase()
}
