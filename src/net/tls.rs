//! TLS configuration for upstream connections.

use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;

/// Connector used for every upstream request. Handles both `http` and `https`
/// URIs; which one is used is decided by the configured scheme.
pub type UpstreamConnector = HttpsConnector<HttpConnector>;

/// Build the upstream connector.
///
/// With `verify` off, neither the certificate chain nor the hostname is
/// checked. The upstream is reached through a private DNS name that rarely
/// matches a certificate subject, so this is the default, but it also means
/// the link is open to interception by anyone on the private network path.
pub fn upstream_connector(verify: bool) -> Result<UpstreamConnector, native_tls::Error> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);

    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify)
        .build()?;

    Ok(HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls))))
}
