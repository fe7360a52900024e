//! Snapshot of the inbound upgrade request a session is built from.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, Uri};

/// Query parameter carrying the raw credential.
pub const TOKEN_PARAMETER: &str = "token";

/// Header consulted for the original client address behind a proxy.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Decoded query string: parameter name to every value it was given.
pub type Parameters = HashMap<String, Vec<String>>;

/// TLS metadata of the client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    /// Negotiated protocol version, e.g. `TLSv1.3`.
    pub protocol_version: String,
    /// Negotiated cipher suite name.
    pub cipher_suite: String,
    /// SNI server name requested by the client.
    pub server_name: Option<String>,
}

/// The parts of an HTTP upgrade request a session needs.
///
/// Headers are shared, not copied, with whoever else holds the request.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    headers: Arc<HeaderMap>,
    uri: Uri,
    remote_addr: String,
    tls: Option<Arc<TlsInfo>>,
    claims: Vec<String>,
}

impl UpgradeRequest {
    /// Creates a request snapshot without TLS state or claims.
    #[must_use]
    pub fn new(headers: Arc<HeaderMap>, uri: Uri, remote_addr: impl Into<String>) -> Self {
        Self {
            headers,
            uri,
            remote_addr: remote_addr.into(),
            tls: None,
            claims: Vec::new(),
        }
    }

    /// Attaches TLS metadata for connections terminated by this process.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(Arc::new(tls));
        self
    }

    /// Attaches the claim entries decoded from the request token.
    #[must_use]
    pub fn with_claims(mut self, claims: Vec<String>) -> Self {
        self.claims = claims;
        self
    }

    /// Returns the shared request headers.
    #[must_use]
    pub fn headers(&self) -> &Arc<HeaderMap> {
        &self.headers
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the peer address as seen by the listener.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Returns the TLS metadata, if any.
    #[must_use]
    pub fn tls(&self) -> Option<&Arc<TlsInfo>> {
        self.tls.as_ref()
    }

    /// Returns the claim entries attached to the request.
    #[must_use]
    pub fn claims(&self) -> &[String] {
        &self.claims
    }

    /// Decodes the query string into [`Parameters`].
    #[must_use]
    pub fn parameters(&self) -> Parameters {
        self.uri.query().map(parse_query).unwrap_or_default()
    }

    /// Returns the first value of the reserved token parameter.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.parameters()
            .remove(TOKEN_PARAMETER)
            .and_then(|values| values.into_iter().next())
    }

    /// Returns the first `X-Forwarded-For` address, if the header is set.
    #[must_use]
    pub fn forwarded_for(&self) -> Option<String> {
        self.headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Arc<HeaderMap>, Parameters, String, Option<Arc<TlsInfo>>, Vec<String>) {
        let parameters = self.parameters();
        (self.headers, parameters, self.remote_addr, self.tls, self.claims)
    }
}

/// Decodes an `application/x-www-form-urlencoded` query string.
///
/// Repeated names keep their values in order of appearance.
#[must_use]
pub fn parse_query(query: &str) -> Parameters {
    let mut parameters = Parameters::new();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        parameters
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    parameters
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request(uri: &'static str) -> UpgradeRequest {
        UpgradeRequest::new(
            Arc::new(HeaderMap::new()),
            Uri::from_static(uri),
            "1.2.3.4:5678",
        )
    }

    #[test]
    fn parameters_reflect_query() {
        let params = request("http://push.local/events?a=b").parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("a"), Some(&vec!["b".to_string()]));
    }

    #[test]
    fn repeated_parameters_keep_order() {
        let params = parse_query("x=1&y=2&x=3");
        assert_eq!(params.get("x"), Some(&vec!["1".to_string(), "3".to_string()]));
    }

    #[test]
    fn percent_encoding_is_decoded() {
        let params = parse_query("name=hello%20world&plus=a+b");
        assert_eq!(params.get("name"), Some(&vec!["hello world".to_string()]));
        assert_eq!(params.get("plus"), Some(&vec!["a b".to_string()]));
    }

    #[test]
    fn no_query_means_no_parameters() {
        assert!(request("http://push.local/events").parameters().is_empty());
    }

    #[test]
    fn token_is_read_from_reserved_parameter() {
        let req = request("http://push.local/events?a=b&token=tok123");
        assert_eq!(req.token().as_deref(), Some("tok123"));
        assert_eq!(request("http://push.local/events?a=b").token(), None);
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("10.0.0.1, 192.168.0.1"),
        );
        let req = UpgradeRequest::new(
            Arc::new(headers),
            Uri::from_static("/events"),
            "127.0.0.1:1",
        );
        assert_eq!(req.forwarded_for().as_deref(), Some("10.0.0.1"));
        assert_eq!(request("/events").forwarded_for(), None);
    }
}
