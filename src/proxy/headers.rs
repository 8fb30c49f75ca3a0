//! Forwarded-header construction and hop-by-hop stripping.
//!
//! [`build_forwarded_headers`] clones the client's headers, strips
//! hop-by-hop headers (the fixed set and any named in `Connection`), rewrites `Host` to the upstream authority, and
//! overwrites the `X-Forwarded-*` family with values derived from the
//! inbound request. Client-supplied `X-Forwarded-*` values are replaced,
//! never merged.

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::model::Protocol;

pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_METHOD: HeaderName = HeaderName::from_static("x-forwarded-method");
pub const X_FORWARDED_PATH: HeaderName = HeaderName::from_static("x-forwarded-path");
pub const X_FORWARDED_QUERY: HeaderName = HeaderName::from_static("x-forwarded-query");
pub const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// What the proxy knows about the inbound request.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    /// The route's own protocol, not the target's.
    pub proto: Protocol,
    pub client_ip: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub listen_port: u16,
}

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been fully collected by the dispatch engine, so
/// `transfer-encoding` and `content-length` from the origin are no longer
/// accurate. Axum will set the correct `content-length` based on the actual
/// body bytes.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    headers.remove(hyper::header::CONTENT_LENGTH);
}

/// Remove the fixed hop-by-hop set plus every header the message's own
/// `Connection` value names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in connection_listed(headers) {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

pub fn build_forwarded_headers(
    original: &HeaderMap,
    inbound: &InboundRequest<'_>,
    upstream_authority: &str,
) -> HeaderMap {
    let mut headers = original.clone();

    strip_hop_by_hop(&mut headers);
    // The body is re-sent as a complete buffer.
    headers.remove(hyper::header::CONTENT_LENGTH);

    if let Ok(val) = HeaderValue::from_str(upstream_authority) {
        headers.insert(hyper::header::HOST, val);
    }

    headers.insert(
        X_FORWARDED_PROTO,
        HeaderValue::from_static(inbound.proto.as_str()),
    );

    match original.get(hyper::header::HOST) {
        Some(original_host) => {
            headers.insert(X_FORWARDED_HOST, original_host.clone());
        }
        None => {
            headers.remove(X_FORWARDED_HOST);
        }
    }

    overwrite(&mut headers, X_FORWARDED_FOR, inbound.client_ip);
    overwrite(&mut headers, X_FORWARDED_METHOD, inbound.method);
    overwrite(&mut headers, X_FORWARDED_PATH, inbound.path);
    overwrite(&mut headers, X_FORWARDED_QUERY, inbound.query);
    headers.insert(X_FORWARDED_PORT, HeaderValue::from(inbound.listen_port));

    headers
}

fn overwrite(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(val) => {
            headers.insert(name, val);
        }
        Err(_) => {
            tracing::warn!(header = %name, "value not representable as a header, dropping");
            headers.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> InboundRequest<'static> {
        InboundRequest {
            proto: Protocol::Http,
            client_ip: "10.0.0.1",
            method: "GET",
            path: "/svc1/items",
            query: "page=2",
            listen_port: 8081,
        }
    }

    #[test]
    fn strips_hop_by_hop() {
        let mut original = HeaderMap::new();
        original.insert("connection", "keep-alive".parse().unwrap());
        original.insert("content-type", "application/json".parse().unwrap());

        let result = build_forwarded_headers(&original, &inbound(), "127.0.0.1:9001");

        assert!(result.get("connection").is_none());
        assert!(result.get("content-type").is_some());
    }

    #[test]
    fn strips_headers_named_by_connection() {
        let mut original = HeaderMap::new();
        original.insert("connection", "keep-alive, X-Internal-Token".parse().unwrap());
        original.append("connection", "x-trace-hop".parse().unwrap());
        original.insert("x-internal-token", "secret".parse().unwrap());
        original.insert("x-trace-hop", "1".parse().unwrap());
        original.insert("x-kept", "yes".parse().unwrap());

        let result = build_forwarded_headers(&original, &inbound(), "127.0.0.1:9001");

        assert!(result.get("connection").is_none());
        assert!(result.get("x-internal-token").is_none());
        assert!(result.get("x-trace-hop").is_none());
        assert_eq!(result.get("x-kept").unwrap(), "yes");
    }

    #[test]
    fn response_strip_honours_connection_list() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "close, x-upstream-hop".parse().unwrap());
        headers.insert("x-upstream-hop", "1".parse().unwrap());
        headers.insert("x-upstream", "a".parse().unwrap());
        strip_response_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-upstream"));
    }

    #[test]
    fn rewrites_host_and_keeps_original_in_forwarded_host() {
        let mut original = HeaderMap::new();
        original.insert("host", "proxy.example.com:8081".parse().unwrap());

        let result = build_forwarded_headers(&original, &inbound(), "127.0.0.1:9001");

        assert_eq!(result.get("host").unwrap(), "127.0.0.1:9001");
        assert_eq!(
            result.get("x-forwarded-host").unwrap(),
            "proxy.example.com:8081"
        );
    }

    #[test]
    fn overwrites_client_supplied_forwarded_headers() {
        let mut original = HeaderMap::new();
        original.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        original.insert("x-forwarded-proto", "https".parse().unwrap());
        original.insert("x-forwarded-host", "spoofed".parse().unwrap());

        let result = build_forwarded_headers(&original, &inbound(), "127.0.0.1:9001");

        assert_eq!(result.get("x-forwarded-for").unwrap(), "10.0.0.1");
        assert_eq!(result.get_all("x-forwarded-for").iter().count(), 1);
        assert_eq!(result.get("x-forwarded-proto").unwrap(), "http");
        assert!(result.get("x-forwarded-host").is_none());
    }

    #[test]
    fn sets_request_metadata() {
        let result = build_forwarded_headers(&HeaderMap::new(), &inbound(), "127.0.0.1:9001");

        assert_eq!(result.get("x-forwarded-method").unwrap(), "GET");
        assert_eq!(result.get("x-forwarded-path").unwrap(), "/svc1/items");
        assert_eq!(result.get("x-forwarded-query").unwrap(), "page=2");
        assert_eq!(result.get("x-forwarded-port").unwrap(), "8081");
    }

    #[test]
    fn proto_follows_route_not_target() {
        let mut req = inbound();
        req.proto = Protocol::Https;
        let result = build_forwarded_headers(&HeaderMap::new(), &req, "127.0.0.1:9001");
        assert_eq!(result.get("x-forwarded-proto").unwrap(), "https");
    }

    #[test]
    fn response_strip_drops_length() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", "12".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("x-upstream", "a".parse().unwrap());
        strip_response_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
    }
}
