//! Request dispatch for route listeners.
//!
//! [`forward_handler`] is the Axum fallback on every route listener. It
//! gates the path on the route's pattern, looks the first path segment up
//! in the route's [`upstream::UpstreamRegistry`], and relays the request
//! with the segment stripped. Submodules handle path splitting
//! ([`routing`]), header construction ([`headers`]), and per-target
//! clients ([`upstream`]).

pub mod headers;
pub mod routing;
pub mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Full};

use crate::error::UpstreamError;
use crate::server::RouteState;

use self::headers::InboundRequest;
use self::upstream::{Upstream, RESPONSE_HEADER_TIMEOUT};

pub async fn forward_handler(
    State(state): State<Arc<RouteState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();

    let matched = routing::pattern_matches(&state.pattern, path)
        .then(|| routing::split_prefix(path))
        .flatten()
        .and_then(|(prefix, forward_path)| {
            state
                .registry
                .get(prefix)
                .map(|upstream| (upstream, forward_path))
        });

    let Some((upstream, forward_path)) = matched else {
        state.metrics.observe_unmatched();
        tracing::debug!(method = %method, path = %path, "no upstream for path");
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    let client_ip = addr.ip().to_string();
    let inbound = InboundRequest {
        proto: state.protocol,
        client_ip: &client_ip,
        method: method.as_str(),
        path,
        query: uri.query().unwrap_or(""),
        listen_port: state.listen_port,
    };

    let start = Instant::now();
    let result = dispatch(upstream, &method, &forward_path, &req_headers, &inbound, body).await;
    let elapsed = start.elapsed();
    state.metrics.observe_dispatch(elapsed);

    match result {
        Ok(response) => {
            tracing::debug!(
                method = %method,
                path = %path,
                upstream = %upstream.name,
                status = response.status().as_u16(),
                latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request proxied"
            );
            response
        }
        Err(e) => {
            tracing::error!(
                method = %method,
                path = %path,
                upstream = %upstream.name,
                url = %upstream.base_url,
                error = %e,
                "proxy error"
            );
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}

async fn dispatch(
    upstream: &Upstream,
    method: &Method,
    forward_path: &str,
    original_headers: &HeaderMap,
    inbound: &InboundRequest<'_>,
    body: Bytes,
) -> Result<Response, UpstreamError> {
    let client = upstream.client()?;

    let query = (!inbound.query.is_empty()).then_some(inbound.query);
    let raw_uri = routing::upstream_uri(&upstream.base_url, forward_path, query);
    let target_uri: Uri = raw_uri
        .parse()
        .map_err(|source| UpstreamError::InvalidUri {
            uri: raw_uri.clone(),
            source,
        })?;

    let forwarded = headers::build_forwarded_headers(original_headers, inbound, &upstream.authority);

    let mut builder = hyper::Request::builder().method(method.clone()).uri(target_uri);
    if let Some(request_headers) = builder.headers_mut() {
        request_headers.extend(forwarded);
    }
    let request = builder.body(Full::new(body))?;

    let response = tokio::time::timeout(RESPONSE_HEADER_TIMEOUT, client.request(request))
        .await
        .map_err(|_| UpstreamError::Timeout(RESPONSE_HEADER_TIMEOUT))??;

    let status = response.status();
    let mut resp_headers = response.headers().clone();
    let body_bytes = response.into_body().collect().await?.to_bytes();

    headers::strip_response_hop_by_hop(&mut resp_headers);

    let mut relayed = Response::new(Body::from(body_bytes));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = resp_headers;
    Ok(relayed)
}
