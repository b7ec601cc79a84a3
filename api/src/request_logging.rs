use crate::resolver::RequestSignals;
use poem::{Endpoint, IntoResponse, Middleware, Request, Response};
use std::time::Instant;

/// Middleware that logs HTTP requests with method, path, status, duration, client IP and
/// the edge-reported country.
pub struct RequestLogging;

impl<E: Endpoint> Middleware<E> for RequestLogging {
    type Output = RequestLoggingEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        RequestLoggingEndpoint { inner: ep }
    }
}

pub struct RequestLoggingEndpoint<E> {
    inner: E,
}

/// Proxy headers first, then the socket peer.
fn client_ip(req: &Request, signals: &RequestSignals) -> String {
    signals
        .client_ip()
        .or_else(|| req.remote_addr().as_socket_addr().map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl<E: Endpoint> Endpoint for RequestLoggingEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let signals = RequestSignals::from_headers(req.headers());
        let client_ip = client_ip(&req, &signals);
        let country = signals.edge_country.unwrap_or_else(|| "-".to_string());

        let response = self.inner.call(req).await;
        let duration_ms = start.elapsed().as_millis();

        match response {
            Ok(resp) => {
                let resp = resp.into_response();
                let status = resp.status();

                if status.is_client_error() || status.is_server_error() {
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        status = %status.as_u16(),
                        duration_ms = %duration_ms,
                        client_ip = %client_ip,
                        country = %country,
                        "request failed"
                    );
                } else if path.ends_with("/health") {
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        status = %status.as_u16(),
                        duration_ms = %duration_ms,
                        "request completed"
                    );
                } else {
                    tracing::info!(
                        method = %method,
                        path = %path,
                        status = %status.as_u16(),
                        duration_ms = %duration_ms,
                        client_ip = %client_ip,
                        country = %country,
                        "request completed"
                    );
                }

                Ok(resp)
            }
            Err(err) => {
                let status = err.status();
                tracing::error!(
                    method = %method,
                    path = %path,
                    status = %status.as_u16(),
                    duration_ms = %duration_ms,
                    client_ip = %client_ip,
                    country = %country,
                    error = %err,
                    "request error"
                );
                Err(err)
            }
        }
    }
}
