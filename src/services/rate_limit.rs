use axum::http::Request;
use std::net::IpAddr;
use tower_governor::{GovernorError, key_extractor::KeyExtractor};

/// Header telemetry gateways identify themselves with.
pub const GATEWAY_HEADER: &str = "x-gateway-id";

/// Rate-limit key: the telemetry gateway when it identifies itself, else the
/// client IP. Tries X-Gateway-Id, X-Forwarded-For, X-Real-IP, then peer
/// address, then falls back to localhost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayKeyExtractor;

impl KeyExtractor for GatewayKeyExtractor {
    type Key = String;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        if let Some(gateway) = req
            .headers()
            .get(GATEWAY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Ok(format!("gw:{gateway}"));
        }
        Ok(format!("ip:{}", client_ip(req)))
    }
}

fn client_ip<T>(req: &Request<T>) -> IpAddr {
    // Reverse proxies: first IP in the chain
    if let Some(ip) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    if let Some(ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    if let Some(connect_info) = req
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
    {
        return connect_info.0.ip();
    }

    // Requests without an identifiable IP share one bucket
    IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/api/telemetry");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn gateway_header_wins_over_ip() {
        let req = request(&[(GATEWAY_HEADER, "gw-7"), ("x-forwarded-for", "10.0.0.1")]);
        assert_eq!(GatewayKeyExtractor.extract(&req).unwrap(), "gw:gw-7");
    }

    #[test]
    fn falls_back_to_forwarded_ip_then_localhost() {
        let req = request(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2")]);
        assert_eq!(GatewayKeyExtractor.extract(&req).unwrap(), "ip:10.0.0.1");

        let req = request(&[(GATEWAY_HEADER, "  ")]);
        assert_eq!(GatewayKeyExtractor.extract(&req).unwrap(), "ip:127.0.0.1");
    }
}
