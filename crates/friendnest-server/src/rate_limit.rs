use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ServerError;

#[derive(Debug, Clone)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Fixed-window request counter keyed by client address.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
    limit: u32,
    window: Duration,
    message: &'static str,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, message: &'static str) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            limit,
            window,
            message,
        }
    }

    /// General limiter for the admin API.
    pub fn admin(limit: u32, window: Duration) -> Self {
        Self::new(
            limit,
            window,
            "Too many requests from this IP, please try again later.",
        )
    }

    /// Stricter limiter for admin login attempts.
    pub fn admin_login(limit: u32, window: Duration) -> Self {
        Self::new(
            limit,
            window,
            "Too many login attempts, please try again after 15 minutes.",
        )
    }

    /// Count a hit from `ip`. Returns the seconds until the window resets
    /// when the limit is exceeded.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let entry = windows.entry(ip).or_insert(Window {
            started: now,
            hits: 0,
        });

        let elapsed = now.duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.hits = 0;
        }

        if entry.hits >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(remaining.as_secs().max(1));
        }

        entry.hits += 1;
        Ok(())
    }

    /// Drop windows that have already expired.
    pub async fn purge_stale(&self) {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = self.window;
        windows.retain(|_, w| now.duration_since(w.started) < window);
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    if let Some(ip) = extract_client_ip(&req) {
        if let Err(retry_after_secs) = limiter.check(ip).await {
            warn!(ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
            return Err(ServerError::RateLimited {
                message: limiter.message.to_string(),
                retry_after_secs,
            });
        }
    }

    Ok(next.run(req).await)
}

/// Try ConnectInfo first, then X-Forwarded-For, then X-Real-IP.
fn extract_client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_within_window() {
        let limiter = RateLimiter::admin(3, Duration::from_secs(900));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check(ip).await.is_ok());
        }

        let retry_after = limiter.check(ip).await.unwrap_err();
        assert!(retry_after > 0 && retry_after <= 900);
    }

    #[tokio::test]
    async fn test_different_ips_counted_separately() {
        let limiter = RateLimiter::admin(1, Duration::from_secs(900));
        let ip1: IpAddr = "10.0.0.1".parse().unwrap();
        let ip2: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(ip1).await.is_ok());
        assert!(limiter.check(ip1).await.is_err());
        assert!(limiter.check(ip2).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = RateLimiter::admin(1, Duration::from_millis(20));
        let ip: IpAddr = "10.0.0.3".parse().unwrap();

        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_err());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check(ip).await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let limiter = RateLimiter::admin(5, Duration::from_millis(1));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();
        assert!(limiter.check(ip).await.is_ok());

        tokio::time::sleep(Duration::from_millis(5)).await;
        limiter.purge_stale().await;

        let windows = limiter.windows.lock().await;
        assert!(windows.is_empty());
    }

    #[test]
    fn test_forwarded_for_header() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(
            extract_client_ip(&req),
            Some("203.0.113.7".parse().unwrap())
        );
    }
}
