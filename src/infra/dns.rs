//! DNS resolution over a shared hickory resolver.

use hickory_resolver::{config::*, TokioAsyncResolver};
use std::{net::IpAddr, sync::Arc};
use tokio::sync::OnceCell;

/// Shared resolver; the underlying client is safe for concurrent lookups.
static DNS_RESOLVER: OnceCell<Arc<TokioAsyncResolver>> = OnceCell::const_new();

async fn get_resolver() -> Arc<TokioAsyncResolver> {
    DNS_RESOLVER
        .get_or_init(|| async {
            // System configuration honours /etc/hosts; fall back to public defaults.
            let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
                tracing::warn!("Falling back to default DNS config: {}", e);
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            });
            Arc::new(resolver)
        })
        .await
        .clone()
}

/// Resolves a hostname (or IP literal) to a non-empty list of addresses.
pub async fn resolve_dns(host: &str) -> Result<Vec<IpAddr>, String> {
    // IPv6 literals arrive bracketed from URL host strings
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let resolver = get_resolver().await;
    match resolver.lookup_ip(bare).await {
        Ok(response) => {
            let ips: Vec<IpAddr> = response.iter().collect();
            if ips.is_empty() {
                Err(format!("DNS lookup for {} returned no addresses", bare))
            } else {
                Ok(ips)
            }
        }
        Err(e) => Err(format!("DNS lookup for {} failed: {}", bare, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ip_address() {
        let ips = resolve_dns("127.0.0.1").await.unwrap();
        assert_eq!(ips, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_bracketed_ipv6() {
        let ips = resolve_dns("[::1]").await.unwrap();
        assert_eq!(ips, vec!["::1".parse::<IpAddr>().unwrap()]);
    }
}
