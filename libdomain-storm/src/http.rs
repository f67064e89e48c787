use crate::{config::RdapConfig, proxy::Proxy};
use reqwest::Client;
use std::time::Duration;

/// Keep-alive client that routes every request through `proxy`.
pub fn create_proxied_client(proxy: &Proxy, config: &RdapConfig) -> Result<Client, reqwest::Error> {
    let route = reqwest::Proxy::all(format!("http://{}", proxy.addr()))?
        .basic_auth(proxy.user(), proxy.password());
    Client::builder()
        .proxy(route)
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_proxy)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .use_rustls_tls()
        .build()
}

/// Direct client for bootstrap metadata.
pub fn create_direct_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .no_proxy()
        .use_rustls_tls()
        .build()
}
