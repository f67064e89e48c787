use crate::{
    client::{ByteCounters, ProtocolClient},
    config::WhoisConfig,
    endpoint::extract_tld,
    proxy::Proxy,
    types::{Bandwidth, QueryError, QueryResult, Verdict},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const AVAILABLE_SENTINEL: &[u8] = b"No match";
const TAKEN_SENTINEL: &[u8] = b"Domain Name";

pub fn whois_server_for(tld: &str) -> Option<&'static str> {
    match tld {
        "com" | "net" => Some("whois.verisign-grs.com"),
        "org" => Some("whois.pir.org"),
        "io" => Some("whois.nic.io"),
        "dev" | "app" => Some("whois.nic.google"),
        "ai" => Some("whois.nic.ai"),
        "co" => Some("whois.nic.co"),
        "me" => Some("whois.nic.me"),
        _ => None,
    }
}

/// Classifies a response prefix. Anything without a sentinel is `Unknown`
/// and keeps the raw prefix as detail.
pub fn classify_whois(prefix: &[u8]) -> (Verdict, Option<String>) {
    if contains(prefix, AVAILABLE_SENTINEL) {
        (Verdict::Available, None)
    } else if contains(prefix, TAKEN_SENTINEL) {
        (Verdict::Taken, None)
    } else {
        let raw = String::from_utf8_lossy(&prefix[..prefix.len().min(30)]);
        (Verdict::Unknown, Some(format!("unexpected response: {raw:?}")))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// WHOIS over an HTTP CONNECT tunnel.
///
/// Registries close the stream after one answer, so every call opens a fresh
/// tunnel. Only the first `response_bytes` of the answer are read.
#[derive(Debug, Default)]
pub struct WhoisTunnelClient {
    config: WhoisConfig,
    counters: ByteCounters,
}

impl WhoisTunnelClient {
    pub fn new(config: WhoisConfig) -> Self {
        Self {
            config,
            counters: ByteCounters::default(),
        }
    }

    /// Tunnels established so far; equals the number of queries sent.
    pub fn tunnels_created(&self) -> u64 {
        self.counters.snapshot().connections_opened
    }

    fn server_for(&self, domain: &str) -> Result<String, QueryError> {
        if let Some(server) = &self.config.server {
            return Ok(server.clone());
        }
        let tld = extract_tld(domain).map_err(|_| QueryError::NoEndpoint(domain.to_string()))?;
        whois_server_for(&tld)
            .map(str::to_string)
            .ok_or(QueryError::NoEndpoint(tld))
    }

    async fn query(
        &self,
        domain: &str,
        proxy: &Proxy,
    ) -> Result<(Verdict, Option<String>), QueryError> {
        let server = self.server_for(domain)?;
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((proxy.host(), proxy.port())),
        )
        .await
        .map_err(|_| QueryError::Timeout)?
        .map_err(|e| QueryError::ConnectFailure(e.to_string()))?;

        let mut stream = BufReader::new(stream);
        let outcome = self.exchange(&mut stream, &server, domain, proxy).await;
        // Close on every path, success or not.
        let _ = stream.get_mut().shutdown().await;
        outcome
    }

    async fn exchange(
        &self,
        stream: &mut BufReader<TcpStream>,
        server: &str,
        domain: &str,
        proxy: &Proxy,
    ) -> Result<(Verdict, Option<String>), QueryError> {
        self.open_tunnel(stream, server, proxy).await?;

        let query = format!("{domain}\r\n");
        stream.get_mut().write_all(query.as_bytes()).await?;
        self.counters.sent(query.len());

        let prefix = self.read_prefix(stream).await?;
        if prefix.is_empty() {
            return Err(QueryError::EmptyResponse);
        }
        Ok(classify_whois(&prefix))
    }

    async fn open_tunnel(
        &self,
        stream: &mut BufReader<TcpStream>,
        server: &str,
        proxy: &Proxy,
    ) -> Result<(), QueryError> {
        let auth = STANDARD.encode(format!("{}:{}", proxy.user(), proxy.password()));
        let request = format!(
            "CONNECT {server}:{port} HTTP/1.1\r\nProxy-Authorization: Basic {auth}\r\n\r\n",
            port = self.config.port
        );
        stream.get_mut().write_all(request.as_bytes()).await?;
        self.counters.sent(request.len());

        let status = self.read_line(stream).await?;
        if !is_connect_ok(&status) {
            let line = status.trim();
            return Err(QueryError::TunnelRejected(if line.is_empty() {
                "empty CONNECT response".to_string()
            } else {
                line.to_string()
            }));
        }

        loop {
            let line = self.read_line(stream).await?;
            if line.is_empty() || line == "\r\n" || line == "\n" {
                break;
            }
        }
        self.counters.connection();
        Ok(())
    }

    async fn read_line(&self, stream: &mut BufReader<TcpStream>) -> Result<String, QueryError> {
        let mut line = String::new();
        let n = tokio::time::timeout(self.config.read_timeout, stream.read_line(&mut line))
            .await
            .map_err(|_| QueryError::Timeout)??;
        self.counters.received(n);
        Ok(line)
    }

    async fn read_prefix<R>(&self, stream: &mut R) -> Result<Vec<u8>, QueryError>
    where
        R: AsyncRead + Unpin,
    {
        let limit = self.config.response_bytes.max(TAKEN_SENTINEL.len());
        let deadline = tokio::time::Instant::now() + self.config.read_timeout;
        let mut buf = vec![0u8; limit];
        let mut filled = 0;
        while filled < limit {
            let n = tokio::time::timeout_at(deadline, stream.read(&mut buf[filled..]))
                .await
                .map_err(|_| QueryError::Timeout)??;
            if n == 0 {
                break;
            }
            filled += n;
            self.counters.received(n);
            let seen = &buf[..filled];
            if contains(seen, AVAILABLE_SENTINEL) || contains(seen, TAKEN_SENTINEL) {
                break;
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

fn is_connect_ok(status_line: &str) -> bool {
    let mut parts = status_line.split_whitespace();
    matches!(
        (parts.next(), parts.next()),
        (Some(version), Some("200")) if version.starts_with("HTTP/")
    )
}

#[async_trait]
impl ProtocolClient for WhoisTunnelClient {
    async fn check_status(&self, domain: &str, proxy: &Proxy) -> QueryResult {
        let start = Instant::now();
        match self.query(domain, proxy).await {
            Ok((verdict, detail)) => {
                let result = QueryResult::new(domain, verdict, start.elapsed());
                match detail {
                    Some(detail) => result.with_detail(detail),
                    None => result,
                }
            }
            Err(e) => {
                tracing::debug!(domain, proxy = %proxy, error = %e, "whois attempt failed");
                QueryResult::from_error(domain, &e, start.elapsed())
            }
        }
    }

    fn bandwidth(&self) -> Bandwidth {
        self.counters.snapshot()
    }

    fn name(&self) -> &'static str {
        "whois"
    }
}
