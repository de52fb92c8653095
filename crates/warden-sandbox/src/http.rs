//! HTTP execution strategy.
//!
//! # Security
//!
//! - Only `http` and `https` URLs, with placeholders percent-encoded so a
//!   parameter cannot change the host, path structure, or query
//! - Metadata endpoints are refused by name and by address, always
//! - Every resolved address must be public unless private networks are
//!   explicitly allowed; a failed lookup is a refusal
//! - The host is resolved twice and both answers must agree; the second
//!   answer is pinned into the client, so no further lookup happens
//! - Redirects are not followed and proxies are ignored
//! - Transport errors reach the caller without URL or header detail

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use tracing::{debug, warn};
use url::{Host, Url};
use warden_core::{ExecutionSpec, HttpMethod, Parameters, truncate};

use crate::error::{SandboxError, SandboxResult};
use crate::net::{is_metadata_host, is_metadata_ip, is_safe_ip};
use crate::resolver::{HostResolver, PinnedResolver, SystemResolver};
use crate::secrets::Secrets;
use crate::template::{self, Escape};

/// Default request timeout (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default response body cap (1 MiB).
const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Containment settings for outbound requests.
#[derive(Debug, Clone)]
pub struct HttpPolicy {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Response body bytes returned to the caller.
    pub max_response_bytes: usize,
    /// Permit private, loopback and link-local targets. Metadata endpoints
    /// stay blocked.
    pub allow_private_networks: bool,
    /// Extra host names refused like metadata endpoints.
    pub extra_blocked_hosts: Vec<String>,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            allow_private_networks: false,
            extra_blocked_hosts: Vec::new(),
        }
    }
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    /// Status code.
    pub status: u16,
    /// Body text, capped.
    pub body: String,
    /// Whether the body was clipped.
    pub truncated: bool,
}

/// Runs [`ExecutionSpec::Http`] definitions.
#[derive(Clone)]
pub struct HttpStrategy {
    policy: HttpPolicy,
    resolver: Arc<dyn HostResolver>,
}

impl std::fmt::Debug for HttpStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStrategy")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl HttpStrategy {
    /// Strategy with a custom resolver.
    #[must_use]
    pub fn new(policy: HttpPolicy, resolver: Arc<dyn HostResolver>) -> Self {
        Self { policy, resolver }
    }

    /// Strategy using the system resolver.
    #[must_use]
    pub fn with_system_resolver(policy: HttpPolicy) -> Self {
        Self::new(policy, Arc::new(SystemResolver))
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &HttpPolicy {
        &self.policy
    }

    /// Render and send the request described by `spec`.
    ///
    /// # Errors
    ///
    /// - [`SandboxError::Violation`] if the target is refused
    /// - [`SandboxError::Template`] if rendering fails
    /// - [`SandboxError::Transport`] or [`SandboxError::HttpStatus`] for
    ///   network and protocol failures
    pub async fn execute(
        &self,
        spec: &ExecutionSpec,
        params: &Parameters,
        secrets: &Secrets,
    ) -> SandboxResult<HttpOutcome> {
        let ExecutionSpec::Http {
            method,
            url,
            query,
            headers,
            body,
        } = spec
        else {
            return Err(SandboxError::Violation(
                "definition is not an HTTP plugin".to_string(),
            ));
        };

        let rendered = template::render(url, params, secrets, Escape::UrlComponent)?;
        let mut url = Url::parse(&rendered)
            .map_err(|e| SandboxError::Violation(format!("invalid URL: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, &template::render(value, params, secrets, Escape::None)?);
            }
        }

        let addrs = self.verify_target(&url).await?;

        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(self.policy.timeout)
            .no_proxy();
        if let Some(Host::Domain(domain)) = url.host() {
            builder = builder.dns_resolver(Arc::new(PinnedResolver::new(domain, addrs)));
        }
        let client = builder.build().map_err(|e| transport_error(&e))?;

        let mut request = client.request(reqwest_method(*method), url.clone());
        for (name, value) in headers {
            let value = template::render(value, params, secrets, Escape::None)?;
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SandboxError::Template(format!("invalid header name '{name}'")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|_| SandboxError::Template(format!("invalid value for header '{name}'")))?;
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(&template::render_json(body, params, secrets)?);
        }

        debug!(host = url.host_str().unwrap_or_default(), method = ?method, "Sending plugin HTTP request");
        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "warden::diagnostic",
                status = status.as_u16(),
                host = url.host_str().unwrap_or_default(),
                "Plugin HTTP request returned an error status"
            );
            return Err(SandboxError::HttpStatus(status.as_u16()));
        }

        let (body, truncated) = self.read_capped(response).await?;
        Ok(HttpOutcome {
            status: status.as_u16(),
            body,
            truncated,
        })
    }

    /// Check `url` and return the addresses the connection may use.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Violation`] if the scheme, host, or any
    /// resolved address is refused, if resolution fails, or if the two
    /// resolutions disagree.
    pub async fn verify_target(&self, url: &Url) -> SandboxResult<Vec<SocketAddr>> {
        match url.scheme() {
            "http" | "https" => {},
            other => {
                return Err(SandboxError::Violation(format!(
                    "scheme '{other}' is not allowed"
                )));
            },
        }
        let host = url
            .host()
            .ok_or_else(|| SandboxError::Violation("URL has no host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| SandboxError::Violation("URL has no port".to_string()))?;
        let host_label = url.host_str().unwrap_or_default();

        if is_metadata_host(host_label, &self.policy.extra_blocked_hosts) {
            warn!(target: "warden::diagnostic", host = host_label, "Refused metadata host");
            return Err(SandboxError::Violation(format!(
                "host {host_label} is blocked"
            )));
        }

        match host {
            Host::Ipv4(ip) => {
                let addrs = vec![SocketAddr::new(IpAddr::V4(ip), port)];
                self.check_addrs(host_label, &addrs)?;
                Ok(addrs)
            },
            Host::Ipv6(ip) => {
                let addrs = vec![SocketAddr::new(IpAddr::V6(ip), port)];
                self.check_addrs(host_label, &addrs)?;
                Ok(addrs)
            },
            Host::Domain(name) => {
                let first = self.lookup(name, port).await?;
                self.check_addrs(name, &first)?;

                let second = self.lookup(name, port).await?;
                if ip_set(&first) != ip_set(&second) {
                    warn!(
                        target: "warden::diagnostic",
                        host = name,
                        first = ?ip_set(&first),
                        second = ?ip_set(&second),
                        "DNS answer changed between resolutions"
                    );
                    return Err(SandboxError::Violation(format!(
                        "DNS answer for {name} changed between checks"
                    )));
                }
                Ok(second)
            },
        }
    }

    async fn lookup(&self, name: &str, port: u16) -> SandboxResult<Vec<SocketAddr>> {
        match self.resolver.resolve(name, port).await {
            Ok(addrs) if !addrs.is_empty() => Ok(addrs),
            Ok(_) => Err(SandboxError::Violation(format!(
                "{name} did not resolve to any address"
            ))),
            Err(e) => {
                warn!(target: "warden::diagnostic", host = name, error = %e, "DNS resolution failed");
                Err(SandboxError::Violation(format!(
                    "DNS resolution failed for {name}"
                )))
            },
        }
    }

    fn check_addrs(&self, host: &str, addrs: &[SocketAddr]) -> SandboxResult<()> {
        for addr in addrs {
            let ip = addr.ip();
            let refused = is_metadata_ip(ip)
                || (!self.policy.allow_private_networks && !is_safe_ip(ip));
            if refused {
                warn!(
                    target: "warden::diagnostic",
                    host,
                    %ip,
                    "Refused private or reserved address"
                );
                return Err(SandboxError::Violation(format!(
                    "{host} resolves to a private or reserved address"
                )));
            }
        }
        Ok(())
    }

    async fn read_capped(&self, response: reqwest::Response) -> SandboxResult<(String, bool)> {
        let max = self.policy.max_response_bytes;
        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&e))?;
            let room = max.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }
        let mut text = String::from_utf8_lossy(&body).into_owned();
        if truncated {
            text.push_str(&truncate::truncation_marker(max));
        }
        Ok((text, truncated))
    }
}

fn ip_set(addrs: &[SocketAddr]) -> BTreeSet<IpAddr> {
    addrs.iter().map(SocketAddr::ip).collect()
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Log the full error privately; return a URL-free summary.
fn transport_error(e: &reqwest::Error) -> SandboxError {
    warn!(target: "warden::diagnostic", error = %e, "Plugin HTTP transport error");
    let kind = if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else if e.is_body() || e.is_decode() {
        "failed to read response"
    } else {
        "request failed"
    };
    SandboxError::Transport(kind.to_string())
}
