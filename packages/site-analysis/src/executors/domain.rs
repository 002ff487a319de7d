//! Domain and server location lookup (URL only).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;
use url::{Host, Url};

use crate::error::{ExecutorError, ExecutorResult};
use crate::traits::executor::Executor;
use crate::types::WorkInput;

const NOT_AVAILABLE: &str = "N/A";

/// Geolocation of the server hosting a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLocation {
    pub ip_address: String,
    pub city: String,
    pub region: String,
    pub country: String,
    /// "lat,long"
    pub location: String,
}

/// Everything the lookup reports for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    /// Host with any leading `www.` removed
    pub domain: String,
    /// First label of `domain`
    pub domain_name: String,
    /// Upper-cased two-letter TLD, or "N/A"
    pub country_code: String,
    pub ip_address: String,
    /// Present when a geolocation service is configured
    pub server_location: Option<ServerLocation>,
}

/// Fields read from an ipinfo-style response.
#[derive(Debug, Default, Deserialize)]
struct IpInfoResponse {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    loc: Option<String>,
}

/// Location executor.
#[derive(Debug, Clone)]
pub struct DomainLookup {
    client: reqwest::Client,
    ipinfo_base_url: Option<String>,
    resolve_timeout: Duration,
    request_timeout: Duration,
}

impl Default for DomainLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainLookup {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            ipinfo_base_url: None,
            resolve_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Enable server geolocation against an ipinfo-compatible service,
    /// e.g. `https://ipinfo.io`.
    pub fn with_ipinfo(mut self, base_url: impl Into<String>) -> Self {
        self.ipinfo_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Look up a URL.
    pub async fn lookup(&self, url: &str) -> ExecutorResult<DomainInfo> {
        let parsed = Url::parse(url).map_err(|e| ExecutorError::InvalidInput(e.to_string()))?;
        let host = parsed
            .host()
            .ok_or_else(|| ExecutorError::InvalidInput(format!("no host in {}", url)))?;

        let (domain, ip) = match host {
            Host::Ipv4(ip) => (ip.to_string(), IpAddr::V4(ip)),
            Host::Ipv6(ip) => (ip.to_string(), IpAddr::V6(ip)),
            Host::Domain(name) => {
                let domain = strip_www(name).to_string();
                let port = parsed.port_or_known_default().unwrap_or(80);
                (domain, self.resolve(name, port).await?)
            }
        };

        let server_location = match &self.ipinfo_base_url {
            Some(base) => Some(self.locate(base, ip).await?),
            None => None,
        };

        Ok(DomainInfo {
            domain_name: domain_name(&domain),
            country_code: country_code(&domain),
            domain,
            ip_address: ip.to_string(),
            server_location,
        })
    }

    async fn resolve(&self, host: &str, port: u16) -> ExecutorResult<IpAddr> {
        let mut addrs = tokio::time::timeout(
            self.resolve_timeout,
            tokio::net::lookup_host((host, port)),
        )
        .await
        .map_err(|_| ExecutorError::Timeout(self.resolve_timeout))?
        .map_err(|e| ExecutorError::Upstream(format!("failed to resolve {}: {}", host, e)))?;

        let addr = addrs
            .next()
            .ok_or_else(|| ExecutorError::Upstream(format!("no addresses for {}", host)))?;
        debug!(host = %host, ip = %addr.ip(), "Resolved host");
        Ok(addr.ip())
    }

    async fn locate(&self, base: &str, ip: IpAddr) -> ExecutorResult<ServerLocation> {
        let response = self
            .client
            .get(format!("{}/{}/json", base, ip))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ExecutorError::Upstream(format!("geolocation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecutorError::Upstream(format!(
                "geolocation service returned {}",
                status
            )));
        }

        let info: IpInfoResponse = response
            .json()
            .await
            .map_err(|e| ExecutorError::Upstream(format!("invalid geolocation response: {}", e)))?;

        let or_na = |value: Option<String>| value.unwrap_or_else(|| NOT_AVAILABLE.to_string());
        Ok(ServerLocation {
            ip_address: ip.to_string(),
            city: or_na(info.city),
            region: or_na(info.region),
            country: or_na(info.country),
            location: or_na(info.loc),
        })
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// First label of a multi-label domain; single labels come back unchanged.
fn domain_name(domain: &str) -> String {
    match domain.split_once('.') {
        Some((first, _)) => first.to_string(),
        None => domain.to_string(),
    }
}

/// Two-letter alphabetic TLD, upper-cased.
fn country_code(domain: &str) -> String {
    domain
        .rsplit_once('.')
        .map(|(_, tld)| tld)
        .filter(|tld| tld.len() == 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|tld| tld.to_ascii_uppercase())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

#[async_trait]
impl Executor for DomainLookup {
    async fn execute(&self, input: &WorkInput) -> ExecutorResult<serde_json::Value> {
        let info = self.lookup(&input.subject_key).await?;
        serde_json::to_value(info).map_err(|e| ExecutorError::Upstream(e.to_string()))
    }
}
