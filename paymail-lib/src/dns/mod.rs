//! Paymail service discovery.
//!
//! A domain announces its paymail service with an SRV record at
//! `_bsvalias._tcp.<domain>`. Without one, the service is expected at
//! `https://<domain>:443`.
//!
//! Lookups go through the [`SrvResolver`] trait so callers and tests can
//! substitute their own record source; [`HickorySrvResolver`] queries a real
//! name server.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ResolveOptions, Scheme};
use crate::handle::Domain;
use crate::trace::{TraceKind, Tracer};
use crate::Result;

mod hickory;

pub use hickory::HickorySrvResolver;

/// Port used when no SRV record exists.
pub const FALLBACK_PORT: u16 = 443;

/// One SRV answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SrvRecord {
    /// Target host, without the trailing dot.
    pub target: String,
    /// Target port.
    pub port: u16,
    /// Lower is preferred.
    pub priority: u16,
    /// Relative weight among records of equal priority.
    pub weight: u16,
}

impl SrvRecord {
    /// Create a record, stripping a trailing dot from the target.
    pub fn new(target: impl Into<String>, port: u16, priority: u16, weight: u16) -> Self {
        let target = target.into();
        let target = match target.strip_suffix('.') {
            Some(stripped) if !stripped.is_empty() => stripped.to_string(),
            _ => target,
        };
        Self {
            target,
            port,
            priority,
            weight,
        }
    }

    /// A target of `.` means the service is decidedly not available.
    pub fn is_unavailable(&self) -> bool {
        self.target.is_empty() || self.target == "."
    }
}

/// Where an endpoint came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSource {
    /// Selected from SRV records.
    Srv,
    /// The domain itself on the default port.
    Fallback,
}

/// Where the paymail service of a domain lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Host to contact.
    pub host: String,
    /// Port to contact.
    pub port: u16,
    /// URL scheme.
    pub scheme: Scheme,
    /// SRV or fallback.
    pub source: EndpointSource,
}

impl ServiceEndpoint {
    /// The fallback endpoint for a domain.
    pub fn fallback(domain: &Domain, scheme: Scheme) -> Self {
        Self {
            host: domain.as_str().to_string(),
            port: FALLBACK_PORT,
            scheme,
            source: EndpointSource::Fallback,
        }
    }

    /// The endpoint an SRV record points to.
    pub fn from_record(record: &SrvRecord, scheme: Scheme) -> Self {
        Self {
            host: record.target.clone(),
            port: record.port,
            scheme,
            source: EndpointSource::Srv,
        }
    }

    /// `scheme://host:port`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }

    /// URL of the capability discovery document.
    pub fn well_known_url(&self) -> String {
        format!("{}/.well-known/bsvalias", self.base_url())
    }
}

/// Result of discovery: the endpoint and the SRV record it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    /// Endpoint to contact.
    pub endpoint: ServiceEndpoint,
    /// Selected SRV record, absent for the fallback.
    pub record: Option<SrvRecord>,
}

/// Source of SRV records.
///
/// Absence of records (NXDOMAIN, empty answer) is `Ok(vec![])`; `Err` is
/// reserved for failed queries.
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// Look up SRV records for a fully qualified query name.
    async fn lookup_srv(&self, name: &str, options: &ResolveOptions) -> Result<Vec<SrvRecord>>;
}

/// Resolver serving fixed records, keyed by query name.
#[derive(Clone, Debug, Default)]
pub struct StaticSrvResolver {
    records: Vec<(String, SrvRecord)>,
}

impl StaticSrvResolver {
    /// Create an empty resolver; every lookup finds nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record for `name` (e.g. `_bsvalias._tcp.example.com`).
    pub fn with_record(mut self, name: impl Into<String>, record: SrvRecord) -> Self {
        self.records.push((name.into().to_ascii_lowercase(), record));
        self
    }
}

#[async_trait]
impl SrvResolver for StaticSrvResolver {
    async fn lookup_srv(&self, name: &str, _options: &ResolveOptions) -> Result<Vec<SrvRecord>> {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        Ok(self
            .records
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

/// Find the paymail service endpoint of `domain`.
///
/// With `skip_srv_check` no query is made and the fallback is used.
#[tracing::instrument(skip_all, fields(domain = %domain))]
pub async fn discover<R, G>(
    resolver: &R,
    domain: &Domain,
    options: &ResolveOptions,
    tracer: &Tracer,
    rng: &mut G,
) -> Result<Discovery>
where
    R: SrvResolver + ?Sized,
    G: Rng,
{
    if options.skip_srv_check {
        debug!("SRV lookup skipped, using fallback endpoint");
        return Ok(Discovery {
            endpoint: ServiceEndpoint::fallback(domain, options.scheme),
            record: None,
        });
    }

    let name = options.srv_query_name(domain.as_str());
    let span = tracer.start(TraceKind::Dns, name.clone(), "SRV");
    let lookup = resolver.lookup_srv(&name, options).await;
    match &lookup {
        Ok(records) => {
            let answer = records
                .iter()
                .map(|r| format!("{} {} {} {}", r.priority, r.weight, r.port, r.target))
                .collect::<Vec<_>>()
                .join("\n");
            span.finish(None, Some(answer), None);
        }
        Err(err) => span.finish(None, None, Some(err.to_string())),
    }
    let records = lookup?;

    match select_srv(&records, rng) {
        Some(record) => {
            debug!(host = %record.target, port = record.port, "selected SRV record");
            Ok(Discovery {
                endpoint: ServiceEndpoint::from_record(record, options.scheme),
                record: Some(record.clone()),
            })
        }
        None => {
            debug!(query = %name, "no usable SRV record, using fallback endpoint");
            Ok(Discovery {
                endpoint: ServiceEndpoint::fallback(domain, options.scheme),
                record: None,
            })
        }
    }
}

/// Pick one record following RFC 2782.
///
/// Only the lowest priority is considered. Within it, a record is chosen at
/// random proportionally to its weight; zero-weight records are chosen only
/// when every candidate has weight zero. Unavailable targets are ignored.
pub fn select_srv<'a, G: Rng>(records: &'a [SrvRecord], rng: &mut G) -> Option<&'a SrvRecord> {
    let usable: Vec<&SrvRecord> = records.iter().filter(|r| !r.is_unavailable()).collect();
    let lowest = usable.iter().map(|r| r.priority).min()?;
    let candidates: Vec<&SrvRecord> = usable.into_iter().filter(|r| r.priority == lowest).collect();

    let total: u32 = candidates.iter().map(|r| u32::from(r.weight)).sum();
    if total == 0 {
        let index = rng.gen_range(0..candidates.len());
        return candidates.get(index).copied();
    }

    let pick = rng.gen_range(0..total);
    let mut running = 0u32;
    for record in &candidates {
        running += u32::from(record.weight);
        if record.weight > 0 && pick < running {
            return Some(*record);
        }
    }
    candidates.last().copied()
}
