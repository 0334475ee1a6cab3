//! SRV lookups through `hickory-resolver`.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;

use super::{SrvRecord, SrvResolver};
use crate::config::ResolveOptions;
use crate::{PaymailError, Result};

/// Queries the name server configured in [`ResolveOptions::name_server`].
///
/// A resolver is built per lookup, so no answers are cached between
/// resolutions.
#[derive(Clone, Copy, Debug, Default)]
pub struct HickorySrvResolver;

impl HickorySrvResolver {
    /// Create a resolver.
    pub fn new() -> Self {
        Self
    }

    fn build(options: &ResolveOptions) -> Result<TokioAsyncResolver> {
        let addr = options.name_server_addr()?;
        let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = options.timeout();
        opts.attempts = 2;
        opts.cache_size = 0;

        Ok(TokioAsyncResolver::tokio(config, opts))
    }
}

#[async_trait]
impl SrvResolver for HickorySrvResolver {
    async fn lookup_srv(&self, name: &str, options: &ResolveOptions) -> Result<Vec<SrvRecord>> {
        let resolver = Self::build(options)?;

        match resolver.srv_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|srv| {
                    SrvRecord::new(
                        srv.target().to_utf8(),
                        srv.port(),
                        srv.priority(),
                        srv.weight(),
                    )
                })
                .collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
                _ => Err(PaymailError::Dns(format!("SRV lookup for {} failed: {}", name, e))),
            },
        }
    }
}
