//! Resolution sessions.
//!
//! [`PaymailClient::resolve`] runs the whole pipeline for one input:
//! discovery, capability document, concurrent invocation of the requested
//! operations and validation of every response. Each operation ends in its
//! own [`Outcome`]; a failing capability never hides the others.
//!
//! # Example
//!
//! ```rust,ignore
//! use paymail_lib::prelude::*;
//!
//! let client = PaymailClient::new(ResolveOptions::default());
//! let result = client
//!     .resolve("alice@example.com", &CapabilityRequest::default())
//!     .await?;
//!
//! for (operation, capability) in &result.results {
//!     println!("{}: {:?}", operation, capability.outcome);
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::brfc::validate_brfc;
use crate::cancel::CancelToken;
use crate::capabilities::{fetch_capabilities, Capability, CapabilityDocument, Operation};
use crate::config::ResolveOptions;
use crate::dns::{discover, Discovery, HickorySrvResolver, ServiceEndpoint, SrvRecord, SrvResolver};
use crate::handle::{parse_target, Domain, Handle, Target};
use crate::http::HttpClient;
use crate::invoke::{invoke, InvokeParams, Payload, SenderInfo};
use crate::trace::{LogTraceSink, TraceSink, Tracer};
use crate::validate::{
    inspect_script, parse_pubkey, validate_destination, validate_document, validate_p2p_destination,
    validate_pki, validate_profile, validate_srv_record, validate_verification, ScriptInfo,
    ValidationContext, ValidationOutcome,
};
use crate::{PaymailError, Result};

/// Which operations to run, and their inputs.
#[derive(Clone, Debug)]
pub struct CapabilityRequest {
    /// Operations to run.
    pub operations: BTreeSet<Operation>,
    /// Sender details for address resolution.
    pub sender: SenderInfo,
    /// Key to verify; the PKI key of the handle when absent.
    pub verify_pubkey: Option<String>,
    /// Amount for a P2P payment destination.
    pub p2p_satoshis: Option<u64>,
}

impl Default for CapabilityRequest {
    /// Every operation except P2P destinations, which need an amount.
    fn default() -> Self {
        Self::new([
            Operation::Pki,
            Operation::PaymentDestination,
            Operation::PublicProfile,
            Operation::VerifyPubKey,
            Operation::SenderValidation,
        ])
    }
}

impl CapabilityRequest {
    /// Request exactly `operations`.
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            sender: SenderInfo::default(),
            verify_pubkey: None,
            p2p_satoshis: None,
        }
    }

    /// Request every operation.
    pub fn all() -> Self {
        Self::new(Operation::ALL)
    }

    /// Add an operation.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.insert(operation);
        self
    }

    /// Set sender details.
    pub fn with_sender(mut self, sender: SenderInfo) -> Self {
        self.sender = sender;
        self
    }

    /// Verify `pubkey` instead of the PKI key.
    pub fn with_verify_pubkey(mut self, pubkey: impl Into<String>) -> Self {
        self.verify_pubkey = Some(pubkey.into());
        self.operations.insert(Operation::VerifyPubKey);
        self
    }

    /// Request a P2P payment destination for `satoshis`.
    pub fn with_p2p_satoshis(mut self, satoshis: u64) -> Self {
        self.p2p_satoshis = Some(satoshis);
        self.operations.insert(Operation::P2pPaymentDestination);
        self
    }
}

/// Why an operation was not attempted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Disabled by a skip option, named here.
    Option(String),
    /// The target is a bare domain and the operation needs a handle.
    BareDomain,
    /// A required input is missing.
    MissingInput(String),
}

/// Final state of one operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// The service does not advertise the capability.
    NotSupported,
    /// Not attempted.
    Skipped(SkipReason),
    /// The capability is a boolean flag.
    Flag(bool),
    /// The request succeeded and the response validated.
    Success(Payload),
    /// The request or validation failed.
    Failed(PaymailError),
}

/// Result of one requested operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CapabilityResult {
    /// The operation.
    pub operation: Operation,
    /// What happened.
    pub outcome: Outcome,
    /// Non-fatal validation findings.
    pub warnings: Vec<PaymailError>,
    /// Inspected output scripts of destination responses.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<ScriptInfo>,
}

impl CapabilityResult {
    fn new(operation: Operation, outcome: Outcome) -> Self {
        Self {
            operation,
            outcome,
            warnings: Vec::new(),
            scripts: Vec::new(),
        }
    }

    /// The payload if the operation succeeded.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.outcome {
            Outcome::Success(payload) => Some(payload),
            _ => None,
        }
    }

    /// The error if the operation failed.
    pub fn error(&self) -> Option<&PaymailError> {
        match &self.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Everything learned about one target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    /// What was resolved.
    pub target: Target,
    /// Where the service was found.
    pub endpoint: ServiceEndpoint,
    /// The SRV record the endpoint came from.
    pub srv_record: Option<SrvRecord>,
    /// SRV value checks; absent when skipped or without a record.
    pub dns_validation: Option<ValidationOutcome>,
    /// The capability document.
    pub capabilities: CapabilityDocument,
    /// Document version checks.
    pub document_validation: ValidationOutcome,
    /// BRFC checks; absent when skipped.
    pub brfc_validation: Option<ValidationOutcome>,
    /// One result per requested operation.
    pub results: BTreeMap<Operation, CapabilityResult>,
    /// Whether certificate validation was disabled.
    pub insecure: bool,
}

impl ResolutionResult {
    /// Result of `operation`, if it was requested.
    pub fn get(&self, operation: Operation) -> Option<&CapabilityResult> {
        self.results.get(&operation)
    }

    /// Per-capability failures.
    pub fn errors(&self) -> Vec<(Operation, &PaymailError)> {
        self.results
            .iter()
            .filter_map(|(op, result)| result.error().map(|e| (*op, e)))
            .collect()
    }
}

/// Paymail resolver.
///
/// Stateless apart from its options: every call builds its own HTTP client
/// and tracer, and nothing is cached between calls.
pub struct PaymailClient<R: SrvResolver = HickorySrvResolver> {
    options: ResolveOptions,
    resolver: Arc<R>,
    trace_sink: Option<Arc<dyn TraceSink>>,
}

impl PaymailClient<HickorySrvResolver> {
    /// Create a client using the configured name server.
    pub fn new(options: ResolveOptions) -> Self {
        Self::with_resolver(options, HickorySrvResolver::new())
    }
}

impl<R: SrvResolver + 'static> PaymailClient<R> {
    /// Create a client with a custom SRV source.
    pub fn with_resolver(options: ResolveOptions, resolver: R) -> Self {
        Self {
            options,
            resolver: Arc::new(resolver),
            trace_sink: None,
        }
    }

    /// Send network traces to `sink` instead of the debug log.
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    /// The options of this client.
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    fn tracer(&self) -> Tracer {
        if self.options.skip_tracing {
            return Tracer::disabled();
        }
        match &self.trace_sink {
            Some(sink) => Tracer::new(sink.clone()),
            None => Tracer::new(Arc::new(LogTraceSink)),
        }
    }

    /// Find the service endpoint of `domain`.
    pub async fn discover(&self, domain: &Domain) -> Result<Discovery> {
        let mut rng = StdRng::from_entropy();
        discover(&*self.resolver, domain, &self.options, &self.tracer(), &mut rng).await
    }

    /// Fetch the capability document of `endpoint`.
    pub async fn capabilities(&self, endpoint: &ServiceEndpoint) -> Result<CapabilityDocument> {
        let http = HttpClient::new(&self.options, self.tracer())?;
        fetch_capabilities(&http, endpoint).await
    }

    /// Resolve `input` (a handle or domain) and run the requested operations.
    pub async fn resolve(&self, input: &str, request: &CapabilityRequest) -> Result<ResolutionResult> {
        self.resolve_with_cancel(input, request, &CancelToken::new())
            .await
    }

    /// Like [`resolve`](Self::resolve), stopping early when `cancel` fires.
    ///
    /// Cancellation before the capability document arrives returns
    /// `Err(Cancelled)`; afterwards unfinished operations end as
    /// `Failed(Cancelled)`.
    #[tracing::instrument(skip_all, fields(input = %input))]
    pub async fn resolve_with_cancel(
        &self,
        input: &str,
        request: &CapabilityRequest,
        cancel: &CancelToken,
    ) -> Result<ResolutionResult> {
        let target = parse_target(input)?;
        let options = &self.options;
        let tracer = self.tracer();
        let http = HttpClient::new(options, tracer.clone())?;

        let discovery = {
            let mut rng = StdRng::from_entropy();
            cancel
                .run(discover(&*self.resolver, target.domain(), options, &tracer, &mut rng))
                .await?
        };
        let dns_validation = match (&discovery.record, options.skip_dns_check) {
            (Some(record), false) => Some(validate_srv_record(record, options)),
            _ => None,
        };

        let document = cancel
            .run(fetch_capabilities(&http, &discovery.endpoint))
            .await?;
        let document_validation = validate_document(&document, options);
        let brfc_validation =
            (!options.skip_brfc_validation).then(|| validate_brfc(&document, options.strict_brfc));

        let results = self
            .run_operations(&target, &document, request, &http, cancel)
            .await;

        Ok(ResolutionResult {
            target,
            endpoint: discovery.endpoint,
            srv_record: discovery.record,
            dns_validation,
            capabilities: document,
            document_validation,
            brfc_validation,
            results,
            insecure: http.is_insecure(),
        })
    }

    async fn run_operations(
        &self,
        target: &Target,
        document: &CapabilityDocument,
        request: &CapabilityRequest,
        http: &HttpClient,
        cancel: &CancelToken,
    ) -> BTreeMap<Operation, CapabilityResult> {
        let mut results = BTreeMap::new();
        let mut first_phase = Vec::new();
        let mut deferred_verify = None;

        for &operation in &request.operations {
            match self.plan(operation, target, document, request) {
                Plan::Done(outcome) => {
                    results.insert(operation, CapabilityResult::new(operation, outcome));
                }
                Plan::Invoke(template) if operation == Operation::VerifyPubKey && request.verify_pubkey.is_none() => {
                    deferred_verify = Some(template);
                }
                Plan::Invoke(template) => first_phase.push(Job {
                    operation,
                    template,
                    pubkey: request.verify_pubkey.clone(),
                }),
            }
        }

        let Some(handle) = target.handle() else {
            return results;
        };

        let mut raw = spawn_all(first_phase, handle, request, http, cancel).await;

        // PKI first: its key feeds signature checks and deferred verification
        let base_ctx = ValidationContext::new(Some(handle.clone()), &self.options)
            .with_expected_pubkey(request.verify_pubkey.clone());
        let mut pki_key = None;
        if let Some(pki) = raw.remove(&Operation::Pki) {
            let result = finish(Operation::Pki, pki, &base_ctx);
            if let Some(Payload::Pki(response)) = result.payload() {
                pki_key = parse_pubkey(&response.pubkey).ok();
            }
            results.insert(Operation::Pki, result);
        }

        let mut expected_pubkey = request.verify_pubkey.clone();
        if let Some(template) = deferred_verify {
            let pki_hex = results
                .get(&Operation::Pki)
                .and_then(|r| match r.payload() {
                    Some(Payload::Pki(response)) => Some(response.pubkey.clone()),
                    _ => None,
                });
            match pki_hex {
                Some(pubkey) => {
                    expected_pubkey = Some(pubkey.clone());
                    let job = Job {
                        operation: Operation::VerifyPubKey,
                        template,
                        pubkey: Some(pubkey),
                    };
                    raw.extend(spawn_all(vec![job], handle, request, http, cancel).await);
                }
                None => {
                    let pki_cancelled = results
                        .get(&Operation::Pki)
                        .and_then(|r| r.error())
                        .is_some_and(|e| *e == PaymailError::Cancelled);
                    let outcome = if pki_cancelled || cancel.is_cancelled() {
                        Outcome::Failed(PaymailError::Cancelled)
                    } else {
                        Outcome::Skipped(SkipReason::MissingInput(
                            "no public key given and no PKI key available".into(),
                        ))
                    };
                    results.insert(
                        Operation::VerifyPubKey,
                        CapabilityResult::new(Operation::VerifyPubKey, outcome),
                    );
                }
            }
        }

        let ctx = base_ctx
            .with_pki_key(pki_key)
            .with_expected_pubkey(expected_pubkey);
        for (operation, result) in raw {
            results.insert(operation, finish(operation, result, &ctx));
        }
        results
    }

    fn plan(
        &self,
        operation: Operation,
        target: &Target,
        document: &CapabilityDocument,
        request: &CapabilityRequest,
    ) -> Plan {
        let options = &self.options;
        if operation == Operation::Pki && options.skip_pki {
            return Plan::Done(Outcome::Skipped(SkipReason::Option("skip_pki".into())));
        }
        if operation == Operation::PublicProfile && options.skip_public_profile {
            return Plan::Done(Outcome::Skipped(SkipReason::Option(
                "skip_public_profile".into(),
            )));
        }

        match document.lookup(operation) {
            Capability::Unsupported => Plan::Done(Outcome::NotSupported),
            Capability::Flag(flag) => Plan::Done(Outcome::Flag(flag)),
            Capability::Endpoint(_) if operation == Operation::SenderValidation => {
                Plan::Done(Outcome::Failed(PaymailError::invalid_data(
                    operation.brfc_id(),
                    "expected a boolean flag",
                )))
            }
            Capability::Endpoint(_)
                if operation.requires_handle() && target.handle().is_none() =>
            {
                Plan::Done(Outcome::Skipped(SkipReason::BareDomain))
            }
            Capability::Endpoint(_)
                if operation == Operation::P2pPaymentDestination && request.p2p_satoshis.is_none() =>
            {
                Plan::Done(Outcome::Skipped(SkipReason::MissingInput("satoshis".into())))
            }
            Capability::Endpoint(template) => Plan::Invoke(template),
        }
    }
}

enum Plan {
    Done(Outcome),
    Invoke(String),
}

struct Job {
    operation: Operation,
    template: String,
    pubkey: Option<String>,
}

/// Run jobs concurrently, collecting the raw result of each.
async fn spawn_all(
    jobs: Vec<Job>,
    handle: &Handle,
    request: &CapabilityRequest,
    http: &HttpClient,
    cancel: &CancelToken,
) -> BTreeMap<Operation, Result<Payload>> {
    let mut pending: BTreeSet<Operation> = jobs.iter().map(|job| job.operation).collect();
    let mut set = JoinSet::new();

    for job in jobs {
        let http = http.clone();
        let handle = handle.clone();
        let sender = request.sender.clone();
        let satoshis = request.p2p_satoshis;
        let cancel = cancel.clone();
        set.spawn(async move {
            let params = InvokeParams {
                handle: &handle,
                sender: &sender,
                pubkey: job.pubkey.as_deref(),
                satoshis,
            };
            let result = cancel
                .run(invoke(&http, job.operation, &job.template, &params))
                .await;
            (job.operation, result)
        });
    }

    let mut raw = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((operation, result)) => {
                pending.remove(&operation);
                raw.insert(operation, result);
            }
            Err(e) => warn!(error = %e, "capability task did not complete"),
        }
    }
    for operation in pending {
        raw.insert(
            operation,
            Err(PaymailError::Internal(format!("{} task did not complete", operation))),
        );
    }
    raw
}

/// Validate a raw invocation result into a capability result.
fn finish(operation: Operation, raw: Result<Payload>, ctx: &ValidationContext) -> CapabilityResult {
    let payload = match raw {
        Ok(payload) => payload,
        Err(err) => {
            debug!(%operation, error = %err, "capability failed");
            return CapabilityResult::new(operation, Outcome::Failed(err));
        }
    };

    let mut scripts = Vec::new();
    let validation = match &payload {
        Payload::Pki(pki) => validate_pki(pki, ctx),
        Payload::PaymentDestination(destination) => {
            scripts.extend(inspect_script(&destination.output).ok());
            validate_destination(destination, ctx)
        }
        Payload::PublicProfile(profile) => validate_profile(profile, ctx),
        Payload::VerifyPubKey(verification) => validate_verification(verification, ctx),
        Payload::P2pDestination(destination) => {
            scripts.extend(
                destination
                    .outputs
                    .iter()
                    .filter_map(|output| inspect_script(&output.script).ok()),
            );
            validate_p2p_destination(destination, ctx)
        }
    };

    let ValidationOutcome {
        mut errors,
        mut warnings,
    } = validation;
    let outcome = if errors.is_empty() {
        Outcome::Success(payload)
    } else {
        let first = errors.remove(0);
        warnings.append(&mut errors);
        Outcome::Failed(first)
    };

    CapabilityResult {
        operation,
        outcome,
        warnings,
        scripts,
    }
}
