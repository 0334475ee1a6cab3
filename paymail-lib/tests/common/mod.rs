//! Shared helpers for paymail integration tests.
//!
//! Every test gets its own wiremock server standing in for the paymail
//! service of `example.com`; a static SRV record points discovery at it.

#![allow(dead_code)]

use std::sync::Arc;

use paymail_lib::dns::{SrvRecord, StaticSrvResolver};
use paymail_lib::test_utils::{CapabilityDocumentBuilder, TestFixtures};
use paymail_lib::trace::TraceSink;
use paymail_lib::{PaymailClient, ResolveOptions, Scheme};
use secp256k1::PublicKey;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub use paymail_lib::test_utils::{test_keypair, test_p2pkh_script};

pub const HANDLE: &str = TestFixtures::HANDLE;
pub const SRV_NAME: &str = "_bsvalias._tcp.example.com";
pub const API: &str = TestFixtures::API_PREFIX;

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn pubkey_hex(public: &PublicKey) -> String {
    hex::encode(public.serialize())
}

/// Options pointing plain HTTP at the mock.
pub fn options() -> ResolveOptions {
    init_tracing();
    ResolveOptions::default()
        .with_scheme(Scheme::Http)
        .with_timeout(5)
}

/// Static SRV source that points `example.com` at the mock server.
pub fn resolver(server: &MockServer) -> StaticSrvResolver {
    let addr = server.address();
    StaticSrvResolver::new().with_record(
        SRV_NAME,
        SrvRecord::new(addr.ip().to_string(), addr.port(), 10, 10),
    )
}

pub fn client(server: &MockServer, options: ResolveOptions) -> PaymailClient<StaticSrvResolver> {
    PaymailClient::with_resolver(options, resolver(server))
}

pub fn traced_client(
    server: &MockServer,
    options: ResolveOptions,
    sink: Arc<dyn TraceSink>,
) -> PaymailClient<StaticSrvResolver> {
    client(server, options).with_trace_sink(sink)
}

/// A discovery document advertising every endpoint capability under `server`.
pub fn full_document(server: &MockServer) -> Value {
    CapabilityDocumentBuilder::new(&server.uri())
        .with_pki()
        .with_payment_destination()
        .with_public_profile()
        .with_verify_pubkey()
        .with_p2p_destination()
        .with_sender_validation(false)
        .build()
}

pub async fn mount_document(server: &MockServer, document: Value) {
    Mock::given(method("GET"))
        .and(path("/.well-known/bsvalias"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

pub async fn mount_pki(server: &MockServer, public: &PublicKey) {
    Mock::given(method("GET"))
        .and(path(format!("{}/id/{}", API, HANDLE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bsvalias": "1.0",
            "handle": HANDLE,
            "pubkey": pubkey_hex(public)
        })))
        .mount(server)
        .await;
}

pub async fn mount_destination(server: &MockServer, output: &str, signature: Option<String>) {
    let mut body = json!({ "output": output });
    if let Some(signature) = signature {
        body["signature"] = Value::String(signature);
    }
    Mock::given(method("POST"))
        .and(path(format!("{}/address/{}", API, HANDLE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_profile(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{}/public-profile/{}", API, HANDLE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Alice",
            "avatar": "https://example.com/alice.png"
        })))
        .mount(server)
        .await;
}

pub async fn mount_verify(server: &MockServer, pubkey: &str, matches: bool) {
    Mock::given(method("GET"))
        .and(path(format!("{}/verify-pubkey/{}/{}", API, HANDLE, pubkey)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "handle": HANDLE,
            "pubkey": pubkey,
            "match": matches
        })))
        .mount(server)
        .await;
}
