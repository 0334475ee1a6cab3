//! Integration tests for paymail resolution.
//!
//! Each test runs a full resolution against a wiremock server that plays
//! the paymail service of `example.com`.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use paymail_lib::dns::{EndpointSource, StaticSrvResolver};
use paymail_lib::invoke::Payload;
use paymail_lib::trace::{MemoryTraceSink, TraceKind};
use paymail_lib::validate::sign_message;
use paymail_lib::{
    CancelToken, CapabilityRequest, Domain, Operation, Outcome, PaymailClient, PaymailError,
    ResolveOptions, Scheme, SkipReason,
};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

// ============================================================
// Happy path
// ============================================================

#[tokio::test]
async fn test_full_resolution_mock() {
    let server = MockServer::start().await;
    let (secret, public) = test_keypair(7);
    let output = test_p2pkh_script(0);
    let signature = sign_message(&secret, &output).unwrap();

    mount_document(&server, full_document(&server)).await;
    mount_pki(&server, &public).await;
    mount_destination(&server, &output, Some(signature)).await;
    mount_profile(&server).await;
    mount_verify(&server, &pubkey_hex(&public), true).await;

    let client = client(&server, options());
    let result = client
        .resolve(HANDLE, &CapabilityRequest::default())
        .await
        .unwrap();

    assert_eq!(result.endpoint.source, EndpointSource::Srv);
    assert!(result.document_validation.is_valid());
    assert!(!result.insecure);
    assert!(result.errors().is_empty(), "{:?}", result.errors());

    match result.get(Operation::Pki).and_then(|r| r.payload()) {
        Some(Payload::Pki(pki)) => assert_eq!(pki.pubkey, pubkey_hex(&public)),
        other => panic!("unexpected PKI result: {:?}", other),
    }

    let destination = result.get(Operation::PaymentDestination).unwrap();
    assert!(destination.warnings.is_empty(), "{:?}", destination.warnings);
    assert_eq!(
        destination.scripts[0].address.as_deref(),
        Some("1111111111111111111114oLvT2")
    );

    match result.get(Operation::PublicProfile).and_then(|r| r.payload()) {
        Some(Payload::PublicProfile(profile)) => assert_eq!(profile.name.as_deref(), Some("Alice")),
        other => panic!("unexpected profile result: {:?}", other),
    }

    // Verification ran with the PKI key
    match result.get(Operation::VerifyPubKey).and_then(|r| r.payload()) {
        Some(Payload::VerifyPubKey(verify)) => assert!(verify.matches),
        other => panic!("unexpected verification result: {:?}", other),
    }

    assert_eq!(
        result.get(Operation::SenderValidation).unwrap().outcome,
        Outcome::Flag(false)
    );
}

#[tokio::test]
async fn test_sender_handle_defaults_to_target_mock() {
    let server = MockServer::start().await;
    let document = json!({
        "bsvalias": "1.0",
        "capabilities": {
            "paymentDestination": format!("{}/api/paymentDestination/{{alias}}@{{domain.tld}}", server.uri())
        }
    });
    mount_document(&server, document).await;

    Mock::given(method("POST"))
        .and(path("/api/paymentDestination/alice@example.com"))
        .and(body_partial_json(json!({ "senderHandle": HANDLE })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": test_p2pkh_script(0) })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, options())
        .resolve(
            HANDLE,
            &CapabilityRequest::new([Operation::PaymentDestination]),
        )
        .await
        .unwrap();

    let destination = result.get(Operation::PaymentDestination).unwrap();
    assert!(destination.payload().is_some(), "{:?}", destination.outcome);
}

#[tokio::test]
async fn test_repeated_resolution_is_stable_mock() {
    let server = MockServer::start().await;
    let (_, public) = test_keypair(3);
    mount_document(&server, full_document(&server)).await;
    mount_pki(&server, &public).await;
    mount_profile(&server).await;

    let client = client(&server, options());
    let request = CapabilityRequest::new([Operation::Pki, Operation::PublicProfile]);
    let first = client.resolve(HANDLE, &request).await.unwrap();
    let second = client.resolve(HANDLE, &request).await.unwrap();

    assert_eq!(first.results, second.results);
    assert_eq!(first.capabilities, second.capabilities);
}

// ============================================================
// Discovery
// ============================================================

#[tokio::test]
async fn test_missing_srv_falls_back_to_domain() {
    let client = PaymailClient::with_resolver(ResolveOptions::default(), StaticSrvResolver::new());
    let discovery = client
        .discover(&Domain::parse("example.com").unwrap())
        .await
        .unwrap();

    assert_eq!(discovery.endpoint.source, EndpointSource::Fallback);
    assert_eq!(discovery.endpoint.base_url(), "https://example.com:443");
    assert!(discovery.record.is_none());
}

#[tokio::test]
async fn test_srv_values_are_checked_mock() {
    let server = MockServer::start().await;
    mount_document(&server, json!({ "bsvalias": "1.0", "capabilities": {} })).await;

    let result = client(&server, options())
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap();

    // The mock listens on a random port instead of 443
    let dns = result.dns_validation.expect("SRV record was validated");
    assert!(dns.is_valid());
    assert!(dns
        .warnings
        .iter()
        .any(|w| matches!(w, PaymailError::InvalidData { field, .. } if field == "srv.port")));
}

// ============================================================
// Capability document
// ============================================================

#[tokio::test]
async fn test_unadvertised_capability_is_not_supported_mock() {
    let server = MockServer::start().await;
    let (_, public) = test_keypair(2);
    let document = json!({
        "bsvalias": "1.0",
        "capabilities": {
            "pki": format!("{}{}/id/{{alias}}@{{domain.tld}}", server.uri(), API)
        }
    });
    mount_document(&server, document).await;
    mount_pki(&server, &public).await;

    let result = client(&server, options())
        .resolve(HANDLE, &CapabilityRequest::default())
        .await
        .unwrap();

    assert!(result.get(Operation::Pki).unwrap().payload().is_some());
    assert_eq!(
        result.get(Operation::PaymentDestination).unwrap().outcome,
        Outcome::NotSupported
    );
    assert_eq!(
        result.get(Operation::PublicProfile).unwrap().outcome,
        Outcome::NotSupported
    );
    assert_eq!(
        result.get(Operation::SenderValidation).unwrap().outcome,
        Outcome::NotSupported
    );
}

#[tokio::test]
async fn test_malformed_document_stops_resolution_mock() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/bsvalias"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/id/{}", API, HANDLE)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server, options())
        .resolve(HANDLE, &CapabilityRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PaymailError::CapabilityParse(_)), "{:?}", err);
}

#[tokio::test]
async fn test_oversized_document_is_rejected_mock() {
    let server = MockServer::start().await;
    let padding = " ".repeat(2 * 1024 * 1024);
    Mock::given(method("GET"))
        .and(path("/.well-known/bsvalias"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"bsvalias":"1.0","capabilities":{{}}}}{}"#,
            padding
        )))
        .mount(&server)
        .await;

    let err = client(&server, options())
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, PaymailError::InvalidData { ref field, .. } if field == "body"),
        "{:?}",
        err
    );

    // A larger cap accepts the same document
    let result = client(&server, options().with_max_body_bytes(4 * 1024 * 1024))
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap();
    assert_eq!(result.capabilities.version, "1.0");
}

#[tokio::test]
async fn test_flag_capability_is_not_invoked_mock() {
    let server = MockServer::start().await;
    mount_document(
        &server,
        json!({ "bsvalias": "1.0", "capabilities": { "pki": true } }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/id/{}", API, HANDLE)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = client(&server, options())
        .resolve(HANDLE, &CapabilityRequest::new([Operation::Pki]))
        .await
        .unwrap();

    assert_eq!(result.get(Operation::Pki).unwrap().outcome, Outcome::Flag(true));
}

#[tokio::test]
async fn test_bare_domain_skips_handle_operations_mock() {
    let server = MockServer::start().await;
    mount_document(&server, full_document(&server)).await;

    let result = client(&server, options())
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap();

    assert!(result.target.handle().is_none());
    assert_eq!(
        result.get(Operation::Pki).unwrap().outcome,
        Outcome::Skipped(SkipReason::BareDomain)
    );
    assert_eq!(
        result.get(Operation::SenderValidation).unwrap().outcome,
        Outcome::Flag(false)
    );
    assert!(result.capabilities.supports(Operation::PublicProfile));
}

#[tokio::test]
async fn test_strict_brfc_reports_errors_mock() {
    let server = MockServer::start().await;
    mount_document(
        &server,
        json!({
            "bsvalias": "1.0",
            "capabilities": { "notABrfc": "https://example.com/x" }
        }),
    )
    .await;

    let lenient = client(&server, options())
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap();
    let lenient = lenient.brfc_validation.unwrap();
    assert!(lenient.is_valid());
    assert_eq!(lenient.warnings.len(), 1);

    let strict = client(&server, options().with_strict_brfc(true))
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap();
    let strict = strict.brfc_validation.unwrap();
    assert!(matches!(strict.errors[0], PaymailError::Brfc { .. }));
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn test_server_error_keeps_body_mock() {
    let server = MockServer::start().await;
    let (_, public) = test_keypair(5);
    mount_document(&server, full_document(&server)).await;
    mount_pki(&server, &public).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/public-profile/{}", API, HANDLE)))
        .respond_with(ResponseTemplate::new(500).set_body_string("profile store down"))
        .mount(&server)
        .await;

    let result = client(&server, options())
        .resolve(
            HANDLE,
            &CapabilityRequest::new([Operation::Pki, Operation::PublicProfile]),
        )
        .await
        .unwrap();

    // One failure does not hide the other operation
    assert!(result.get(Operation::Pki).unwrap().payload().is_some());
    match result.get(Operation::PublicProfile).and_then(|r| r.error()) {
        Some(err @ PaymailError::CapabilityRequest { status, body, .. }) => {
            assert_eq!(*status, 500);
            assert_eq!(body, "profile store down");
            assert!(err.is_retryable());
        }
        other => panic!("unexpected profile result: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_pki_key_skips_verification_mock() {
    let server = MockServer::start().await;
    mount_document(&server, full_document(&server)).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/id/{}", API, HANDLE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "handle": HANDLE,
            "pubkey": "04deadbeef"
        })))
        .mount(&server)
        .await;

    let result = client(&server, options())
        .resolve(
            HANDLE,
            &CapabilityRequest::new([Operation::Pki, Operation::VerifyPubKey]),
        )
        .await
        .unwrap();

    assert!(matches!(
        result.get(Operation::Pki).and_then(|r| r.error()),
        Some(PaymailError::InvalidKeyFormat(_))
    ));
    assert!(matches!(
        result.get(Operation::VerifyPubKey).unwrap().outcome,
        Outcome::Skipped(SkipReason::MissingInput(_))
    ));
}

#[tokio::test]
async fn test_signature_mismatch_is_a_warning_mock() {
    let server = MockServer::start().await;
    let (_, public) = test_keypair(8);
    let (other, _) = test_keypair(9);
    let output = test_p2pkh_script(0);

    mount_document(&server, full_document(&server)).await;
    mount_pki(&server, &public).await;
    mount_destination(&server, &output, Some(sign_message(&other, &output).unwrap())).await;

    let result = client(&server, options())
        .resolve(
            HANDLE,
            &CapabilityRequest::new([Operation::Pki, Operation::PaymentDestination]),
        )
        .await
        .unwrap();

    let destination = result.get(Operation::PaymentDestination).unwrap();
    assert!(destination.payload().is_some());
    assert!(matches!(
        destination.warnings.as_slice(),
        [PaymailError::SignatureMismatch(_)]
    ));
}

#[tokio::test]
async fn test_https_against_plain_http_is_unreachable_mock() {
    let server = MockServer::start().await;
    mount_document(&server, full_document(&server)).await;

    let err = client(&server, options().with_scheme(Scheme::Https))
        .resolve(HANDLE, &CapabilityRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PaymailError::Unreachable { .. }), "{:?}", err);
    assert!(err.is_network());
}

#[tokio::test]
async fn test_insecure_flag_is_reported_mock() {
    let server = MockServer::start().await;
    mount_document(&server, json!({ "bsvalias": "1.0", "capabilities": {} })).await;

    let result = client(&server, options().with_skip_ssl_check(true))
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap();

    assert!(result.insecure);
}

// ============================================================
// Cancellation
// ============================================================

#[tokio::test]
async fn test_cancel_stops_slow_capability_mock() {
    let server = MockServer::start().await;
    let (_, public) = test_keypair(4);
    mount_document(&server, full_document(&server)).await;
    mount_pki(&server, &public).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/public-profile/{}", API, HANDLE)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "name": "Alice" }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancelToken::new();
    cancel.cancel_after(Duration::from_millis(300));

    let started = Instant::now();
    let result = client(&server, options().with_timeout(60))
        .resolve_with_cancel(
            HANDLE,
            &CapabilityRequest::new([Operation::Pki, Operation::PublicProfile]),
            &cancel,
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(result.get(Operation::Pki).unwrap().payload().is_some());
    assert_eq!(
        result.get(Operation::PublicProfile).and_then(|r| r.error()),
        Some(&PaymailError::Cancelled)
    );
}

#[tokio::test]
async fn test_cancelled_pki_cancels_deferred_verification_mock() {
    let server = MockServer::start().await;
    let (_, public) = test_keypair(10);
    mount_document(&server, full_document(&server)).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/id/{}", API, HANDLE)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "handle": HANDLE, "pubkey": pubkey_hex(&public) }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancelToken::new();
    cancel.cancel_after(Duration::from_millis(300));

    let sink = Arc::new(MemoryTraceSink::new());
    let started = Instant::now();
    let result = traced_client(&server, options().with_timeout(60), sink.clone())
        .resolve_with_cancel(
            HANDLE,
            &CapabilityRequest::new([Operation::Pki, Operation::VerifyPubKey]),
            &cancel,
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        result.get(Operation::Pki).and_then(|r| r.error()),
        Some(&PaymailError::Cancelled)
    );
    assert_eq!(
        result.get(Operation::VerifyPubKey).unwrap().outcome,
        Outcome::Failed(PaymailError::Cancelled)
    );

    // The abandoned PKI request still leaves a trace entry
    let entries = sink.entries();
    let pki = entries
        .iter()
        .find(|e| e.target.ends_with(&format!("/id/{}", HANDLE)))
        .expect("PKI request was traced");
    assert_eq!(pki.error.as_deref(), Some(paymail_lib::trace::CANCELLED));
    assert!(pki.status.is_none());
}

#[tokio::test]
async fn test_cancel_before_start_returns_error() {
    let cancel = CancelToken::new();
    cancel.cancel();

    let client = PaymailClient::with_resolver(ResolveOptions::default(), StaticSrvResolver::new());
    let err = client
        .resolve_with_cancel(HANDLE, &CapabilityRequest::default(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, PaymailError::Cancelled);
}

// ============================================================
// P2P and traces
// ============================================================

#[tokio::test]
async fn test_p2p_destination_mock() {
    let server = MockServer::start().await;
    mount_document(&server, full_document(&server)).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/p2p-payment-destination/{}", API, HANDLE)))
        .and(body_partial_json(json!({ "satoshis": 1500 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "outputs": [{ "script": test_p2pkh_script(0), "satoshis": 1500 }],
            "reference": "ref-42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CapabilityRequest::new([]).with_p2p_satoshis(1500);
    let result = client(&server, options()).resolve(HANDLE, &request).await.unwrap();

    let p2p = result.get(Operation::P2pPaymentDestination).unwrap();
    match p2p.payload() {
        Some(Payload::P2pDestination(destination)) => {
            assert_eq!(destination.reference, "ref-42");
            assert_eq!(destination.outputs[0].satoshis, 1500);
        }
        other => panic!("unexpected P2P result: {:?}", other),
    }
    assert_eq!(p2p.scripts.len(), 1);
}

#[tokio::test]
async fn test_traces_follow_issue_order_mock() {
    let server = MockServer::start().await;
    let (_, public) = test_keypair(6);
    mount_document(&server, full_document(&server)).await;
    mount_pki(&server, &public).await;

    let sink = Arc::new(MemoryTraceSink::new());
    let client = traced_client(&server, options(), sink.clone());
    client
        .resolve(HANDLE, &CapabilityRequest::new([Operation::Pki]))
        .await
        .unwrap();

    let entries = sink.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].kind, TraceKind::Dns);
    assert_eq!(entries[0].target, SRV_NAME);
    assert!(entries[1].target.ends_with("/.well-known/bsvalias"));
    assert_eq!(entries[1].status, Some(200));
    assert!(entries[2].target.ends_with(&format!("/id/{}", HANDLE)));
    assert!(entries.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[tokio::test]
async fn test_tracing_can_be_disabled_mock() {
    let server = MockServer::start().await;
    mount_document(&server, json!({ "bsvalias": "1.0", "capabilities": {} })).await;

    let sink = Arc::new(MemoryTraceSink::new());
    traced_client(&server, options().with_skip_tracing(true), sink.clone())
        .resolve("example.com", &CapabilityRequest::default())
        .await
        .unwrap();

    assert!(sink.is_empty());
}
