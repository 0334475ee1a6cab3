//! Assertion helpers for resolution results.

use crate::capabilities::Operation;
use crate::invoke::Payload;
use crate::session::{Outcome, ResolutionResult, SkipReason};
use crate::PaymailError;

fn outcome(result: &ResolutionResult, operation: Operation) -> &Outcome {
    match result.get(operation) {
        Some(capability) => &capability.outcome,
        None => panic!("{} was not part of the resolution", operation),
    }
}

/// Assert that `operation` succeeded and return its payload.
pub fn assert_success(result: &ResolutionResult, operation: Operation) -> &Payload {
    match outcome(result, operation) {
        Outcome::Success(payload) => payload,
        other => panic!("expected {} to succeed, got {:?}", operation, other),
    }
}

/// Assert that `operation` failed and return the error.
pub fn assert_failed(result: &ResolutionResult, operation: Operation) -> &PaymailError {
    match outcome(result, operation) {
        Outcome::Failed(err) => err,
        other => panic!("expected {} to fail, got {:?}", operation, other),
    }
}

/// Assert that `operation` is not supported by the service.
pub fn assert_not_supported(result: &ResolutionResult, operation: Operation) {
    match outcome(result, operation) {
        Outcome::NotSupported => {}
        other => panic!("expected {} to be unsupported, got {:?}", operation, other),
    }
}

/// Assert that `operation` was skipped and return the reason.
pub fn assert_skipped(result: &ResolutionResult, operation: Operation) -> &SkipReason {
    match outcome(result, operation) {
        Outcome::Skipped(reason) => reason,
        other => panic!("expected {} to be skipped, got {:?}", operation, other),
    }
}
