//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use paymail_lib::prelude::*;
//! ```

// Entry point
pub use crate::session::{
    CapabilityRequest, CapabilityResult, Outcome, PaymailClient, ResolutionResult, SkipReason,
};
pub use crate::cancel::CancelToken;
pub use crate::config::{ResolveOptions, Scheme};

// Inputs
pub use crate::handle::{parse_target, Domain, Handle, Target};
pub use crate::invoke::{Payload, SenderInfo};

// Error handling
pub use crate::errors::{PaymailError, PaymailErrorCode};
pub use crate::Result;

// Discovery and capabilities
pub use crate::capabilities::{Capability, CapabilityDocument, Operation};
pub use crate::dns::{
    EndpointSource, HickorySrvResolver, ServiceEndpoint, SrvRecord, SrvResolver, StaticSrvResolver,
};

// Traces
pub use crate::trace::{MemoryTraceSink, TraceEntry, TraceKind, TraceSink};
