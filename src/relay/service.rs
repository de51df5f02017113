//! Relay service abstraction layer.
//!
//! The HTTP boundary talks to the relay through [`RelayService`] so handlers
//! can be exercised against a mock without touching the network.

use super::executor::{execute_with_policy, RedirectPolicy};
use super::types::{NormalizedDescriptor, ResponseEnvelope};
use crate::error::RelayError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type RelayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ResponseEnvelope, RelayError>> + Send + 'a>>;

/// Trait for services that relay a normalized descriptor upstream.
pub trait RelayService: Send + Sync {
    /// Performs exactly one relayed call bounded by `timeout`.
    fn relay(&self, descriptor: NormalizedDescriptor, timeout: Duration) -> RelayFuture<'_>;
}

/// Default implementation backed by the hyper executor.
#[derive(Debug, Default, Clone)]
pub struct HttpRelayService {
    policy: RedirectPolicy,
}

impl HttpRelayService {
    pub fn new(policy: RedirectPolicy) -> Self {
        Self { policy }
    }

    pub fn arc(policy: RedirectPolicy) -> Arc<Self> {
        Arc::new(Self::new(policy))
    }

    pub fn policy(&self) -> RedirectPolicy {
        self.policy
    }
}

impl RelayService for HttpRelayService {
    fn relay(&self, descriptor: NormalizedDescriptor, timeout: Duration) -> RelayFuture<'_> {
        Box::pin(execute_with_policy(descriptor, timeout, self.policy))
    }
}
