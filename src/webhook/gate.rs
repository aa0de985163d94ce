//! Origin gate: the cheap admit/reject decision made before any
//! cryptographic work is spent on a delivery.
//!
//! Two independent checks, both of which must pass:
//! - the source address falls inside the processor's published CIDR ranges
//! - the per-source request rate stays within quota
//!
//! The rate counter is only touched for trusted sources, so untrusted
//! traffic cannot grow the keyed state.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::HeaderMap;
use governor::{DefaultKeyedRateLimiter, Quota};
use ipnet::IpNet;

/// Shrink the keyed limiter state every N checks to bound memory.
const SHRINK_INTERVAL: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    Trusted,
    Untrusted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    Admit,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UntrustedOrigin,
    RateLimited,
}

pub trait IpClassifier: Send + Sync {
    fn classify(&self, source: IpAddr) -> Trust;
}

/// Atomically reads and increments the counter for `source`. Slight
/// over- or under-counting across instances is acceptable.
pub trait RateLimiter: Send + Sync {
    fn check_rate(&self, source: IpAddr) -> RateVerdict;
}

#[derive(Clone)]
pub struct OriginGate {
    classifier: Arc<dyn IpClassifier>,
    limiter: Arc<dyn RateLimiter>,
}

impl OriginGate {
    pub fn new(classifier: Arc<dyn IpClassifier>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            classifier,
            limiter,
        }
    }

    pub fn admit(&self, source: IpAddr) -> GateDecision {
        let source = source.to_canonical();
        if self.classifier.classify(source) == Trust::Untrusted {
            return GateDecision::Reject(RejectReason::UntrustedOrigin);
        }
        match self.limiter.check_rate(source) {
            RateVerdict::Admit => GateDecision::Admit,
            RateVerdict::Reject => GateDecision::Reject(RejectReason::RateLimited),
        }
    }
}

/// Static allowlist that can be swapped wholesale when the processor
/// republishes its ranges.
pub struct CidrAllowlist {
    ranges: RwLock<Arc<[IpNet]>>,
}

impl CidrAllowlist {
    pub fn new(ranges: Vec<IpNet>) -> Self {
        Self {
            ranges: RwLock::new(ranges.into()),
        }
    }

    pub fn replace(&self, ranges: Vec<IpNet>) {
        *self.ranges.write().unwrap_or_else(PoisonError::into_inner) = ranges.into();
    }

    fn snapshot(&self) -> Arc<[IpNet]> {
        Arc::clone(&self.ranges.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl IpClassifier for CidrAllowlist {
    fn classify(&self, source: IpAddr) -> Trust {
        let source = source.to_canonical();
        if self.snapshot().iter().any(|net| net.contains(&source)) {
            Trust::Trusted
        } else {
            Trust::Untrusted
        }
    }
}

/// Process-local GCRA limiter keyed by source address.
pub struct GovernorRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    checks: AtomicU64,
}

impl GovernorRateLimiter {
    pub fn per_minute(requests_per_minute: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(rate).allow_burst(burst);

        Self {
            limiter: governor::RateLimiter::keyed(quota),
            checks: AtomicU64::new(0),
        }
    }
}

impl RateLimiter for GovernorRateLimiter {
    fn check_rate(&self, source: IpAddr) -> RateVerdict {
        let count = self.checks.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % SHRINK_INTERVAL == 0 {
            self.limiter.retain_recent();
        }

        match self.limiter.check_key(&source) {
            Ok(_) => RateVerdict::Admit,
            Err(_) => RateVerdict::Reject,
        }
    }
}

/// The address the gate should judge. With `trust_forwarded_for` the
/// right-most parseable `X-Forwarded-For` entry wins, since that hop was
/// appended by our own proxy.
pub fn source_address(peer: SocketAddr, headers: &HeaderMap, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for
        && let Some(forwarded) = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter_map(|part| part.trim().parse::<IpAddr>().ok())
            .last()
    {
        return forwarded.to_canonical();
    }
    peer.ip().to_canonical()
}
