pub mod ack;
pub mod config;
pub mod gate;
pub mod parser;
pub mod pipeline;
pub mod signature;

pub use ack::{Ack, Rejection, RetryReason};
pub use config::{ConfigError, WebhookConfig, WebhookSecret, parse_cidrs};
pub use gate::{
    CidrAllowlist, GateDecision, GovernorRateLimiter, IpClassifier, OriginGate, RateLimiter,
    RateVerdict, RejectReason, Trust, source_address,
};
pub use parser::{InvalidEvent, ParseError, ParsedEvent, parse_event};
pub use pipeline::{Delivery, process_delivery, screen_origin};
pub use signature::{HmacSha256Verifier, SignatureEncoding, SignatureVerdict, SignatureVerifier};
