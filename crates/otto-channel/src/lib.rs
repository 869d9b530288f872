//! Outbound channel delivery for otto.
//!
//! Applies per-payload request shaping and response classification against a
//! Graph-style cloud messaging API. Invalid-credential failures are
//! distinguished from other failure classes so the delivery engine can run
//! its one-shot platform-credential fallback.

mod outbound;

pub use outbound::{
    ChannelCredentials, ChannelError, ChannelReceipt, ChannelTransport, CloudApiTransport,
    OutboundPayload,
};

/// Default API base for the cloud messaging provider.
pub const DEFAULT_CHANNEL_API_BASE: &str = "https://graph.facebook.com/v21.0";
