//! Transport abstraction
//!
//! A [`Transport`] opens one duplex link to the telemetry source. The link is
//! a pair of channels; the transport signals a dropped connection by closing
//! the inbound channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::ConnectionResult;
use super::frame::Frame;

/// An established duplex link
pub struct TransportLink {
    /// Frames to send to the source
    pub outbound: mpsc::UnboundedSender<Frame>,
    /// Frames received from the source; `None` on `recv` means the link dropped
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

/// Something that can open links to the telemetry source
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a new link
    async fn open(&self) -> ConnectionResult<TransportLink>;

    /// Human-readable endpoint, for logs
    fn endpoint(&self) -> &str;
}
