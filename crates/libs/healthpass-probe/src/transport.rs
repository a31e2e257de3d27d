use async_trait::async_trait;
use healthpass_auth::MetadataEntry;

use crate::TransportError;

/// Connection layer used for the remote health-check call.
///
/// A channel is opened for exactly one call and always closed afterwards,
/// whether the call succeeded or not.
#[async_trait]
pub trait Transport: Send + Sync {
    type Channel: Send;

    /// Connects to `target`; `insecure` selects plaintext instead of TLS.
    async fn open(&self, target: &str, insecure: bool) -> Result<Self::Channel, TransportError>;

    /// Sends the encoded request with `metadata` and returns the raw response
    /// message bytes.
    async fn call(
        &self,
        channel: &mut Self::Channel,
        request: Vec<u8>,
        metadata: &[MetadataEntry],
    ) -> Result<Vec<u8>, TransportError>;

    async fn close(&self, channel: Self::Channel);
}
