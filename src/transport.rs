//! # External Collaborator Seams
//!
//! The control channel never owns its surroundings: device metadata comes
//! from the core registry, frames leave through the inter-adapter transport,
//! and responses land on channels owned by the management state machines.
//! All three are passed in at construction time as narrow interfaces, so the
//! channel carries no back-references into the device handler.
//!
//! | Seam | Purpose | Production Impl |
//! |------|---------|-----------------|
//! | [`DeviceProvider`] | Confirm device metadata before each send | core proxy |
//! | [`OmciTransport`] | Deliver frames to the OLT-side proxy | inter-adapter RPC |
//! | [`FsmChannels`] | Route responses to the owning FSMs | MIB-upload / MIB-download FSMs |
//!
//! The traits return boxed futures so they stay object safe; the channel
//! stores them as `Arc<dyn ...>`.

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::Message;

/// Device metadata resolved from the core registry
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub device_type: String,
}

/// Resolves device metadata prior to each transmit.
pub trait DeviceProvider: Send + Sync {
    /// Look up the child device below the given parent.
    fn get_device<'a>(&'a self, parent_id: &'a str, child_id: &'a str)
        -> BoxFuture<'a, Result<Device>>;
}

/// An OMCI request wrapped for the inter-adapter transport
#[derive(Debug, Clone)]
pub struct OmciRequest {
    /// Serialized OMCI frame
    pub message: Bytes,
    /// Adapter type of the sender
    pub from_adapter: String,
    /// Adapter type of the OLT-side proxy
    pub to_adapter: String,
    /// Target ONU device
    pub to_device_id: String,
    /// Proxy device carrying the maintenance channel
    pub proxy_device_id: String,
}

/// Hands OMCI request envelopes to the OLT-side proxy.
pub trait OmciTransport: Send + Sync {
    fn send_omci_request(&self, request: OmciRequest) -> BoxFuture<'_, Result<()>>;
}

/// Identity of the ONU this channel manages, fixed at construction
#[derive(Debug, Clone)]
pub struct OnuEndpoint {
    /// The ONU (child) device id
    pub device_id: String,
    /// The OLT handler (parent) device id
    pub parent_id: String,
    /// Adapter type of this ONU adapter (`from` on the wire)
    pub adapter_type: String,
    /// Adapter type of the OLT proxy (`to` on the wire)
    pub proxy_adapter_type: String,
    /// Device id of the OLT proxy
    pub proxy_device_id: String,
}

/// Response channels of the management state machines
#[derive(Debug, Clone)]
pub struct FsmChannels {
    /// MIB-upload FSM channel; also receives generic get responses
    pub mib_upload: mpsc::Sender<Message>,
    /// MIB-download FSM channel; receives the download catalog responses
    pub mib_download: mpsc::Sender<Message>,
}
