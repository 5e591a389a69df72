//! # omci-cc
//!
//! An async OMCI (ITU-T G.988) control channel for ONU adapters.
//!
//! OMCI is a request/response management protocol carried as 44-byte
//! baseline frames over the GPON maintenance channel. Each outstanding
//! request is identified by a 16-bit Transaction Correlation Identifier;
//! autonomous ONU notifications arrive with identifier 0. This crate
//! provides the per-ONU channel that builds and serializes request frames,
//! correlates responses back to their requesters, and routes autonomous
//! notifications.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use omci_cc::{ChannelConfig, FsmChannels, OmciChannel, OnuEndpoint, UnhandledOnuSink};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example(devices: Arc<dyn omci_cc::DeviceProvider>,
//! #                  transport: Arc<dyn omci_cc::OmciTransport>) {
//! let (upload_tx, mut upload_rx) = mpsc::channel(16);
//! let (download_tx, _download_rx) = mpsc::channel(16);
//!
//! let channel = OmciChannel::new(
//!     OnuEndpoint {
//!         device_id: "onu-1".into(),
//!         parent_id: "olt-1".into(),
//!         adapter_type: "brcm_openomci_onu".into(),
//!         proxy_adapter_type: "openolt".into(),
//!         proxy_device_id: "olt-proxy-1".into(),
//!     },
//!     ChannelConfig::default(),
//!     devices,
//!     transport,
//!     Arc::new(UnhandledOnuSink),
//!     FsmChannels { mib_upload: upload_tx, mib_download: download_tx },
//! );
//!
//! // Kick off MIB synchronization
//! channel.send_mib_reset(channel.default_timeout(), true).await.unwrap();
//!
//! // The MIB-upload FSM consumes correlated responses from its channel
//! let response = upload_rx.recv().await;
//! # }
//! ```
//!
//! Ingress bytes from the OLT proxy are handed to
//! [`OmciChannel::receive`], which repairs the baseline trailer where
//! needed, decodes the frame, and either completes a pending request or
//! routes the autonomous notification to the [`OnuMessageSink`].

pub mod channel;
pub mod config;
pub mod error;
pub mod me;
pub mod message;
pub mod requests;
pub mod sink;
pub mod transport;

/// Wire format parsing for OMCI baseline frames.
/// Exposed for testing and interoperability verification.
pub mod wire;

pub use channel::{
    omci_response_handler, CallbackEntry, CallbackPair, FrameCounters, OmciChannel,
    ResponseHandler, TransferDescriptor, UploadProgress, HIGH_TID_START, LOW_TID_START,
};
pub use config::{ChannelConfig, ChannelConfigBuilder, DEFAULT_OMCI_TIMEOUT};
pub use error::{Error, Result};
pub use me::{AttributeValue, AttributeValueMap, ClassId, ManagedEntity, ParamData};
pub use message::{Message, OmciMessage, TestMessageType};
pub use requests::{UniPort, UniPortType};
pub use sink::{OnuMessageSink, UnhandledOnuSink};
pub use transport::{
    Device, DeviceProvider, FsmChannels, OmciRequest, OmciTransport, OnuEndpoint,
};

pub mod prelude {
    pub use crate::{
        AttributeValue, AttributeValueMap, ChannelConfig, ClassId, Device, DeviceProvider, Error,
        FrameCounters, FsmChannels, ManagedEntity, Message, OmciChannel, OmciMessage, OmciRequest,
        OmciTransport, OnuEndpoint, OnuMessageSink, Result, TestMessageType, UniPort, UniPortType,
    };
}
