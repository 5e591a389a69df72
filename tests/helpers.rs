//! Shared mock collaborators for the integration tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use omci_cc::{
    ChannelConfig, Device, DeviceProvider, Error, FsmChannels, Message, OmciChannel, OmciRequest,
    OmciTransport, OnuEndpoint, OnuMessageSink, Result,
};

/// Device provider that can be switched into a failing mode
pub struct StaticDevices {
    pub fail: AtomicBool,
}

impl StaticDevices {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }
}

impl DeviceProvider for StaticDevices {
    fn get_device<'a>(
        &'a self,
        _parent_id: &'a str,
        child_id: &'a str,
    ) -> BoxFuture<'a, Result<Device>> {
        Box::pin(async move {
            if self.fail.load(Ordering::Relaxed) {
                return Err(Error::DeviceLookup(format!("device {} not found", child_id)));
            }
            Ok(Device {
                id: child_id.to_string(),
                device_type: "brcm_openomci_onu".to_string(),
            })
        })
    }
}

/// Transport that forwards every request to the test body and can be
/// switched into a failing mode
pub struct RecordingTransport {
    sent_tx: mpsc::UnboundedSender<OmciRequest>,
    pub fail: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OmciRequest>) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (
            Self {
                sent_tx,
                fail: AtomicBool::new(false),
            },
            sent_rx,
        )
    }
}

impl OmciTransport for RecordingTransport {
    fn send_omci_request(&self, request: OmciRequest) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail.load(Ordering::Relaxed) {
                return Err(Error::Transport("inter-adapter send refused".to_string()));
            }
            let _ = self.sent_tx.send(request);
            Ok(())
        })
    }
}

/// Sink that counts every routed notification and reports it unsupported,
/// matching the current autonomous-message contract
#[derive(Default)]
pub struct CountingSink {
    pub alarms: AtomicU32,
    pub attribute_value_changes: AtomicU32,
    pub test_results: AtomicU32,
}

impl OnuMessageSink for CountingSink {
    fn alarm_notification(&self, _frame: &omci_cc::wire::OmciFrame) -> Result<()> {
        self.alarms.fetch_add(1, Ordering::Relaxed);
        Err(Error::UnsupportedMessage("alarm notification".to_string()))
    }

    fn attribute_value_change(&self, _frame: &omci_cc::wire::OmciFrame) -> Result<()> {
        self.attribute_value_changes.fetch_add(1, Ordering::Relaxed);
        Err(Error::UnsupportedMessage(
            "attribute value change".to_string(),
        ))
    }

    fn test_result(&self, _frame: &omci_cc::wire::OmciFrame) -> Result<()> {
        self.test_results.fetch_add(1, Ordering::Relaxed);
        Err(Error::UnsupportedMessage("test result".to_string()))
    }
}

/// A channel wired to mock collaborators, with every observable end exposed
pub struct Harness {
    pub channel: OmciChannel,
    pub devices: Arc<StaticDevices>,
    pub transport: Arc<RecordingTransport>,
    pub sink: Arc<CountingSink>,
    pub sent_rx: mpsc::UnboundedReceiver<OmciRequest>,
    pub upload_rx: mpsc::Receiver<Message>,
    pub download_rx: mpsc::Receiver<Message>,
}

pub fn harness() -> Harness {
    harness_with_config(ChannelConfig::default())
}

pub fn harness_with_config(config: ChannelConfig) -> Harness {
    let devices = Arc::new(StaticDevices::new());
    let (transport, sent_rx) = RecordingTransport::new();
    let transport = Arc::new(transport);
    let sink = Arc::new(CountingSink::default());
    let (upload_tx, upload_rx) = mpsc::channel(16);
    let (download_tx, download_rx) = mpsc::channel(16);

    let channel = OmciChannel::new(
        OnuEndpoint {
            device_id: "onu-1".to_string(),
            parent_id: "olt-1".to_string(),
            adapter_type: "brcm_openomci_onu".to_string(),
            proxy_adapter_type: "openolt".to_string(),
            proxy_device_id: "olt-proxy-1".to_string(),
        },
        config,
        devices.clone(),
        transport.clone(),
        sink.clone(),
        FsmChannels {
            mib_upload: upload_tx,
            mib_download: download_tx,
        },
    );

    Harness {
        channel,
        devices,
        transport,
        sink,
        sent_rx,
        upload_rx,
        download_rx,
    }
}
