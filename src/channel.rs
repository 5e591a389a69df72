//! # Control Channel Core
//!
//! [`OmciChannel`] is the per-ONU mediator between the management state
//! machines and the OLT-side proxy. It owns transaction-identifier
//! allocation, the outbound queue, the response-callback registry, and the
//! ingress classification path.
//!
//! ## Data Flow
//!
//! ```text
//! FSM calls a request builder
//!        │
//!        ▼
//! builder allocates a TCID, encodes the frame
//!        │
//!        ▼
//! send() registers {TCID → callback}, enqueues the descriptor
//!        │
//!        ▼
//! dispatcher task drains the queue → device lookup → transport
//!        │
//!        ▼
//! OLT proxy delivers the frame to the ONU, response comes back
//!        │
//!        ▼
//! receive() decodes, consumes the callback, spawns the handler
//!        │
//!        ▼
//! FSM's channel yields Message::Omci
//! ```
//!
//! ## Locking
//!
//! | State | Guard |
//! |-------|-------|
//! | low / high TID counters | one `std::sync::Mutex` each |
//! | TX queue | `tokio::sync::Mutex`, held for the whole drain |
//! | RX scheduler map | `std::sync::Mutex`, brief |
//! | counters | atomics |
//!
//! Holding the queue mutex across the transport send serializes
//! transmission per ONU, matching the OMCI window-size-1 assumption.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::message::{Message, OmciMessage};
use crate::sink::OnuMessageSink;
use crate::transport::{DeviceProvider, FsmChannels, OmciRequest, OmciTransport, OnuEndpoint};
use crate::wire::{self, OmciFrame, Operation};

/// First transaction identifier of the low-priority range [0x0001, 0x7FFF]
pub const LOW_TID_START: u16 = 0x0001;

/// First transaction identifier of the high-priority range [0x8000, 0xFFFF]
pub const HIGH_TID_START: u16 = 0x8000;

// ============================================================================
// CALLBACKS AND DESCRIPTORS
// ============================================================================

/// Handler invoked for each correlated response.
///
/// Given the decoded frame and its raw packet, the handler emits a typed
/// [`Message`] onto the response channel.
pub type ResponseHandler = Arc<
    dyn Fn(OmciFrame, Bytes, mpsc::Sender<Message>) -> BoxFuture<'static, Result<()>>
        + Send
        + Sync,
>;

/// Callback registered in the scheduler map under a transaction identifier
#[derive(Clone)]
pub struct CallbackEntry {
    pub response_tx: mpsc::Sender<Message>,
    pub handler: ResponseHandler,
}

/// Transaction identifier paired with its callback entry
#[derive(Clone)]
pub struct CallbackPair {
    pub key: u16,
    pub entry: CallbackEntry,
}

/// An outbound request awaiting dispatch. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct TransferDescriptor {
    pub frame: Bytes,
    /// Honored by the transport and the owning FSM, not enforced here
    pub timeout: Duration,
    pub retries: u32,
    pub high_priority: bool,
}

/// Snapshot of the channel's frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub tx_frames: u32,
    pub tx_onu_frames: u32,
    pub rx_frames: u32,
    pub rx_onu_frames: u32,
    pub rx_onu_discards: u32,
}

/// MIB upload progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadProgress {
    /// Command sequence number of the next MIB-upload-next request
    pub sequence_number: u16,
    /// Upload-next command count announced by the MIB-upload response;
    /// 0 until the response has been seen
    pub command_count: u16,
}

/// The shared response handler: wraps the decoded frame in a
/// [`Message::Omci`] envelope and forwards it on the response channel.
///
/// The send blocks until the owning FSM drains its channel; a dropped
/// channel yields [`Error::ChannelClosed`].
pub fn omci_response_handler() -> ResponseHandler {
    Arc::new(|frame, packet, response_tx| {
        Box::pin(async move {
            tracing::debug!(
                transaction_id = frame.header.transaction_id,
                message_type = ?frame.header.message_type,
                "forwarding OMCI response"
            );
            let message = Message::Omci(OmciMessage { frame, packet });
            response_tx
                .send(message)
                .await
                .map_err(|_| Error::ChannelClosed)
        })
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// CHANNEL
// ============================================================================

struct ChannelState {
    endpoint: OnuEndpoint,
    config: ChannelConfig,
    devices: Arc<dyn DeviceProvider>,
    transport: Arc<dyn OmciTransport>,
    sink: Arc<dyn OnuMessageSink>,
    fsm: FsmChannels,
    enabled: AtomicBool,
    tid: Mutex<u16>,
    hp_tid: Mutex<u16>,
    upload: Mutex<UploadProgress>,
    tx_queue: tokio::sync::Mutex<VecDeque<TransferDescriptor>>,
    rx_scheduler: Mutex<HashMap<u16, CallbackEntry>>,
    tx_frames: AtomicU32,
    tx_onu_frames: AtomicU32,
    rx_frames: AtomicU32,
    rx_onu_frames: AtomicU32,
    rx_onu_discards: AtomicU32,
}

/// Per-ONU OMCI control channel.
///
/// Cheap to clone; all clones share the same state. The channel is created
/// disabled and stays alive for the whole ONU session.
#[derive(Clone)]
pub struct OmciChannel {
    state: Arc<ChannelState>,
}

impl OmciChannel {
    pub fn new(
        endpoint: OnuEndpoint,
        config: ChannelConfig,
        devices: Arc<dyn DeviceProvider>,
        transport: Arc<dyn OmciTransport>,
        sink: Arc<dyn OnuMessageSink>,
        fsm: FsmChannels,
    ) -> Self {
        tracing::info!(device_id = %endpoint.device_id, "init OMCI control channel");
        Self {
            state: Arc::new(ChannelState {
                endpoint,
                config,
                devices,
                transport,
                sink,
                fsm,
                enabled: AtomicBool::new(false),
                tid: Mutex::new(LOW_TID_START),
                hp_tid: Mutex::new(HIGH_TID_START),
                upload: Mutex::new(UploadProgress::default()),
                tx_queue: tokio::sync::Mutex::new(VecDeque::new()),
                rx_scheduler: Mutex::new(HashMap::new()),
                tx_frames: AtomicU32::new(0),
                tx_onu_frames: AtomicU32::new(0),
                rx_frames: AtomicU32::new(0),
                rx_onu_frames: AtomicU32::new(0),
                rx_onu_discards: AtomicU32::new(0),
            }),
        }
    }

    /// The managed ONU device id
    pub fn device_id(&self) -> &str {
        &self.state.endpoint.device_id
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The configured per-request timeout, for callers that do not carry
    /// their own
    pub fn default_timeout(&self) -> Duration {
        self.state.config.default_timeout
    }

    pub(crate) fn mib_upload_channel(&self) -> mpsc::Sender<Message> {
        self.state.fsm.mib_upload.clone()
    }

    pub(crate) fn mib_download_channel(&self) -> mpsc::Sender<Message> {
        self.state.fsm.mib_download.clone()
    }

    /// Snapshot of the frame counters
    pub fn counters(&self) -> FrameCounters {
        FrameCounters {
            tx_frames: self.state.tx_frames.load(Ordering::Relaxed),
            tx_onu_frames: self.state.tx_onu_frames.load(Ordering::Relaxed),
            rx_frames: self.state.rx_frames.load(Ordering::Relaxed),
            rx_onu_frames: self.state.rx_onu_frames.load(Ordering::Relaxed),
            rx_onu_discards: self.state.rx_onu_discards.load(Ordering::Relaxed),
        }
    }

    /// Current MIB upload progress
    pub fn upload_progress(&self) -> UploadProgress {
        *lock(&self.state.upload)
    }

    pub(crate) fn reset_upload_progress(&self) {
        *lock(&self.state.upload) = UploadProgress::default();
    }

    pub(crate) fn advance_upload_sequence(&self) {
        let mut progress = lock(&self.state.upload);
        progress.sequence_number = progress.sequence_number.wrapping_add(1);
    }

    /// Number of transactions with a registered response callback
    pub fn pending_requests(&self) -> usize {
        lock(&self.state.rx_scheduler).len()
    }

    /// Check whether a transaction still awaits its response
    pub fn has_pending_request(&self, transaction_id: u16) -> bool {
        lock(&self.state.rx_scheduler).contains_key(&transaction_id)
    }

    // ========================================================================
    // TID ALLOCATION
    // ========================================================================

    /// Allocate the next transaction identifier.
    ///
    /// Low-priority identifiers cycle through [0x0001, 0x7FFF], high-priority
    /// identifiers through [0x8000, 0xFFFF]. 0 is never returned; it is
    /// reserved for autonomous notifications.
    pub fn next_tid(&self, high_priority: bool) -> u16 {
        if high_priority {
            let mut tid = lock(&self.state.hp_tid);
            let next = *tid;
            *tid = tid.wrapping_add(1);
            if *tid < HIGH_TID_START {
                *tid = HIGH_TID_START;
            }
            next
        } else {
            let mut tid = lock(&self.state.tid);
            let next = *tid;
            *tid += 1;
            if *tid >= HIGH_TID_START {
                *tid = LOW_TID_START;
            }
            next
        }
    }

    // ========================================================================
    // TRANSMIT PATH
    // ========================================================================

    /// Register the response callback and queue the frame for transmit.
    ///
    /// A dispatcher task is spawned after every enqueue; the call returns
    /// once the descriptor is queued, not once it is on the wire.
    pub async fn send(
        &self,
        frame: Bytes,
        timeout: Duration,
        retries: u32,
        high_priority: bool,
        callback: CallbackPair,
    ) -> Result<()> {
        tracing::debug!(transaction_id = callback.key, "register response callback");
        // A prior entry for the key is overwritten; the allocator keeps
        // concurrently outstanding identifiers unique.
        lock(&self.state.rx_scheduler).insert(callback.key, callback.entry);

        let descriptor = TransferDescriptor {
            frame,
            timeout,
            retries,
            high_priority,
        };
        self.state.tx_queue.lock().await.push_back(descriptor);

        let channel = self.clone();
        tokio::spawn(async move {
            if let Err(error) = channel.dispatch_queued().await {
                tracing::warn!(%error, "OMCI dispatch aborted");
            }
        });
        Ok(())
    }

    /// Drain the TX queue in enqueue order.
    ///
    /// The queue mutex stays held across the device lookup and the transport
    /// send of every descriptor. On any error the drain aborts and the
    /// remaining descriptors stay queued for a later drain.
    async fn dispatch_queued(&self) -> Result<()> {
        let state = &self.state;
        let mut queue = state.tx_queue.lock().await;
        while let Some(descriptor) = queue.front() {
            let device = state
                .devices
                .get_device(&state.endpoint.parent_id, &state.endpoint.device_id)
                .await
                .map_err(|error| {
                    tracing::error!(
                        parent_id = %state.endpoint.parent_id,
                        child_id = %state.endpoint.device_id,
                        %error,
                        "failed to fetch device"
                    );
                    error
                })?;

            tracing::debug!(
                device_id = %device.id,
                from_type = %state.endpoint.adapter_type,
                to_type = %state.endpoint.proxy_adapter_type,
                proxy_device_id = %state.endpoint.proxy_device_id,
                high_priority = descriptor.high_priority,
                "OMCI message sending"
            );

            let request = OmciRequest {
                message: descriptor.frame.clone(),
                from_adapter: state.endpoint.adapter_type.clone(),
                to_adapter: state.endpoint.proxy_adapter_type.clone(),
                to_device_id: state.endpoint.device_id.clone(),
                proxy_device_id: state.endpoint.proxy_device_id.clone(),
            };
            state
                .transport
                .send_omci_request(request)
                .await
                .map_err(|error| {
                    tracing::error!(%error, "send OMCI request failed");
                    error
                })?;

            state.tx_frames.fetch_add(1, Ordering::Relaxed);
            queue.pop_front();
        }
        Ok(())
    }

    // ========================================================================
    // RECEIVE PATH
    // ========================================================================

    /// Normalize, decode and route one ingress frame.
    ///
    /// Responses consume their scheduler-map entry and run the registered
    /// handler in an independent task; autonomous frames go to the ONU
    /// message sink. The buffer is patched in place when the baseline
    /// trailer repair applies.
    pub async fn receive(&self, packet: &mut BytesMut) -> Result<()> {
        let state = &self.state;
        if packet.len() < wire::BASELINE_FRAME_LEN {
            tracing::error!(
                length = packet.len(),
                "ingress frame too short for baseline format"
            );
            return Err(Error::FrameTooShort {
                length: packet.len(),
            });
        }
        if state.config.repair_baseline_trailer && wire::patch_baseline_trailer(packet) {
            tracing::debug!("corrected baseline trailer length");
        }

        let raw = Bytes::copy_from_slice(packet);
        let frame = OmciFrame::parse(&raw).map_err(|error| {
            tracing::error!(%error, "ingress frame could not be decoded");
            error
        })?;
        tracing::debug!(
            transaction_id = frame.header.transaction_id,
            message_type = ?frame.header.message_type,
            device_ident = ?frame.header.device_ident,
            "OMCI message decoded"
        );

        if !frame.header.message_type.is_response() {
            state.rx_onu_frames.fetch_add(1, Ordering::Relaxed);
            if frame.header.transaction_id != 0 {
                tracing::error!(
                    transaction_id = frame.header.transaction_id,
                    "autonomous message with nonzero transaction id"
                );
                return Err(Error::Protocol(format!(
                    "autonomous message with transaction id {:#06x}",
                    frame.header.transaction_id
                )));
            }
            return self.receive_onu_message(&frame);
        }

        state.rx_frames.fetch_add(1, Ordering::Relaxed);
        if let Some(count) = wire::mib_upload_command_count(&frame) {
            lock(&state.upload).command_count = count;
        }

        let transaction_id = frame.header.transaction_id;
        let entry = lock(&state.rx_scheduler).remove(&transaction_id);
        match entry {
            Some(entry) => {
                // Decoupled from the receive pump so a slow FSM cannot
                // stall ingress processing.
                tokio::spawn(async move {
                    if let Err(error) = (entry.handler)(frame, raw, entry.response_tx).await {
                        tracing::warn!(transaction_id, %error, "response handler failed");
                    }
                });
                Ok(())
            }
            None => {
                tracing::error!(transaction_id, "response for unregistered transaction");
                Err(Error::NoPendingRequest { transaction_id })
            }
        }
    }

    /// Route an autonomous (TCID 0) notification to the ONU message sink
    fn receive_onu_message(&self, frame: &OmciFrame) -> Result<()> {
        tracing::debug!(
            operation = ?frame.header.message_type.operation,
            "rx ONU autonomous message"
        );
        match frame.header.message_type.operation {
            Operation::AlarmNotification => self.state.sink.alarm_notification(frame),
            Operation::AttributeValueChange => self.state.sink.attribute_value_change(frame),
            Operation::TestResult => self.state.sink.test_result(frame),
            operation => {
                tracing::error!(?operation, "unsupported autonomous message type");
                self.state.rx_onu_discards.fetch_add(1, Ordering::Relaxed);
                Err(Error::UnsupportedMessage(format!(
                    "autonomous {:?}",
                    operation
                )))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn force_low_tid(&self, value: u16) {
        *lock(&self.state.tid) = value;
    }

    #[cfg(test)]
    pub(crate) fn force_high_tid(&self, value: u16) {
        *lock(&self.state.hp_tid) = value;
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


#[cfg(test)]
mod proptest_suite {
    use super::tests::*;
    use proptest::prelude::*;

    proptest! {
        /// Any low-priority allocation sequence stays in [0x0001, 0x7FFF]
        /// and increments by one between wraps
        #[test_log::test]
        fn low_tids_cycle_monotonically(count in 1usize..4096) {
            let channel = test_channel();
            let mut previous = None;
            for _ in 0..count {
                let tid = channel.next_tid(false);
                prop_assert!((0x0001..=0x7FFF).contains(&tid));
                if let Some(previous) = previous {
                    let expected = if previous == 0x7FFF { 0x0001 } else { previous + 1 };
                    prop_assert_eq!(tid, expected);
                }
                previous = Some(tid);
            }
        }

        /// Any high-priority allocation sequence stays in [0x8000, 0xFFFF]
        /// and wraps from 0xFFFF to 0x8000
        #[test_log::test]
        fn high_tids_cycle_monotonically(count in 1usize..4096) {
            let channel = test_channel();
            let mut previous = None;
            for _ in 0..count {
                let tid = channel.next_tid(true);
                prop_assert!(tid >= 0x8000);
                if let Some(previous) = previous {
                    let expected = if previous == 0xFFFF { 0x8000 } else { previous + 1 };
                    prop_assert_eq!(tid, expected);
                }
                previous = Some(tid);
            }
        }
    }
}
