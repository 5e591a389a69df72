//! Message envelopes delivered on FSM response channels.

use bytes::Bytes;

use crate::wire::OmciFrame;

/// Control signals exchanged between the management state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMessageType {
    LoadMibTemplateOk,
    LoadMibTemplateFailed,
    TimeOutOccurred,
    AbortMessageProcessing,
}

/// A decoded OMCI response together with its raw ingress packet
#[derive(Debug, Clone)]
pub struct OmciMessage {
    /// Decoded header and message identifier
    pub frame: OmciFrame,
    /// The complete packet the frame was decoded from
    pub packet: Bytes,
}

/// Envelope delivered on response channels.
///
/// The owning state machines receive OMCI responses and out-of-band control
/// signals on the same channel and dispatch on the variant.
#[derive(Debug, Clone)]
pub enum Message {
    Test(TestMessageType),
    Omci(OmciMessage),
}
