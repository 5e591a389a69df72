//! # OMCI Wire Format
//!
//! Encoding and decoding of OMCI baseline messages per ITU-T G.988. This
//! module provides low-level access to the wire format for the request
//! builders, the receive path, and tests.
//!
//! ## OMCI Baseline Frame (44 bytes)
//!
//! ```text
//! Offset  Size  Field
//! ──────────────────────────────────────────────────────
//!   0      2    Transaction Correlation Identifier
//!   2      1    Message Type (DB | AR | AK | MT)
//!   3      1    Device Identifier (0x0A baseline)
//!   4      2    Managed Entity Class
//!   6      2    Managed Entity Instance
//!   8     32    Message Contents (zero padded)
//!  40      2    CPCS-UU (always 0x0000)
//!  42      2    CPCS-SDU Length (always 0x0028 = 40)
//! ──────────────────────────────────────────────────────
//! ```
//!
//! A 4-byte CRC/MIC may follow on the PON maintenance channel; it is neither
//! produced nor consumed here.
//!
//! ## Message Type Byte
//!
//! | Bit | Name | Meaning |
//! |-----|------|---------|
//! | 7 | DB | Destination bit, always 0 |
//! | 6 | AR | Acknowledge request (set on requests) |
//! | 5 | AK | Acknowledgement (set on responses) |
//! | 4-0 | MT | Operation code |
//!
//! An autonomous notification (alarm, AVC, test result) carries neither AR
//! nor AK and a transaction identifier of 0.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::me::{ClassId, ManagedEntity};

/// Total length of a baseline frame without the trailing CRC/MIC
pub const BASELINE_FRAME_LEN: usize = 44;

/// Length of the message-contents region of a baseline frame
pub const BASELINE_CONTENT_LEN: usize = 32;

/// Byte offset of the CPCS-SDU length field
pub const TRAILER_LENGTH_OFFSET: usize = 42;

/// Mandatory value of the CPCS-SDU length field
pub const TRAILER_LENGTH: u16 = 40;

/// Acknowledge-request flag of the message-type byte
pub const AR: u8 = 0x40;

/// Acknowledgement flag of the message-type byte
pub const AK: u8 = 0x20;

const DB: u8 = 0x80;
const OPERATION_MASK: u8 = 0x1F;

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// OMCI operation codes (the MT field of the message-type byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Create = 4,
    Delete = 6,
    Set = 8,
    Get = 9,
    GetAllAlarms = 11,
    GetAllAlarmsNext = 12,
    MibUpload = 13,
    MibUploadNext = 14,
    MibReset = 15,
    AlarmNotification = 16,
    AttributeValueChange = 17,
    Test = 18,
    StartSoftwareDownload = 19,
    DownloadSection = 20,
    EndSoftwareDownload = 21,
    ActivateSoftware = 22,
    CommitSoftware = 23,
    SynchronizeTime = 24,
    Reboot = 25,
    GetNext = 26,
    TestResult = 27,
    GetCurrentData = 28,
}

impl Operation {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            4 => Some(Self::Create),
            6 => Some(Self::Delete),
            8 => Some(Self::Set),
            9 => Some(Self::Get),
            11 => Some(Self::GetAllAlarms),
            12 => Some(Self::GetAllAlarmsNext),
            13 => Some(Self::MibUpload),
            14 => Some(Self::MibUploadNext),
            15 => Some(Self::MibReset),
            16 => Some(Self::AlarmNotification),
            17 => Some(Self::AttributeValueChange),
            18 => Some(Self::Test),
            19 => Some(Self::StartSoftwareDownload),
            20 => Some(Self::DownloadSection),
            21 => Some(Self::EndSoftwareDownload),
            22 => Some(Self::ActivateSoftware),
            23 => Some(Self::CommitSoftware),
            24 => Some(Self::SynchronizeTime),
            25 => Some(Self::Reboot),
            26 => Some(Self::GetNext),
            27 => Some(Self::TestResult),
            28 => Some(Self::GetCurrentData),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Decoded message-type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType {
    /// Operation code (MT field)
    pub operation: Operation,
    /// AR flag, set on requests that expect a response
    pub acknowledge_request: bool,
    /// AK flag, set on responses
    pub acknowledgement: bool,
}

impl MessageType {
    /// A request expecting an acknowledgement (`MT | AR`)
    pub fn request(operation: Operation) -> Self {
        Self {
            operation,
            acknowledge_request: true,
            acknowledgement: false,
        }
    }

    /// A response (`MT | AK`)
    pub fn response(operation: Operation) -> Self {
        Self {
            operation,
            acknowledge_request: false,
            acknowledgement: true,
        }
    }

    /// An autonomous notification (plain `MT`)
    pub fn autonomous(operation: Operation) -> Self {
        Self {
            operation,
            acknowledge_request: false,
            acknowledgement: false,
        }
    }

    /// Parse a message-type byte. Rejects the DB bit and AR+AK together.
    pub fn from_u8(value: u8) -> Option<Self> {
        if value & DB != 0 {
            return None;
        }
        let acknowledge_request = value & AR != 0;
        let acknowledgement = value & AK != 0;
        if acknowledge_request && acknowledgement {
            return None;
        }
        Some(Self {
            operation: Operation::from_u8(value & OPERATION_MASK)?,
            acknowledge_request,
            acknowledgement,
        })
    }

    pub fn as_u8(self) -> u8 {
        let mut value = self.operation.value();
        if self.acknowledge_request {
            value |= AR;
        }
        if self.acknowledgement {
            value |= AK;
        }
        value
    }

    /// Check if this is a response (AK set)
    pub fn is_response(self) -> bool {
        self.acknowledgement
    }

    /// Check if this is an autonomous notification (neither AR nor AK)
    pub fn is_autonomous(self) -> bool {
        !self.acknowledge_request && !self.acknowledgement
    }
}

/// OMCI device identifier byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceIdent {
    /// Baseline message set (44-byte frames)
    Baseline = 0x0A,
    /// Extended message set
    Extended = 0x0B,
}

impl DeviceIdent {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0A => Some(Self::Baseline),
            0x0B => Some(Self::Extended),
            _ => None,
        }
    }
}

// ============================================================================
// HEADER AND FRAME
// ============================================================================

/// OMCI frame header (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmciHeader {
    /// Transaction Correlation Identifier; 0 for autonomous notifications
    pub transaction_id: u16,
    /// Message type
    pub message_type: MessageType,
    /// Device identifier
    pub device_ident: DeviceIdent,
}

impl OmciHeader {
    pub const SIZE: usize = 4;

    /// Parse a header from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::Decode(format!(
                "need {} header bytes, have {}",
                Self::SIZE,
                buf.remaining()
            )));
        }
        let transaction_id = buf.get_u16();
        let message_type_raw = buf.get_u8();
        let device_ident_raw = buf.get_u8();

        let message_type = MessageType::from_u8(message_type_raw)
            .ok_or_else(|| Error::Decode(format!("invalid message type {:#04x}", message_type_raw)))?;
        let device_ident = DeviceIdent::from_u8(device_ident_raw).ok_or_else(|| {
            Error::Decode(format!("invalid device identifier {:#04x}", device_ident_raw))
        })?;

        Ok(Self {
            transaction_id,
            message_type,
            device_ident,
        })
    }

    /// Serialize the header to bytes
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.transaction_id);
        buf.put_u8(self.message_type.as_u8());
        buf.put_u8(self.device_ident as u8);
    }
}

/// A decoded OMCI baseline frame.
///
/// Decoding is zero copy: `contents` is a slice of the ingress packet.
#[derive(Debug, Clone)]
pub struct OmciFrame {
    pub header: OmciHeader,
    /// Managed Entity class of the message identifier
    pub entity_class: u16,
    /// Managed Entity instance of the message identifier
    pub entity_instance: u16,
    /// The 32-byte message-contents region
    pub contents: Bytes,
}

impl OmciFrame {
    /// Parse a baseline frame from a full ingress packet
    pub fn parse(packet: &Bytes) -> Result<Self> {
        if packet.len() < BASELINE_FRAME_LEN {
            return Err(Error::FrameTooShort {
                length: packet.len(),
            });
        }
        let mut cursor = packet.clone();
        let header = OmciHeader::parse(&mut cursor)?;
        let entity_class = cursor.get_u16();
        let entity_instance = cursor.get_u16();
        let contents = packet.slice(8..8 + BASELINE_CONTENT_LEN);

        Ok(Self {
            header,
            entity_class,
            entity_instance,
            contents,
        })
    }
}

/// Number of upload-next commands announced by a MIB-Upload response,
/// or `None` if the frame is not a MIB-Upload response for OnuData.
pub fn mib_upload_command_count(frame: &OmciFrame) -> Option<u16> {
    if frame.header.message_type != MessageType::response(Operation::MibUpload)
        || frame.entity_class != ClassId::OnuData.value()
    {
        return None;
    }
    let mut contents = frame.contents.clone();
    Some(contents.get_u16())
}

// ============================================================================
// BASELINE TRAILER
// ============================================================================

/// Read the CPCS-SDU length field of a baseline frame
pub fn baseline_trailer_length(frame: &[u8]) -> Option<u16> {
    if frame.len() < BASELINE_FRAME_LEN {
        return None;
    }
    Some(u16::from_be_bytes([
        frame[TRAILER_LENGTH_OFFSET],
        frame[TRAILER_LENGTH_OFFSET + 1],
    ]))
}

/// Rewrite a CPCS-SDU length field that is not 40.
///
/// Returns true if the frame was modified. Frames shorter than the baseline
/// length are left untouched. Only valid for baseline frames; an
/// extended-format frame would be corrupted by the rewrite.
pub fn patch_baseline_trailer(frame: &mut [u8]) -> bool {
    match baseline_trailer_length(frame) {
        Some(len) if len != TRAILER_LENGTH => {
            frame[TRAILER_LENGTH_OFFSET..TRAILER_LENGTH_OFFSET + 2]
                .copy_from_slice(&TRAILER_LENGTH.to_be_bytes());
            true
        }
        _ => false,
    }
}

// ============================================================================
// REQUEST ENCODING
// ============================================================================

/// Serialize a baseline frame with the length fields auto computed.
///
/// `contents` may be shorter than the 32-byte region and is zero padded; a
/// longer contents block is a serialize error.
pub fn encode_baseline_frame(
    transaction_id: u16,
    message_type: MessageType,
    entity_class: u16,
    entity_instance: u16,
    contents: &[u8],
) -> Result<Bytes> {
    if contents.len() > BASELINE_CONTENT_LEN {
        return Err(Error::Serialize(format!(
            "message contents of {} bytes exceed the baseline region",
            contents.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(BASELINE_FRAME_LEN);
    let header = OmciHeader {
        transaction_id,
        message_type,
        device_ident: DeviceIdent::Baseline,
    };
    header.serialize(&mut buf);
    buf.put_u16(entity_class);
    buf.put_u16(entity_instance);
    buf.put_slice(contents);
    buf.put_bytes(0, BASELINE_CONTENT_LEN - contents.len());
    buf.put_u16(0); // CPCS-UU
    buf.put_u16(TRAILER_LENGTH);
    Ok(buf.freeze())
}

/// Encode a MIB-Reset request for OnuData
pub fn encode_mib_reset_request(transaction_id: u16) -> Result<Bytes> {
    encode_baseline_frame(
        transaction_id,
        MessageType::request(Operation::MibReset),
        ClassId::OnuData.value(),
        0,
        &[],
    )
}

/// Encode a MIB-Upload request for OnuData
pub fn encode_mib_upload_request(transaction_id: u16) -> Result<Bytes> {
    encode_baseline_frame(
        transaction_id,
        MessageType::request(Operation::MibUpload),
        ClassId::OnuData.value(),
        0,
        &[],
    )
}

/// Encode a MIB-Upload-Next request carrying the command sequence number
pub fn encode_mib_upload_next_request(transaction_id: u16, sequence_number: u16) -> Result<Bytes> {
    encode_baseline_frame(
        transaction_id,
        MessageType::request(Operation::MibUploadNext),
        ClassId::OnuData.value(),
        0,
        &sequence_number.to_be_bytes(),
    )
}

/// Encode a Create request for a Managed Entity instance.
///
/// With `add_defaults`, set-by-create attributes the instance does not carry
/// are filled from the catalog defaults; otherwise a missing attribute is an
/// encode error.
pub fn encode_create_request(
    entity: &ManagedEntity,
    transaction_id: u16,
    add_defaults: bool,
) -> Result<Bytes> {
    let contents = entity.encode_create_contents(add_defaults)?;
    encode_baseline_frame(
        transaction_id,
        MessageType::request(Operation::Create),
        entity.class_id().value(),
        entity.entity_id(),
        &contents,
    )
}

/// Encode a Set request carrying the instance's attributes and their mask
pub fn encode_set_request(entity: &ManagedEntity, transaction_id: u16) -> Result<Bytes> {
    let contents = entity.encode_set_contents()?;
    encode_baseline_frame(
        transaction_id,
        MessageType::request(Operation::Set),
        entity.class_id().value(),
        entity.entity_id(),
        &contents,
    )
}

/// Encode a Get request for the instance's attribute set
pub fn encode_get_request(entity: &ManagedEntity, transaction_id: u16) -> Result<Bytes> {
    let mask = entity.attribute_mask()?;
    encode_baseline_frame(
        transaction_id,
        MessageType::request(Operation::Get),
        entity.class_id().value(),
        entity.entity_id(),
        &mask.to_be_bytes(),
    )
}

// ============================================================================
// UNIT TESTS
// ============================================================================
