//! # Managed Entity Catalog
//!
//! Typed construction and attribute encoding for the G.988 Managed Entities
//! the control channel operates on. Each class carries a static attribute
//! table (name, attribute index, wire width, set-by-create flag, default)
//! that drives attribute-mask computation and contents encoding.
//!
//! The catalog is intentionally partial: it covers the MEs of the request
//! catalog and is extended row by row as new operations are needed.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Error, Result};

// Entity-id conventions carried over from the OLT-side adapter.
pub const GAL_ETHERNET_ENTITY_ID: u16 = 1;
pub const MAX_GEM_PAYLOAD_SIZE: u16 = 48;
pub const CONNECTIVITY_MODE: u8 = 5;
pub const MAC_BRIDGE_SERVICE_PROFILE_ENTITY_ID: u16 = 0x201;
pub const MAC_BRIDGE_PORT_ANI_ENTITY_ID: u16 = 0x2102;

// ============================================================================
// CLASS IDENTIFIERS
// ============================================================================

/// Managed Entity class identifiers (G.988 clause 9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClassId {
    OnuData = 2,
    MacBridgeServiceProfile = 45,
    MacBridgePortConfigurationData = 47,
    ExtendedVlanTaggingOperationConfigurationData = 171,
    OnuG = 256,
    Onu2G = 257,
    UniG = 264,
    GalEthernetProfile = 272,
    VirtualEthernetInterfacePoint = 329,
}

impl ClassId {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            2 => Some(Self::OnuData),
            45 => Some(Self::MacBridgeServiceProfile),
            47 => Some(Self::MacBridgePortConfigurationData),
            171 => Some(Self::ExtendedVlanTaggingOperationConfigurationData),
            256 => Some(Self::OnuG),
            257 => Some(Self::Onu2G),
            264 => Some(Self::UniG),
            272 => Some(Self::GalEthernetProfile),
            329 => Some(Self::VirtualEthernetInterfacePoint),
            _ => None,
        }
    }

    pub fn value(self) -> u16 {
        self as u16
    }
}

// ============================================================================
// ATTRIBUTE VALUES
// ============================================================================

/// A single attribute value.
///
/// Numeric values are encoded big endian at the width the attribute table
/// declares; byte values are zero padded to the declared width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    U8(u8),
    U16(u16),
    U32(u32),
    Bytes(Bytes),
}

impl From<u8> for AttributeValue {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<u16> for AttributeValue {
    fn from(v: u16) -> Self {
        Self::U16(v)
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

fn encode_unsigned(value: u64, width: usize, out: &mut Vec<u8>) {
    if width >= 8 {
        out.resize(out.len() + (width - 8), 0);
        out.extend_from_slice(&value.to_be_bytes());
    } else {
        out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
    }
}

impl AttributeValue {
    fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::Bytes(_) => None,
        }
    }

    fn fits(&self, width: usize) -> bool {
        match self {
            Self::Bytes(b) => b.len() <= width,
            numeric => {
                let value = numeric.as_unsigned().unwrap_or_default();
                width >= 8 || value < 1 << (8 * width)
            }
        }
    }

    fn encode_into(&self, width: usize, out: &mut Vec<u8>) {
        match self {
            Self::Bytes(b) => {
                out.extend_from_slice(b);
                out.resize(out.len() + (width - b.len()), 0);
            }
            numeric => encode_unsigned(
                numeric.as_unsigned().unwrap_or_default(),
                width,
                out,
            ),
        }
    }
}

/// Attribute map keyed by catalog attribute name
pub type AttributeValueMap = BTreeMap<&'static str, AttributeValue>;

/// Parameters for instantiating a Managed Entity
#[derive(Debug, Clone, Default)]
pub struct ParamData {
    pub entity_id: u16,
    pub attributes: AttributeValueMap,
}

// ============================================================================
// ATTRIBUTE TABLES
// ============================================================================

#[derive(Debug)]
struct AttributeDef {
    name: &'static str,
    /// Attribute index 1..=16 (bit `1 << (16 - index)` of the mask)
    index: u8,
    /// Wire width in bytes
    width: usize,
    set_by_create: bool,
    default: u64,
}

const fn attr(
    name: &'static str,
    index: u8,
    width: usize,
    set_by_create: bool,
    default: u64,
) -> AttributeDef {
    AttributeDef {
        name,
        index,
        width,
        set_by_create,
        default,
    }
}

#[derive(Debug)]
struct EntityDef {
    class_id: ClassId,
    name: &'static str,
    attributes: &'static [AttributeDef],
}

static ONU_DATA: EntityDef = EntityDef {
    class_id: ClassId::OnuData,
    name: "OnuData",
    attributes: &[attr("MibDataSync", 1, 1, false, 0)],
};

static ONU_G: EntityDef = EntityDef {
    class_id: ClassId::OnuG,
    name: "OnuG",
    attributes: &[
        attr("VendorId", 1, 4, false, 0),
        attr("Version", 2, 14, false, 0),
        attr("SerialNumber", 3, 8, false, 0),
        attr("TrafficManagementOption", 4, 1, false, 0),
        attr("BatteryBackup", 6, 1, false, 0),
        attr("AdministrativeState", 7, 1, false, 0),
        attr("OperationalState", 8, 1, false, 0),
        attr("OnuSurvivalTime", 9, 1, false, 0),
        attr("LogicalOnuId", 10, 24, false, 0),
        attr("LogicalPassword", 11, 12, false, 0),
        attr("CredentialsStatus", 12, 1, false, 0),
        attr("ExtendedTcLayerOptions", 13, 2, false, 0),
    ],
};

static ONU_2G: EntityDef = EntityDef {
    class_id: ClassId::Onu2G,
    name: "Onu2G",
    attributes: &[
        attr("EquipmentId", 1, 20, false, 0),
        attr("OmccVersion", 2, 1, false, 0),
        attr("VendorProductCode", 3, 2, false, 0),
        attr("SecurityCapability", 4, 1, false, 0),
        attr("SecurityMode", 5, 1, false, 0),
        attr("TotalPriorityQueueNumber", 6, 2, false, 0),
        attr("TotalTrafficSchedulerNumber", 7, 1, false, 0),
        attr("TotalGemPortIdNumber", 9, 2, false, 0),
        attr("Sysuptime", 10, 4, false, 0),
        attr("ConnectivityCapability", 11, 2, false, 0),
        attr("CurrentConnectivityMode", 12, 1, false, 0),
        attr("QualityOfServiceConfigurationFlexibility", 13, 2, false, 0),
        attr("PriorityQueueScaleFactor", 14, 2, false, 0),
    ],
};

static UNI_G: EntityDef = EntityDef {
    class_id: ClassId::UniG,
    name: "UniG",
    attributes: &[
        attr("ConfigurationOptionStatus", 1, 2, false, 0),
        attr("AdministrativeState", 2, 1, false, 0),
        attr("ManagementCapability", 3, 1, false, 0),
        attr("NonOmciManagementIdentifier", 4, 2, false, 0),
        attr("RelayAgentOptions", 5, 2, false, 0),
    ],
};

static VEIP: EntityDef = EntityDef {
    class_id: ClassId::VirtualEthernetInterfacePoint,
    name: "VirtualEthernetInterfacePoint",
    attributes: &[
        attr("AdministrativeState", 1, 1, false, 0),
        attr("OperationalState", 2, 1, false, 0),
        attr("InterdomainName", 3, 25, false, 0),
        attr("TcpUdpPointer", 4, 2, false, 0),
        attr("IanaAssignedPort", 5, 2, false, 0),
    ],
};

static GAL_ETHERNET_PROFILE: EntityDef = EntityDef {
    class_id: ClassId::GalEthernetProfile,
    name: "GalEthernetProfile",
    attributes: &[attr("MaximumGemPayloadSize", 1, 2, true, 48)],
};

static MAC_BRIDGE_SERVICE_PROFILE: EntityDef = EntityDef {
    class_id: ClassId::MacBridgeServiceProfile,
    name: "MacBridgeServiceProfile",
    attributes: &[
        attr("SpanningTreeInd", 1, 1, true, 0),
        attr("LearningInd", 2, 1, true, 0),
        attr("PortBridgingInd", 3, 1, true, 0),
        attr("Priority", 4, 2, true, 0x8000),
        attr("MaxAge", 5, 2, true, 20 * 256),
        attr("HelloTime", 6, 2, true, 2 * 256),
        attr("ForwardDelay", 7, 2, true, 15 * 256),
        attr("UnknownMacAddressDiscard", 8, 1, true, 0),
        attr("MacLearningDepth", 9, 1, true, 0),
        attr("DynamicFilteringAgeingTime", 10, 4, true, 0),
    ],
};

static MAC_BRIDGE_PORT_CONFIGURATION_DATA: EntityDef = EntityDef {
    class_id: ClassId::MacBridgePortConfigurationData,
    name: "MacBridgePortConfigurationData",
    attributes: &[
        attr("BridgeIdPointer", 1, 2, true, 0),
        attr("PortNum", 2, 1, true, 0),
        attr("TpType", 3, 1, true, 1),
        attr("TpPointer", 4, 2, true, 0),
        attr("PortPriority", 5, 2, true, 0x80),
        attr("PortPathCost", 6, 2, true, 100),
        attr("PortSpanningTreeInd", 7, 1, true, 0),
    ],
};

static EXTENDED_VLAN_TAGGING: EntityDef = EntityDef {
    class_id: ClassId::ExtendedVlanTaggingOperationConfigurationData,
    name: "ExtendedVlanTaggingOperationConfigurationData",
    attributes: &[
        attr("AssociationType", 1, 1, true, 0),
        attr("ReceivedFrameVlanTaggingOperationTableMaxSize", 2, 2, false, 0),
        attr("InputTpid", 3, 2, false, 0),
        attr("OutputTpid", 4, 2, false, 0),
        attr("DownstreamMode", 5, 1, false, 0),
        attr("ReceivedFrameVlanTaggingOperationTable", 6, 16, false, 0),
        attr("AssociatedMePointer", 7, 2, true, 0),
    ],
};

fn definition(class_id: ClassId) -> &'static EntityDef {
    match class_id {
        ClassId::OnuData => &ONU_DATA,
        ClassId::OnuG => &ONU_G,
        ClassId::Onu2G => &ONU_2G,
        ClassId::UniG => &UNI_G,
        ClassId::VirtualEthernetInterfacePoint => &VEIP,
        ClassId::GalEthernetProfile => &GAL_ETHERNET_PROFILE,
        ClassId::MacBridgeServiceProfile => &MAC_BRIDGE_SERVICE_PROFILE,
        ClassId::MacBridgePortConfigurationData => &MAC_BRIDGE_PORT_CONFIGURATION_DATA,
        ClassId::ExtendedVlanTaggingOperationConfigurationData => &EXTENDED_VLAN_TAGGING,
    }
}

// ============================================================================
// MANAGED ENTITY INSTANCES
// ============================================================================

/// A validated Managed Entity instance.
///
/// Instantiation checks every supplied attribute against the class table;
/// an unknown attribute or a value wider than the attribute is rejected.
#[derive(Debug, Clone)]
pub struct ManagedEntity {
    definition: &'static EntityDef,
    entity_id: u16,
    attributes: AttributeValueMap,
}

impl ManagedEntity {
    pub fn new(class_id: ClassId, params: ParamData) -> Result<Self> {
        let definition = definition(class_id);
        for (name, value) in &params.attributes {
            let def = definition
                .attributes
                .iter()
                .find(|a| a.name == *name)
                .ok_or_else(|| {
                    Error::MeDefinition(format!(
                        "{} has no attribute named {}",
                        definition.name, name
                    ))
                })?;
            if !value.fits(def.width) {
                return Err(Error::MeDefinition(format!(
                    "value for {}.{} does not fit in {} bytes",
                    definition.name, name, def.width
                )));
            }
        }
        Ok(Self {
            definition,
            entity_id: params.entity_id,
            attributes: params.attributes,
        })
    }

    pub fn class_id(&self) -> ClassId {
        self.definition.class_id
    }

    pub fn entity_id(&self) -> u16 {
        self.entity_id
    }

    /// Class name per G.988
    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    pub fn attributes(&self) -> &AttributeValueMap {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Mask covering the attributes this instance carries
    pub fn attribute_mask(&self) -> Result<u16> {
        let mut mask = 0u16;
        for name in self.attributes.keys() {
            // validated at construction
            let def = self
                .definition
                .attributes
                .iter()
                .find(|a| a.name == *name)
                .ok_or_else(|| Error::MeDefinition(format!("unknown attribute {}", name)))?;
            mask |= 1 << (16 - def.index);
        }
        Ok(mask)
    }

    /// Encode the contents of a Create request: set-by-create attributes in
    /// ascending attribute index.
    ///
    /// With `add_defaults`, attributes this instance does not carry take the
    /// catalog default; otherwise a missing attribute is an encode error.
    pub fn encode_create_contents(&self, add_defaults: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for def in self.definition.attributes.iter().filter(|a| a.set_by_create) {
            match self.attributes.get(def.name) {
                Some(value) => value.encode_into(def.width, &mut out),
                None if add_defaults => encode_unsigned(def.default, def.width, &mut out),
                None => {
                    return Err(Error::Encode(format!(
                        "set-by-create attribute {}.{} not provided",
                        self.definition.name, def.name
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Encode the contents of a Set request: attribute mask followed by the
    /// carried attribute values in ascending attribute index.
    pub fn encode_set_contents(&self) -> Result<Vec<u8>> {
        let mask = self.attribute_mask()?;
        let mut out = Vec::new();
        out.extend_from_slice(&mask.to_be_bytes());
        for def in self.definition.attributes {
            if let Some(value) = self.attributes.get(def.name) {
                value.encode_into(def.width, &mut out);
            }
        }
        Ok(out)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
