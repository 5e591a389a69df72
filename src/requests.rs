//! # Managed Entity Request Catalog
//!
//! Typed request builders layered on the [`OmciChannel`](crate::OmciChannel)
//! send path. Every builder follows the same skeleton:
//!
//! 1. allocate a transaction identifier,
//! 2. instantiate the Managed Entity (where the request carries one),
//! 3. encode and serialize the frame,
//! 4. register the shared response handler under the identifier,
//! 5. enqueue the transfer descriptor and trigger the dispatcher.
//!
//! The OnuData trio (MIB reset / upload / upload-next) and the generic get
//! route their responses to the MIB-upload FSM; the create/set catalog
//! routes to the MIB-download FSM; the `*_with_channel`-style setters take a
//! caller-supplied response channel.
//!
//! A failed builder may leave its callback registered; no response will
//! arrive for it and the entry ages out with the session.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::channel::{omci_response_handler, CallbackEntry, CallbackPair, OmciChannel};
use crate::error::Result;
use crate::me::{
    self, AttributeValue, AttributeValueMap, ClassId, ManagedEntity, ParamData,
};
use crate::message::Message;
use crate::wire;

// ============================================================================
// UNI PORTS
// ============================================================================

/// UNI termination point types as carried in the MBPCD TpType attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UniPortType {
    /// Physical path termination point Ethernet UNI
    PptpEthernetUni = 1,
    /// Virtual Ethernet interface point
    Veip = 11,
}

/// A user network interface of the ONU, as learned from the MIB upload
#[derive(Debug, Clone)]
pub struct UniPort {
    /// Entity id of the UNI termination point
    pub entity_id: u16,
    /// MAC bridge port number assigned to this UNI
    pub mac_bridge_port_no: u8,
    pub port_type: UniPortType,
}

impl OmciChannel {
    // ========================================================================
    // COMMON SEND PATH
    // ========================================================================

    async fn send_me_request(
        &self,
        frame: Bytes,
        transaction_id: u16,
        timeout: Duration,
        high_priority: bool,
        response_tx: mpsc::Sender<Message>,
    ) -> Result<()> {
        let callback = CallbackPair {
            key: transaction_id,
            entry: CallbackEntry {
                response_tx,
                handler: omci_response_handler(),
            },
        };
        self.send(frame, timeout, 0, high_priority, callback).await
    }

    fn build_me(&self, class_id: ClassId, params: ParamData) -> Result<ManagedEntity> {
        ManagedEntity::new(class_id, params).map_err(|error| {
            tracing::error!(device_id = %self.device_id(), %error, "cannot generate ME instance");
            error
        })
    }

    async fn send_create(
        &self,
        entity: &ManagedEntity,
        transaction_id: u16,
        add_defaults: bool,
        timeout: Duration,
        high_priority: bool,
        response_tx: mpsc::Sender<Message>,
    ) -> Result<()> {
        let frame = wire::encode_create_request(entity, transaction_id, add_defaults).map_err(
            |error| {
                tracing::error!(
                    device_id = %self.device_id(),
                    entity = entity.name(),
                    %error,
                    "cannot encode create request"
                );
                error
            },
        )?;
        self.send_me_request(frame, transaction_id, timeout, high_priority, response_tx)
            .await
    }

    async fn send_set(
        &self,
        entity: &ManagedEntity,
        transaction_id: u16,
        timeout: Duration,
        high_priority: bool,
        response_tx: mpsc::Sender<Message>,
    ) -> Result<()> {
        let frame = wire::encode_set_request(entity, transaction_id).map_err(|error| {
            tracing::error!(
                device_id = %self.device_id(),
                entity = entity.name(),
                %error,
                "cannot encode set request"
            );
            error
        })?;
        self.send_me_request(frame, transaction_id, timeout, high_priority, response_tx)
            .await
    }

    // ========================================================================
    // ONU DATA (MIB SYNCHRONIZATION)
    // ========================================================================

    /// Send a MIB-Reset request for OnuData
    pub async fn send_mib_reset(&self, timeout: Duration, high_priority: bool) -> Result<()> {
        tracing::debug!(device_id = %self.device_id(), "send MIB reset");
        let transaction_id = self.next_tid(high_priority);
        let frame = wire::encode_mib_reset_request(transaction_id)?;
        self.send_me_request(
            frame,
            transaction_id,
            timeout,
            high_priority,
            self.mib_upload_channel(),
        )
        .await
    }

    /// Send a MIB-Upload request for OnuData and reset the upload progress
    pub async fn send_mib_upload(&self, timeout: Duration, high_priority: bool) -> Result<()> {
        tracing::debug!(device_id = %self.device_id(), "send MIB upload");
        let transaction_id = self.next_tid(high_priority);
        let frame = wire::encode_mib_upload_request(transaction_id)?;
        self.reset_upload_progress();
        self.send_me_request(
            frame,
            transaction_id,
            timeout,
            high_priority,
            self.mib_upload_channel(),
        )
        .await
    }

    /// Send the next MIB-Upload-Next request; the command sequence number
    /// advances on each call
    pub async fn send_mib_upload_next(&self, timeout: Duration, high_priority: bool) -> Result<()> {
        let sequence_number = self.upload_progress().sequence_number;
        tracing::debug!(
            device_id = %self.device_id(),
            sequence_number,
            "send MIB upload next"
        );
        let transaction_id = self.next_tid(high_priority);
        let frame = wire::encode_mib_upload_next_request(transaction_id, sequence_number)?;
        self.advance_upload_sequence();
        self.send_me_request(
            frame,
            transaction_id,
            timeout,
            high_priority,
            self.mib_upload_channel(),
        )
        .await
    }

    // ========================================================================
    // DOWNLOAD CATALOG (FIXED-ATTRIBUTE CREATES AND SETS)
    // ========================================================================

    /// Create the GAL Ethernet profile used by the GEM interworking chain
    pub async fn send_create_gal_ethernet_profile(
        &self,
        timeout: Duration,
        high_priority: bool,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        tracing::debug!(device_id = %self.device_id(), transaction_id, "send GAL Ethernet profile create");

        let params = ParamData {
            entity_id: me::GAL_ETHERNET_ENTITY_ID,
            attributes: [(
                "MaximumGemPayloadSize",
                AttributeValue::U16(me::MAX_GEM_PAYLOAD_SIZE),
            )]
            .into_iter()
            .collect(),
        };
        let entity = self.build_me(ClassId::GalEthernetProfile, params)?;
        // All set-by-create attributes are provided, no default fill needed
        self.send_create(
            &entity,
            transaction_id,
            false,
            timeout,
            high_priority,
            self.mib_download_channel(),
        )
        .await?;
        Ok(entity)
    }

    /// Set the ONU2-G connectivity mode
    pub async fn send_set_onu2g(
        &self,
        timeout: Duration,
        high_priority: bool,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        tracing::debug!(device_id = %self.device_id(), transaction_id, "send ONU2-G set");

        // ONU2-G instance id is defined to be 0. The ONU could be asked
        // whether it really supports mode 5 via ConnectivityCapability.
        let params = ParamData {
            entity_id: 0,
            attributes: [(
                "CurrentConnectivityMode",
                AttributeValue::U8(me::CONNECTIVITY_MODE),
            )]
            .into_iter()
            .collect(),
        };
        let entity = self.build_me(ClassId::Onu2G, params)?;
        self.send_set(
            &entity,
            transaction_id,
            timeout,
            high_priority,
            self.mib_download_channel(),
        )
        .await?;
        Ok(entity)
    }

    /// Create the MAC bridge service profile for a UNI port
    pub async fn send_create_mb_service_profile(
        &self,
        uni_port: &UniPort,
        timeout: Duration,
        high_priority: bool,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        let entity_id =
            me::MAC_BRIDGE_SERVICE_PROFILE_ENTITY_ID + u16::from(uni_port.mac_bridge_port_no);
        tracing::debug!(
            device_id = %self.device_id(),
            transaction_id,
            entity_id,
            "send MBSP create"
        );

        let params = ParamData {
            entity_id,
            attributes: [
                ("Priority", AttributeValue::U16(0x8000)),
                ("MaxAge", AttributeValue::U16(20 * 256)),
                ("HelloTime", AttributeValue::U16(2 * 256)),
                ("ForwardDelay", AttributeValue::U16(15 * 256)),
            ]
            .into_iter()
            .collect(),
        };
        let entity = self.build_me(ClassId::MacBridgeServiceProfile, params)?;
        // Untouched set-by-create attributes are filled from catalog defaults
        self.send_create(
            &entity,
            transaction_id,
            true,
            timeout,
            high_priority,
            self.mib_download_channel(),
        )
        .await?;
        Ok(entity)
    }

    /// Create the MAC bridge port configuration data binding a UNI port to
    /// its bridge
    pub async fn send_create_mbp_config_data(
        &self,
        uni_port: &UniPort,
        timeout: Duration,
        high_priority: bool,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        let entity_id = me::MAC_BRIDGE_PORT_ANI_ENTITY_ID + uni_port.entity_id;
        tracing::debug!(
            device_id = %self.device_id(),
            transaction_id,
            entity_id,
            "send MBPCD create"
        );

        let params = ParamData {
            entity_id,
            attributes: [
                (
                    "BridgeIdPointer",
                    AttributeValue::U16(
                        me::MAC_BRIDGE_SERVICE_PROFILE_ENTITY_ID
                            + u16::from(uni_port.mac_bridge_port_no),
                    ),
                ),
                ("PortNum", AttributeValue::U8(uni_port.mac_bridge_port_no)),
                ("TpType", AttributeValue::U8(uni_port.port_type as u8)),
                ("TpPointer", AttributeValue::U16(uni_port.entity_id)),
            ]
            .into_iter()
            .collect(),
        };
        let entity = self.build_me(ClassId::MacBridgePortConfigurationData, params)?;
        self.send_create(
            &entity,
            transaction_id,
            true,
            timeout,
            high_priority,
            self.mib_download_channel(),
        )
        .await?;
        Ok(entity)
    }

    /// Create the extended VLAN tagging operation configuration data for a
    /// UNI port
    pub async fn send_create_evto_config_data(
        &self,
        uni_port: &UniPort,
        timeout: Duration,
        high_priority: bool,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        // Same entity id scheme as the MBSP, by convention
        let entity_id =
            me::MAC_BRIDGE_SERVICE_PROFILE_ENTITY_ID + u16::from(uni_port.mac_bridge_port_no);
        tracing::debug!(
            device_id = %self.device_id(),
            transaction_id,
            entity_id,
            "send EVTOCD create"
        );

        let association_type = match uni_port.port_type {
            UniPortType::Veip => 10u8,
            UniPortType::PptpEthernetUni => 2u8,
        };
        let params = ParamData {
            entity_id,
            attributes: [
                ("AssociationType", AttributeValue::U8(association_type)),
                (
                    "AssociatedMePointer",
                    AttributeValue::U16(uni_port.entity_id),
                ),
            ]
            .into_iter()
            .collect(),
        };
        let entity = self.build_me(
            ClassId::ExtendedVlanTaggingOperationConfigurationData,
            params,
        )?;
        self.send_create(
            &entity,
            transaction_id,
            false,
            timeout,
            high_priority,
            self.mib_download_channel(),
        )
        .await?;
        Ok(entity)
    }

    // ========================================================================
    // CALLER-DIRECTED SETTERS AND GENERIC GET
    // ========================================================================

    /// Set ONU-G attributes; responses go to the caller's channel
    pub async fn send_set_onu_g(
        &self,
        attributes: AttributeValueMap,
        timeout: Duration,
        high_priority: bool,
        response_tx: mpsc::Sender<Message>,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        tracing::debug!(device_id = %self.device_id(), transaction_id, "send ONU-G set");

        // ONU-G instance id is defined to be 0
        let params = ParamData {
            entity_id: 0,
            attributes,
        };
        let entity = self.build_me(ClassId::OnuG, params)?;
        self.send_set(&entity, transaction_id, timeout, high_priority, response_tx)
            .await?;
        Ok(entity)
    }

    /// Set UNI-G attributes on the given instance; responses go to the
    /// caller's channel
    pub async fn send_set_uni_g(
        &self,
        entity_id: u16,
        attributes: AttributeValueMap,
        timeout: Duration,
        high_priority: bool,
        response_tx: mpsc::Sender<Message>,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        tracing::debug!(device_id = %self.device_id(), transaction_id, entity_id, "send UNI-G set");

        let params = ParamData {
            entity_id,
            attributes,
        };
        let entity = self.build_me(ClassId::UniG, params)?;
        self.send_set(&entity, transaction_id, timeout, high_priority, response_tx)
            .await?;
        Ok(entity)
    }

    /// Set VEIP attributes on the given instance; responses go to the
    /// caller's channel
    pub async fn send_set_veip(
        &self,
        entity_id: u16,
        attributes: AttributeValueMap,
        timeout: Duration,
        high_priority: bool,
        response_tx: mpsc::Sender<Message>,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        tracing::debug!(device_id = %self.device_id(), transaction_id, entity_id, "send VEIP set");

        let params = ParamData {
            entity_id,
            attributes,
        };
        let entity = self.build_me(ClassId::VirtualEthernetInterfacePoint, params)?;
        self.send_set(&entity, transaction_id, timeout, high_priority, response_tx)
            .await?;
        Ok(entity)
    }

    /// Get the named attributes of any catalog Managed Entity; responses go
    /// to the MIB-upload FSM channel
    pub async fn send_get_me(
        &self,
        class_id: ClassId,
        entity_id: u16,
        attribute_names: &[&'static str],
        timeout: Duration,
        high_priority: bool,
    ) -> Result<ManagedEntity> {
        let transaction_id = self.next_tid(high_priority);
        tracing::debug!(
            device_id = %self.device_id(),
            ?class_id,
            transaction_id,
            "send get request"
        );

        let params = ParamData {
            entity_id,
            attributes: attribute_names
                .iter()
                .map(|name| (*name, AttributeValue::U8(0)))
                .collect(),
        };
        let entity = self.build_me(class_id, params)?;
        let frame = wire::encode_get_request(&entity, transaction_id).map_err(|error| {
            tracing::error!(
                device_id = %self.device_id(),
                entity = entity.name(),
                %error,
                "cannot encode get request"
            );
            error
        })?;
        self.send_me_request(
            frame,
            transaction_id,
            timeout,
            high_priority,
            self.mib_upload_channel(),
        )
        .await?;
        Ok(entity)
    }
}
