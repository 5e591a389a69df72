//! End-to-end scenarios against mock collaborators: request building,
//! dispatch, response correlation, and autonomous routing.

mod helpers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::BytesMut;

use helpers::{harness, harness_with_config};
use omci_cc::me::{self, ClassId};
use omci_cc::wire::{self, MessageType, Operation};
use omci_cc::{AttributeValue, ChannelConfig, Error, Message, UniPort, UniPortType};

const TIMEOUT: Duration = Duration::from_secs(10);

fn response_frame(transaction_id: u16, operation: Operation, contents: &[u8]) -> BytesMut {
    let pkt = wire::encode_baseline_frame(
        transaction_id,
        MessageType::response(operation),
        ClassId::OnuData.value(),
        0,
        contents,
    )
    .unwrap();
    BytesMut::from(&pkt[..])
}

fn autonomous_frame(transaction_id: u16, operation: Operation) -> BytesMut {
    let pkt = wire::encode_baseline_frame(
        transaction_id,
        MessageType::autonomous(operation),
        ClassId::OnuG.value(),
        0,
        &[],
    )
    .unwrap();
    BytesMut::from(&pkt[..])
}

// ============================================================================
// MIB SYNCHRONIZATION ROUND TRIPS
// ============================================================================

#[test_log::test(tokio::test)]
async fn mib_reset_round_trip() {
    let mut h = harness();

    h.channel.send_mib_reset(TIMEOUT, true).await.unwrap();

    // First high-priority allocation is 0x8000
    let request = h.sent_rx.recv().await.unwrap();
    assert_eq!(&request.message[0..2], &[0x80, 0x00]);
    assert_eq!(request.message[2], 0x4F); // MibReset | AR
    assert_eq!(request.from_adapter, "brcm_openomci_onu");
    assert_eq!(request.to_adapter, "openolt");
    assert_eq!(request.to_device_id, "onu-1");
    assert_eq!(request.proxy_device_id, "olt-proxy-1");

    assert_eq!(h.channel.pending_requests(), 1);
    assert!(h.channel.has_pending_request(0x8000));

    let mut response = response_frame(0x8000, Operation::MibReset, &[]);
    h.channel.receive(&mut response).await.unwrap();

    let message = h.upload_rx.recv().await.unwrap();
    match message {
        Message::Omci(omci) => {
            assert_eq!(omci.frame.header.transaction_id, 0x8000);
            assert_eq!(
                omci.frame.header.message_type,
                MessageType::response(Operation::MibReset)
            );
        }
        other => panic!("expected OMCI envelope, got {:?}", other),
    }

    assert_eq!(h.channel.pending_requests(), 0);
    let counters = h.channel.counters();
    assert_eq!(counters.tx_frames, 1);
    assert_eq!(counters.rx_frames, 1);
    assert_eq!(counters.rx_onu_frames, 0);
}

#[test_log::test(tokio::test)]
async fn mib_upload_sequence_allocates_consecutive_tids() {
    let mut h = harness();

    // Reset occupies 0x8000 and completes
    h.channel.send_mib_reset(TIMEOUT, true).await.unwrap();
    h.sent_rx.recv().await.unwrap();
    let mut response = response_frame(0x8000, Operation::MibReset, &[]);
    h.channel.receive(&mut response).await.unwrap();
    h.upload_rx.recv().await.unwrap();

    // Upload takes 0x8001, the three upload-nexts 0x8002..0x8004
    h.channel.send_mib_upload(TIMEOUT, true).await.unwrap();
    for _ in 0..3 {
        h.channel.send_mib_upload_next(TIMEOUT, true).await.unwrap();
    }

    let upload = h.sent_rx.recv().await.unwrap();
    assert_eq!(&upload.message[0..2], &[0x80, 0x01]);
    assert_eq!(upload.message[2], 0x4D); // MibUpload | AR

    for (expected_tid, expected_seq) in [(0x8002u16, 0u16), (0x8003, 1), (0x8004, 2)] {
        let next = h.sent_rx.recv().await.unwrap();
        assert_eq!(&next.message[0..2], &expected_tid.to_be_bytes());
        assert_eq!(next.message[2], 0x4E); // MibUploadNext | AR
        assert_eq!(&next.message[8..10], &expected_seq.to_be_bytes());
    }

    assert_eq!(h.channel.upload_progress().sequence_number, 3);
    assert_eq!(h.channel.pending_requests(), 4);
}

#[test_log::test(tokio::test)]
async fn mib_upload_response_records_command_count() {
    let mut h = harness();

    h.channel.send_mib_upload(TIMEOUT, true).await.unwrap();
    h.sent_rx.recv().await.unwrap();
    assert_eq!(h.channel.upload_progress().command_count, 0);

    let mut response = response_frame(0x8000, Operation::MibUpload, &287u16.to_be_bytes());
    h.channel.receive(&mut response).await.unwrap();
    h.upload_rx.recv().await.unwrap();

    assert_eq!(h.channel.upload_progress().command_count, 287);

    // A new upload cycle starts from scratch
    h.channel.send_mib_upload(TIMEOUT, true).await.unwrap();
    assert_eq!(h.channel.upload_progress().command_count, 0);
}

// ============================================================================
// AUTONOMOUS ROUTING
// ============================================================================

#[test_log::test(tokio::test)]
async fn alarm_notification_goes_to_the_sink() {
    let mut h = harness();

    let mut frame = autonomous_frame(0, Operation::AlarmNotification);
    let result = h.channel.receive(&mut frame).await;
    assert!(matches!(result, Err(Error::UnsupportedMessage(_))));

    assert_eq!(h.sink.alarms.load(Ordering::Relaxed), 1);
    assert_eq!(h.channel.pending_requests(), 0);

    let counters = h.channel.counters();
    assert_eq!(counters.rx_onu_frames, 1);
    assert_eq!(counters.rx_onu_discards, 0);

    // No envelope reaches the FSMs
    assert!(h.upload_rx.try_recv().is_err());
    assert!(h.download_rx.try_recv().is_err());
}

#[test_log::test(tokio::test)]
async fn unknown_autonomous_type_is_discarded() {
    let h = harness();

    let mut frame = autonomous_frame(0, Operation::SynchronizeTime);
    let result = h.channel.receive(&mut frame).await;
    assert!(matches!(result, Err(Error::UnsupportedMessage(_))));

    let counters = h.channel.counters();
    assert_eq!(counters.rx_onu_frames, 1);
    assert_eq!(counters.rx_onu_discards, 1);
    assert_eq!(h.sink.alarms.load(Ordering::Relaxed), 0);
}

#[test_log::test(tokio::test)]
async fn autonomous_frame_with_nonzero_tcid_is_a_protocol_violation() {
    let h = harness();

    let mut frame = autonomous_frame(0x0042, Operation::AlarmNotification);
    let result = h.channel.receive(&mut frame).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
    assert_eq!(h.sink.alarms.load(Ordering::Relaxed), 0);
}

// ============================================================================
// INGRESS NORMALIZATION
// ============================================================================

#[test_log::test(tokio::test)]
async fn bad_trailer_is_autocorrected_before_decode() {
    let mut h = harness();

    h.channel.send_mib_reset(TIMEOUT, true).await.unwrap();
    h.sent_rx.recv().await.unwrap();

    let mut response = response_frame(0x8000, Operation::MibReset, &[]);
    response[42] = 0x00;
    response[43] = 0x00;

    h.channel.receive(&mut response).await.unwrap();
    assert_eq!(&response[42..44], &[0x00, 0x28]);
    h.upload_rx.recv().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn trailer_repair_can_be_disabled() {
    let h = harness_with_config(
        ChannelConfig::builder()
            .repair_baseline_trailer(false)
            .build(),
    );

    let mut frame = autonomous_frame(0, Operation::AlarmNotification);
    frame[42] = 0x00;
    frame[43] = 0x00;

    let _ = h.channel.receive(&mut frame).await;
    assert_eq!(&frame[42..44], &[0x00, 0x00]);
}

#[test_log::test(tokio::test)]
async fn short_ingress_is_rejected_without_modification() {
    let h = harness();

    let mut short = BytesMut::from(&[0xFFu8; 43][..]);
    let result = h.channel.receive(&mut short).await;
    assert!(matches!(result, Err(Error::FrameTooShort { length: 43 })));
    assert!(short.iter().all(|b| *b == 0xFF));
}

#[test_log::test(tokio::test)]
async fn unregistered_response_leaves_the_map_unchanged() {
    let mut h = harness();

    // Nothing outstanding at all
    let mut stray = response_frame(0x0042, Operation::Set, &[]);
    let result = h.channel.receive(&mut stray).await;
    assert!(matches!(
        result,
        Err(Error::NoPendingRequest {
            transaction_id: 0x0042
        })
    ));
    assert_eq!(h.channel.pending_requests(), 0);

    // One outstanding request is untouched by a stray response
    h.channel.send_mib_reset(TIMEOUT, true).await.unwrap();
    h.sent_rx.recv().await.unwrap();
    let mut stray = response_frame(0x0042, Operation::Set, &[]);
    assert!(h.channel.receive(&mut stray).await.is_err());
    assert_eq!(h.channel.pending_requests(), 1);
    assert!(h.channel.has_pending_request(0x8000));
}

// ============================================================================
// DISPATCHER FAILURE MODES
// ============================================================================

#[test_log::test(tokio::test)]
async fn transport_failure_keeps_descriptors_queued_in_order() {
    let mut h = harness();

    h.transport.fail.store(true, Ordering::Relaxed);
    h.channel.send_mib_reset(TIMEOUT, false).await.unwrap();
    h.channel.send_mib_upload(TIMEOUT, false).await.unwrap();

    // Give the dispatcher tasks a chance to fail
    tokio::task::yield_now().await;
    assert!(h.sent_rx.try_recv().is_err());
    assert_eq!(h.channel.counters().tx_frames, 0);

    // The next enqueue drains the backlog in FIFO order
    h.transport.fail.store(false, Ordering::Relaxed);
    h.channel.send_mib_upload_next(TIMEOUT, false).await.unwrap();

    let first = h.sent_rx.recv().await.unwrap();
    assert_eq!(first.message[2], 0x4F); // MibReset | AR
    let second = h.sent_rx.recv().await.unwrap();
    assert_eq!(second.message[2], 0x4D); // MibUpload | AR
    let third = h.sent_rx.recv().await.unwrap();
    assert_eq!(third.message[2], 0x4E); // MibUploadNext | AR
    assert_eq!(h.channel.counters().tx_frames, 3);
}

#[test_log::test(tokio::test)]
async fn device_lookup_failure_aborts_the_drain() {
    let mut h = harness();

    h.devices.fail.store(true, Ordering::Relaxed);
    h.channel.send_mib_reset(TIMEOUT, false).await.unwrap();

    tokio::task::yield_now().await;
    assert!(h.sent_rx.try_recv().is_err());

    h.devices.fail.store(false, Ordering::Relaxed);
    h.channel.send_mib_upload(TIMEOUT, false).await.unwrap();
    assert_eq!(h.sent_rx.recv().await.unwrap().message[2], 0x4F);
    assert_eq!(h.sent_rx.recv().await.unwrap().message[2], 0x4D);
}

// ============================================================================
// REQUEST CATALOG
// ============================================================================

#[test_log::test(tokio::test)]
async fn gal_ethernet_profile_create_registers_one_callback_and_one_frame() {
    let mut h = harness();

    let entity = h
        .channel
        .send_create_gal_ethernet_profile(TIMEOUT, false)
        .await
        .unwrap();
    assert_eq!(entity.class_id(), ClassId::GalEthernetProfile);
    assert_eq!(entity.entity_id(), me::GAL_ETHERNET_ENTITY_ID);

    assert_eq!(h.channel.pending_requests(), 1);
    assert!(h.channel.has_pending_request(0x0001));

    let request = h.sent_rx.recv().await.unwrap();
    assert!(h.sent_rx.try_recv().is_err());
    assert_eq!(&request.message[0..2], &[0x00, 0x01]);
    assert_eq!(request.message[2], 0x44); // Create | AR
    assert_eq!(&request.message[4..6], &272u16.to_be_bytes());
    assert_eq!(&request.message[6..8], &[0x00, 0x01]); // entity id 1
    assert_eq!(&request.message[8..10], &[0x00, 0x30]); // max GEM payload 48
}

#[test_log::test(tokio::test)]
async fn onu2g_set_carries_the_connectivity_mode() {
    let mut h = harness();

    h.channel.send_set_onu2g(TIMEOUT, false).await.unwrap();

    let request = h.sent_rx.recv().await.unwrap();
    assert_eq!(request.message[2], 0x48); // Set | AR
    assert_eq!(&request.message[4..6], &257u16.to_be_bytes());
    assert_eq!(&request.message[8..10], &[0x00, 0x10]); // mask for index 12
    assert_eq!(request.message[10], 5); // connectivity mode
}

#[test_log::test(tokio::test)]
async fn bridge_chain_derives_instance_ids_from_the_uni_port() {
    let mut h = harness();
    let uni = UniPort {
        entity_id: 0x0101,
        mac_bridge_port_no: 1,
        port_type: UniPortType::PptpEthernetUni,
    };

    let mbsp = h
        .channel
        .send_create_mb_service_profile(&uni, TIMEOUT, false)
        .await
        .unwrap();
    assert_eq!(mbsp.entity_id(), 0x0202);

    let mbpcd = h
        .channel
        .send_create_mbp_config_data(&uni, TIMEOUT, false)
        .await
        .unwrap();
    assert_eq!(mbpcd.entity_id(), 0x2102 + 0x0101);

    let mbsp_frame = h.sent_rx.recv().await.unwrap();
    // Defaults fill every set-by-create attribute: 17 contents bytes
    assert_eq!(&mbsp_frame.message[6..8], &0x0202u16.to_be_bytes());
    assert_eq!(&mbsp_frame.message[11..13], &[0x80, 0x00]); // Priority
    assert_eq!(&mbsp_frame.message[13..15], &[0x14, 0x00]); // MaxAge

    let mbpcd_frame = h.sent_rx.recv().await.unwrap();
    assert_eq!(&mbpcd_frame.message[8..10], &0x0202u16.to_be_bytes()); // BridgeIdPointer
    assert_eq!(mbpcd_frame.message[10], 1); // PortNum
    assert_eq!(mbpcd_frame.message[11], 1); // TpType PPTP Ethernet UNI
    assert_eq!(&mbpcd_frame.message[12..14], &0x0101u16.to_be_bytes()); // TpPointer
}

#[test_log::test(tokio::test)]
async fn evto_create_uses_the_veip_association_type() {
    let mut h = harness();
    let veip_uni = UniPort {
        entity_id: 0x0102,
        mac_bridge_port_no: 2,
        port_type: UniPortType::Veip,
    };

    h.channel
        .send_create_evto_config_data(&veip_uni, TIMEOUT, false)
        .await
        .unwrap();

    let request = h.sent_rx.recv().await.unwrap();
    assert_eq!(&request.message[4..6], &171u16.to_be_bytes());
    assert_eq!(request.message[8], 10); // association type VEIP
    assert_eq!(&request.message[9..11], &0x0102u16.to_be_bytes());
}

#[test_log::test(tokio::test)]
async fn veip_set_routes_the_response_to_the_caller_channel() {
    let mut h = harness();
    let (response_tx, mut response_rx) = tokio::sync::mpsc::channel(4);

    h.channel
        .send_set_veip(
            0x0102,
            [("AdministrativeState", AttributeValue::U8(0))]
                .into_iter()
                .collect(),
            TIMEOUT,
            false,
            response_tx,
        )
        .await
        .unwrap();
    h.sent_rx.recv().await.unwrap();

    let mut response = response_frame(0x0001, Operation::Set, &[]);
    h.channel.receive(&mut response).await.unwrap();

    let message = response_rx.recv().await.unwrap();
    assert!(matches!(message, Message::Omci(_)));
    assert!(h.upload_rx.try_recv().is_err());
    assert!(h.download_rx.try_recv().is_err());
}

#[test_log::test(tokio::test)]
async fn get_request_masks_the_requested_attributes() {
    let mut h = harness();

    h.channel
        .send_get_me(
            ClassId::OnuG,
            0,
            &["VendorId", "SerialNumber"],
            TIMEOUT,
            false,
        )
        .await
        .unwrap();

    let request = h.sent_rx.recv().await.unwrap();
    assert_eq!(request.message[2], 0x49); // Get | AR
    assert_eq!(&request.message[4..6], &256u16.to_be_bytes());
    // VendorId is index 1, SerialNumber index 3
    assert_eq!(&request.message[8..10], &[0xA0, 0x00]);
}

#[test_log::test(tokio::test)]
async fn rejected_attributes_leave_no_partial_state() {
    let mut h = harness();
    let (response_tx, _response_rx) = tokio::sync::mpsc::channel(4);

    let result = h
        .channel
        .send_set_onu_g(
            [("NoSuchAttribute", AttributeValue::U8(1))]
                .into_iter()
                .collect(),
            TIMEOUT,
            false,
            response_tx,
        )
        .await;
    assert!(matches!(result, Err(Error::MeDefinition(_))));

    assert_eq!(h.channel.pending_requests(), 0);
    tokio::task::yield_now().await;
    assert!(h.sent_rx.try_recv().is_err());
}
