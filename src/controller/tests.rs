use std::sync::Arc;

use tokio::io::duplex;

use super::{ControllerConfig, HapController};
use crate::characteristic::{Characteristic, CharacteristicValue};
use crate::error::HapError;
use crate::pairing::store::{MemoryStore, PairingStore};
use crate::testing::SimulatedAccessory;

const SETUP_CODE: &str = "123-45-678";
const ACCESSORY_ID: &str = "AA:BB:CC:DD:EE:FF";

async fn controller() -> HapController {
    HapController::new(Arc::new(MemoryStore::new()))
        .await
        .unwrap()
}

/// Run one serve pass: hand the accessory a stream, run `f` with the other
/// end, and get the accessory back once the client side is dropped.
macro_rules! with_accessory {
    ($accessory:expr, $client:ident, $body:expr) => {{
        let ($client, server) = duplex(4096);
        let task = tokio::spawn($accessory.serve(server));
        let out = $body;
        (task.await.unwrap().unwrap(), out)
    }};
}

#[tokio::test]
async fn identity_created_once_and_persisted() {
    let store = Arc::new(MemoryStore::new());
    let first = HapController::new(Arc::clone(&store) as Arc<dyn PairingStore>)
        .await
        .unwrap();
    let second = HapController::new(store).await.unwrap();

    assert_eq!(first.pairing_id(), second.pairing_id());
}

#[tokio::test]
async fn pair_persists_exactly_one_record() {
    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = controller().await;

    let (accessory, record) = with_accessory!(accessory, client, {
        controller
            .pair_over(client, ACCESSORY_ID, SETUP_CODE)
            .await
            .unwrap()
    });

    assert_eq!(record.accessory_pairing_id, ACCESSORY_ID);
    assert_eq!(record.accessory_ltpk, accessory.ltpk());
    assert_eq!(controller.store().list().await, vec![ACCESSORY_ID.to_string()]);
}

#[tokio::test]
async fn pair_with_wrong_code_persists_nothing() {
    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = controller().await;

    let (accessory, err) = with_accessory!(accessory, client, {
        controller
            .pair_over(client, ACCESSORY_ID, "000-00-000")
            .await
            .unwrap_err()
    });

    assert!(matches!(err, HapError::AuthenticationFailed(_)));
    assert!(controller.store().list().await.is_empty());
    assert!(!accessory.has_pairings());
}

#[tokio::test]
async fn connect_without_pairing_fails() {
    let controller = controller().await;
    let (client, _server) = duplex(4096);

    let err = controller
        .connect_over(client, ACCESSORY_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, HapError::UnknownPeer { .. }));
}

#[tokio::test]
async fn pair_connect_read_write_roundtrip() {
    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = controller().await;

    let (accessory, _) = with_accessory!(accessory, client, {
        controller
            .pair_over(client, ACCESSORY_ID, SETUP_CODE)
            .await
            .unwrap()
    });

    let (accessory, ()) = with_accessory!(accessory, client, {
        let mut conn = controller.connect_over(client, ACCESSORY_ID).await.unwrap();

        let database = conn.accessories().await.unwrap();
        let brightness: Characteristic = database
            .accessory(1)
            .and_then(|a| a.characteristic(10))
            .cloned()
            .unwrap();
        assert_eq!(brightness.value, Some(CharacteristicValue::Int(50)));

        let entries = conn.read_characteristics(&[(1, 9), (1, 10)]).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, Some(CharacteristicValue::Bool(false)));

        conn.write_characteristic(1, &brightness, CharacteristicValue::Int(75))
            .await
            .unwrap();

        let entries = conn.read_characteristics(&[(1, 10)]).await.unwrap();
        assert_eq!(entries[0].value, Some(CharacteristicValue::Int(75)));
    });

    assert_eq!(
        accessory.value_of(1, 10),
        Some(CharacteristicValue::Int(75))
    );
}

#[tokio::test]
async fn invalid_write_never_reaches_the_accessory() {
    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = controller().await;

    let (accessory, _) = with_accessory!(accessory, client, {
        controller
            .pair_over(client, ACCESSORY_ID, SETUP_CODE)
            .await
            .unwrap()
    });

    let (_accessory, ()) = with_accessory!(accessory, client, {
        let mut conn = controller.connect_over(client, ACCESSORY_ID).await.unwrap();

        let database = conn.accessories().await.unwrap();
        let brightness = database
            .accessory(1)
            .and_then(|a| a.characteristic(10))
            .cloned()
            .unwrap();

        let sent_before = conn.session().write_count();
        let err = conn
            .write_characteristic(1, &brightness, CharacteristicValue::Int(400))
            .await
            .unwrap_err();
        assert!(matches!(err, HapError::InvalidValue { aid: 1, iid: 10, .. }));
        assert_eq!(conn.session().write_count(), sent_before);
    });
}

#[tokio::test]
async fn rejected_write_surfaces_the_entry_status() {
    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = controller().await;

    let (accessory, _) = with_accessory!(accessory, client, {
        controller
            .pair_over(client, ACCESSORY_ID, SETUP_CODE)
            .await
            .unwrap()
    });

    let (_accessory, ()) = with_accessory!(accessory, client, {
        let mut conn = controller.connect_over(client, ACCESSORY_ID).await.unwrap();

        // A value that passes local validation but targets an iid the
        // accessory does not have; the 207 entry status must become an error
        let database = conn.accessories().await.unwrap();
        let mut phantom = database
            .accessory(1)
            .and_then(|a| a.characteristic(10))
            .cloned()
            .unwrap();
        phantom.iid = 99;

        let err = conn
            .write_characteristic(1, &phantom, CharacteristicValue::Int(50))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HapError::WriteFailed {
                aid: 1,
                iid: 99,
                status: -70409,
            }
        ));
    });
}

#[tokio::test]
async fn reconnect_establishes_a_fresh_session() {
    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = controller().await;

    let (accessory, _) = with_accessory!(accessory, client, {
        controller
            .pair_over(client, ACCESSORY_ID, SETUP_CODE)
            .await
            .unwrap()
    });

    let (accessory, ()) = with_accessory!(accessory, client, {
        let mut conn = controller.connect_over(client, ACCESSORY_ID).await.unwrap();
        conn.accessories().await.unwrap();
    });

    // A second connect runs pair-verify again and works from counter zero
    let (_accessory, ()) = with_accessory!(accessory, client, {
        let mut conn = controller.connect_over(client, ACCESSORY_ID).await.unwrap();
        assert_eq!(conn.session().write_count(), 0);
        conn.accessories().await.unwrap();
    });
}

#[tokio::test]
async fn unpair_removes_both_sides() {
    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = controller().await;

    let (accessory, _) = with_accessory!(accessory, client, {
        controller
            .pair_over(client, ACCESSORY_ID, SETUP_CODE)
            .await
            .unwrap()
    });

    let (accessory, ()) = with_accessory!(accessory, client, {
        controller.unpair_over(client, ACCESSORY_ID).await.unwrap();
    });

    assert!(!accessory.has_pairings());
    assert!(controller.store().list().await.is_empty());
}

#[tokio::test]
async fn closed_transport_surfaces_as_transport_error() {
    let controller = controller().await;

    let (client, server) = duplex(4096);
    drop(server);

    let err = controller
        .pair_over(client, ACCESSORY_ID, SETUP_CODE)
        .await
        .unwrap_err();
    assert!(matches!(err, HapError::TransportError(_)));
    assert!(controller.store().list().await.is_empty());
}

#[tokio::test]
async fn handshake_timeout_maps_to_timeout_error() {
    let controller = HapController::with_config(
        Arc::new(MemoryStore::new()),
        ControllerConfig {
            handshake_timeout: std::time::Duration::from_millis(50),
            request_timeout: std::time::Duration::from_millis(50),
        },
    )
    .await
    .unwrap();

    // Nothing ever answers on the other end
    let (client, _server) = duplex(4096);
    let err = controller
        .pair_over(client, ACCESSORY_ID, SETUP_CODE)
        .await
        .unwrap_err();
    assert!(matches!(err, HapError::Timeout { .. }));
}
