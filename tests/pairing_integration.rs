//! Full pairing lifecycle through the public API.

use std::sync::Arc;

use hap_controller::testing::SimulatedAccessory;
use hap_controller::{CharacteristicValue, HapController, HapError, MemoryStore, PairingStore};
use tokio::io::duplex;

const SETUP_CODE: &str = "031-45-154";
const ACCESSORY_ID: &str = "5F:2E:9A:01:B3:C7";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn pair_connect_control_unpair_lifecycle() {
    init_logging();

    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let store = Arc::new(MemoryStore::new());
    let controller = HapController::new(store).await.unwrap();

    // Pair
    let (client, server) = duplex(4096);
    let serve = tokio::spawn(accessory.serve(server));
    let record = controller
        .pair_over(client, ACCESSORY_ID, SETUP_CODE)
        .await
        .unwrap();
    let accessory = serve.await.unwrap().unwrap();
    assert_eq!(record.accessory_pairing_id, ACCESSORY_ID);

    // Connect and flip the light on
    let (client, server) = duplex(4096);
    let serve = tokio::spawn(accessory.serve(server));
    {
        let mut conn = controller.connect_over(client, ACCESSORY_ID).await.unwrap();
        let db = conn.accessories().await.unwrap();
        let on = db
            .accessory(1)
            .and_then(|a| a.characteristic(9))
            .cloned()
            .unwrap();
        assert_eq!(on.value, Some(CharacteristicValue::Bool(false)));

        conn.write_characteristic(1, &on, CharacteristicValue::Bool(true))
            .await
            .unwrap();
        let entries = conn.read_characteristics(&[(1, 9)]).await.unwrap();
        assert_eq!(entries[0].value, Some(CharacteristicValue::Bool(true)));
    }
    let accessory = serve.await.unwrap().unwrap();
    assert_eq!(accessory.value_of(1, 9), Some(CharacteristicValue::Bool(true)));

    // Unpair; afterwards connect is refused locally
    let (client, server) = duplex(4096);
    let serve = tokio::spawn(accessory.serve(server));
    controller.unpair_over(client, ACCESSORY_ID).await.unwrap();
    let accessory = serve.await.unwrap().unwrap();
    assert!(!accessory.has_pairings());

    let (client, _server) = duplex(4096);
    let err = controller
        .connect_over(client, ACCESSORY_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, HapError::UnknownPeer { .. }));
}

#[tokio::test]
async fn wrong_setup_code_leaves_no_state() {
    init_logging();

    let accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
    let controller = HapController::new(Arc::new(MemoryStore::new()))
        .await
        .unwrap();

    let (client, server) = duplex(4096);
    let serve = tokio::spawn(accessory.serve(server));
    let err = controller
        .pair_over(client, ACCESSORY_ID, "999-99-999")
        .await
        .unwrap_err();
    let accessory = serve.await.unwrap().unwrap();

    assert!(matches!(err, HapError::AuthenticationFailed(_)));
    assert!(!accessory.has_pairings());
    assert!(controller.store().list().await.is_empty());
}
