use std::sync::Arc;

use super::store::{
    ControllerIdentity, FileStore, MemoryStore, PairingRecord, PairingStore, Permissions,
};
use super::{PairSetup, PairVerify, PairingState};
use crate::error::HapError;
use crate::testing::SimulatedAccessory;
use crate::tlv::{Tlv8Writer, TlvType, errors};

const SETUP_CODE: &str = "123-45-678";
const ACCESSORY_ID: &str = "AA:BB:CC:DD:EE:FF";

fn record_for(accessory: &SimulatedAccessory, identity: &ControllerIdentity) -> PairingRecord {
    PairingRecord {
        accessory_pairing_id: accessory.pairing_id().to_string(),
        accessory_ltpk: accessory.ltpk(),
        controller_pairing_id: identity.pairing_id.clone(),
        controller_ltsk: identity.ltsk,
        controller_ltpk: identity.ltpk,
        permissions: Permissions::Admin,
    }
}

/// Drive a full pair-verify against the accessory, panicking on any failure.
fn run_verify(
    accessory: &mut SimulatedAccessory,
    identity: &ControllerIdentity,
) -> super::SessionKeys {
    let mut verify = PairVerify::new(identity.clone(), record_for(accessory, identity));
    let m1 = verify.start().unwrap();
    let m2 = accessory.handle_verify_message(&m1).unwrap();
    let m3 = verify.process_m2(&m2).unwrap();
    let m4 = accessory.handle_verify_message(&m3).unwrap();
    verify.process_m4(&m4).unwrap()
}

mod pair_setup {
    use super::*;

    #[test]
    fn full_exchange_succeeds() {
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        let identity = ControllerIdentity::generate();
        let mut setup = PairSetup::new(identity.clone(), SETUP_CODE);

        let m1 = setup.start().unwrap();
        let m2 = accessory.handle_setup_message(&m1).unwrap();
        let m3 = setup.process_m2(&m2).unwrap();
        let m4 = accessory.handle_setup_message(&m3).unwrap();
        let m5 = setup.process_m4(&m4).unwrap();
        let m6 = accessory.handle_setup_message(&m5).unwrap();
        let result = setup.process_m6(&m6).unwrap();

        assert_eq!(setup.state(), PairingState::Complete);
        assert_eq!(result.accessory_pairing_id, ACCESSORY_ID);
        assert_eq!(result.accessory_ltpk, accessory.ltpk());
        assert!(accessory.has_pairings());
    }

    #[test]
    fn wrong_setup_code_fails_at_m4() {
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        let identity = ControllerIdentity::generate();
        let mut setup = PairSetup::new(identity, "000-00-000");

        let m1 = setup.start().unwrap();
        let m2 = accessory.handle_setup_message(&m1).unwrap();
        let m3 = setup.process_m2(&m2).unwrap();
        let m4 = accessory.handle_setup_message(&m3).unwrap();

        let err = setup.process_m4(&m4).unwrap_err();
        assert!(matches!(err, HapError::AuthenticationFailed(_)));
        assert_eq!(setup.state(), PairingState::Failed);
        assert!(!accessory.has_pairings());
    }

    #[test]
    fn failed_machine_cannot_continue() {
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        let identity = ControllerIdentity::generate();
        let mut setup = PairSetup::new(identity, "000-00-000");

        let m1 = setup.start().unwrap();
        let m2 = accessory.handle_setup_message(&m1).unwrap();
        let m3 = setup.process_m2(&m2).unwrap();
        let m4 = accessory.handle_setup_message(&m3).unwrap();
        setup.process_m4(&m4).unwrap_err();

        let err = setup.process_m4(&m4).unwrap_err();
        assert!(matches!(err, HapError::InvalidState { .. }));
    }

    #[test]
    fn accessory_error_codes_surface() {
        let identity = ControllerIdentity::generate();
        let mut setup = PairSetup::new(identity, SETUP_CODE);
        setup.start().unwrap();

        let busy = Tlv8Writer::new()
            .add_state(2)
            .add_u8(TlvType::Error, errors::BUSY)
            .build();
        let err = setup.process_m2(&busy).unwrap_err();
        assert!(matches!(
            err,
            HapError::AccessoryError {
                code: errors::BUSY
            }
        ));
    }

    #[test]
    fn unexpected_state_tag_rejected() {
        let identity = ControllerIdentity::generate();
        let mut setup = PairSetup::new(identity, SETUP_CODE);
        setup.start().unwrap();

        // An M4 body arriving where M2 was expected
        let wrong = Tlv8Writer::new().add_state(4).build();
        let err = setup.process_m2(&wrong).unwrap_err();
        assert!(matches!(err, HapError::InvalidState { .. }));
    }

    #[test]
    fn messages_out_of_order_rejected() {
        let identity = ControllerIdentity::generate();
        let mut setup = PairSetup::new(identity, SETUP_CODE);

        let err = setup.process_m4(&[]).unwrap_err();
        assert!(matches!(err, HapError::InvalidState { .. }));
    }
}

mod pair_verify {
    use super::*;

    #[test]
    fn full_exchange_derives_session_keys() {
        let identity = ControllerIdentity::generate();
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        accessory.add_pairing(&identity.pairing_id, identity.ltpk);

        let keys = run_verify(&mut accessory, &identity);

        // The accessory's keys are the mirror image of ours
        let theirs = accessory.take_session_keys().unwrap();
        assert_eq!(keys.write_key, theirs.read_key);
        assert_eq!(keys.read_key, theirs.write_key);
        assert_ne!(keys.write_key, keys.read_key);
    }

    #[test]
    fn each_run_derives_fresh_keys() {
        let identity = ControllerIdentity::generate();
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        accessory.add_pairing(&identity.pairing_id, identity.ltpk);

        let first = run_verify(&mut accessory, &identity);
        let second = run_verify(&mut accessory, &identity);
        assert_ne!(first.write_key, second.write_key);
        assert_ne!(first.read_key, second.read_key);
    }

    #[test]
    fn unknown_accessory_id_rejected() {
        let identity = ControllerIdentity::generate();
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        accessory.add_pairing(&identity.pairing_id, identity.ltpk);

        // Record for a different accessory than the one answering
        let mut record = record_for(&accessory, &identity);
        record.accessory_pairing_id = "11:22:33:44:55:66".to_string();

        let mut verify = PairVerify::new(identity, record);
        let m1 = verify.start().unwrap();
        let m2 = accessory.handle_verify_message(&m1).unwrap();

        let err = verify.process_m2(&m2).unwrap_err();
        assert!(matches!(err, HapError::UnknownPeer { .. }));
        assert!(err.requires_repairing());
    }

    #[test]
    fn bad_accessory_signature_rejected() {
        let identity = ControllerIdentity::generate();
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        accessory.add_pairing(&identity.pairing_id, identity.ltpk);
        accessory.corrupt_next_signature();

        let mut verify = PairVerify::new(identity.clone(), record_for(&accessory, &identity));
        let m1 = verify.start().unwrap();
        let m2 = accessory.handle_verify_message(&m1).unwrap();

        let err = verify.process_m2(&m2).unwrap_err();
        assert!(matches!(err, HapError::SignatureInvalid));
        assert_eq!(verify.state(), PairingState::Failed);
    }

    #[test]
    fn unpaired_controller_rejected_at_m4() {
        let identity = ControllerIdentity::generate();
        let mut accessory = SimulatedAccessory::new(ACCESSORY_ID, SETUP_CODE);
        // The accessory knows a different key for this controller id
        accessory.add_pairing(
            &identity.pairing_id,
            *crate::crypto::Ed25519KeyPair::generate().public_key().as_bytes(),
        );

        let mut verify = PairVerify::new(identity.clone(), record_for(&accessory, &identity));
        let m1 = verify.start().unwrap();
        let m2 = accessory.handle_verify_message(&m1).unwrap();
        let m3 = verify.process_m2(&m2).unwrap();
        let m4 = accessory.handle_verify_message(&m3).unwrap();

        let err = verify.process_m4(&m4).unwrap_err();
        assert!(matches!(err, HapError::SignatureInvalid));
    }
}

mod stores {
    use super::*;

    fn sample_record(accessory_id: &str) -> PairingRecord {
        let identity = ControllerIdentity::generate();
        PairingRecord {
            accessory_pairing_id: accessory_id.to_string(),
            accessory_ltpk: [7u8; 32],
            controller_pairing_id: identity.pairing_id,
            controller_ltsk: identity.ltsk,
            controller_ltpk: identity.ltpk,
            permissions: Permissions::User,
        }
    }

    #[tokio::test]
    async fn memory_store_crud() {
        let store = MemoryStore::new();

        assert!(store.get(ACCESSORY_ID).await.is_none());
        store.insert(sample_record(ACCESSORY_ID)).await.unwrap();
        assert!(store.get(ACCESSORY_ID).await.is_some());
        assert_eq!(store.list().await, vec![ACCESSORY_ID.to_string()]);

        store.remove(ACCESSORY_ID).await.unwrap();
        assert!(store.get(ACCESSORY_ID).await.is_none());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn insert_replaces_existing_record() {
        let store = MemoryStore::new();
        store.insert(sample_record(ACCESSORY_ID)).await.unwrap();

        let mut replacement = sample_record(ACCESSORY_ID);
        replacement.accessory_ltpk = [9u8; 32];
        store.insert(replacement).await.unwrap();

        assert_eq!(store.list().await.len(), 1);
        assert_eq!(
            store.get(ACCESSORY_ID).await.unwrap().accessory_ltpk,
            [9u8; 32]
        );
    }

    #[tokio::test]
    async fn identity_round_trips() {
        let store = MemoryStore::new();
        assert!(store.load_identity().await.is_none());

        let identity = ControllerIdentity::generate();
        store.save_identity(&identity).await.unwrap();

        let loaded = store.load_identity().await.unwrap();
        assert_eq!(loaded.pairing_id, identity.pairing_id);
        assert_eq!(loaded.ltpk, identity.ltpk);
    }

    #[tokio::test]
    async fn file_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairings.json");

        let identity = ControllerIdentity::generate();
        {
            let store = FileStore::open(&path).await.unwrap();
            store.save_identity(&identity).await.unwrap();
            store.insert(sample_record(ACCESSORY_ID)).await.unwrap();
            store.insert(sample_record("11:22:33:44:55:66")).await.unwrap();
        }

        let store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.load_identity().await.unwrap().ltpk, identity.ltpk);
        assert_eq!(store.list().await.len(), 2);
        assert_eq!(
            store.get(ACCESSORY_ID).await.unwrap().accessory_pairing_id,
            ACCESSORY_ID
        );

        store.remove(ACCESSORY_ID).await.unwrap();
        let store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.list().await, vec!["11:22:33:44:55:66".to_string()]);
    }

    #[tokio::test]
    async fn store_shared_across_tasks() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for i in 0..4u8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert(sample_record(&format!("00:00:00:00:00:{i:02X}")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.list().await.len(), 4);
    }
}
