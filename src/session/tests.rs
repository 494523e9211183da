use super::{MAX_FRAME_PLAINTEXT, SecureSession, SecureStream};
use crate::error::HapError;
use crate::pairing::SessionKeys;

fn key_pair() -> (SessionKeys, SessionKeys) {
    let controller = SessionKeys {
        write_key: [0x11; 32],
        read_key: [0x22; 32],
    };
    // The accessory's view mirrors the controller's
    let accessory = SessionKeys {
        write_key: controller.read_key,
        read_key: controller.write_key,
    };
    (controller, accessory)
}

#[test]
fn roundtrip_single_frame() {
    let (ck, ak) = key_pair();
    let mut controller = SecureSession::new(&ck);
    let mut accessory = SecureSession::new(&ak);

    let wire = controller.encrypt(b"GET /accessories").unwrap();
    let (plaintext, rest) = accessory.decrypt_block(&wire).unwrap();

    assert_eq!(plaintext, b"GET /accessories");
    assert!(rest.is_empty());
}

#[test]
fn write_counter_counts_frames() {
    let (ck, _) = key_pair();
    let mut session = SecureSession::new(&ck);

    for _ in 0..5 {
        session.encrypt(b"x").unwrap();
    }
    assert_eq!(session.write_count(), 5);
}

#[test]
fn frames_never_share_a_nonce() {
    // Same plaintext twice must yield different ciphertext because the
    // counter advanced.
    let (ck, _) = key_pair();
    let mut session = SecureSession::new(&ck);

    let first = session.encrypt(b"same payload").unwrap();
    let second = session.encrypt(b"same payload").unwrap();
    assert_ne!(first, second);
}

#[test]
fn large_payload_is_chunked() {
    let (ck, ak) = key_pair();
    let mut controller = SecureSession::new(&ck);
    let mut accessory = SecureSession::new(&ak);

    let payload = vec![0xAB; MAX_FRAME_PLAINTEXT * 2 + 100];
    let wire = controller.encrypt(&payload).unwrap();
    assert_eq!(controller.write_count(), 3);

    let mut reassembled = Vec::new();
    let mut rest = &wire[..];
    while !rest.is_empty() {
        let (chunk, remaining) = accessory.decrypt_block(rest).unwrap();
        reassembled.extend_from_slice(&chunk);
        rest = remaining;
    }
    assert_eq!(reassembled, payload);
    assert_eq!(accessory.read_count(), 3);
}

#[test]
fn tampered_frame_poisons_the_session() {
    let (ck, ak) = key_pair();
    let mut controller = SecureSession::new(&ck);
    let mut accessory = SecureSession::new(&ak);

    let mut wire = controller.encrypt(b"sensitive").unwrap();
    wire[4] ^= 0x01;

    let result = accessory.decrypt_block(&wire);
    assert!(matches!(result, Err(HapError::DecryptFailure)));
    assert!(accessory.is_poisoned());

    // A later, untampered frame is also refused
    let clean = controller.encrypt(b"again").unwrap();
    assert!(matches!(
        accessory.decrypt_block(&clean),
        Err(HapError::DecryptFailure)
    ));
}

#[test]
fn out_of_order_frame_fails_authentication() {
    let (ck, ak) = key_pair();
    let mut controller = SecureSession::new(&ck);
    let mut accessory = SecureSession::new(&ak);

    let first = controller.encrypt(b"one").unwrap();
    let second = controller.encrypt(b"two").unwrap();

    // Receiving the second frame first means the nonce counters disagree
    assert!(accessory.decrypt_block(&second).is_err());
    assert!(accessory.decrypt_block(&first).is_err());
}

#[test]
fn empty_payload_still_frames() {
    let (ck, ak) = key_pair();
    let mut controller = SecureSession::new(&ck);
    let mut accessory = SecureSession::new(&ak);

    let wire = controller.encrypt(b"").unwrap();
    let (plaintext, rest) = accessory.decrypt_block(&wire).unwrap();
    assert!(plaintext.is_empty());
    assert!(rest.is_empty());
}

#[tokio::test]
async fn secure_stream_roundtrip_over_duplex() {
    let (ck, ak) = key_pair();
    let (controller_io, accessory_io) = tokio::io::duplex(4096);

    let mut controller = SecureStream::new(controller_io, &ck);
    let mut accessory = SecureStream::new(accessory_io, &ak);

    controller.send(b"PUT /characteristics").await.unwrap();
    let received = accessory.receive_frame().await.unwrap();
    assert_eq!(received, b"PUT /characteristics");

    accessory.send(b"204 No Content").await.unwrap();
    let reply = controller.receive_frame().await.unwrap();
    assert_eq!(reply, b"204 No Content");
}
