use parcel_crypto::{
    generate_identity_keypair, open_sealed_key, seal_key, ProjectKey, SealedKey,
};

#[test]
fn keypair_generation_produces_valid_keys() {
    let kp = generate_identity_keypair();
    assert_eq!(kp.public_bytes().len(), 32);
    // Public and secret keys must differ
    assert_ne!(kp.public_bytes(), kp.secret.to_bytes());
}

#[test]
fn keypair_roundtrip_from_secret() {
    let kp1 = generate_identity_keypair();
    let kp2 = parcel_crypto::IdentityKeyPair::from_secret(kp1.secret.clone());
    assert_eq!(kp1.public_bytes(), kp2.public_bytes());
}

#[test]
fn seal_open_roundtrip() {
    let recipient = generate_identity_keypair();
    let project_key = ProjectKey::generate();

    let sealed = seal_key(project_key.as_bytes(), &recipient.public).unwrap();
    let recovered = open_sealed_key(&sealed, &recipient.secret).unwrap();

    assert_eq!(recovered, project_key.as_bytes());
}

#[test]
fn wrong_recipient_key_fails_to_open() {
    let intended = generate_identity_keypair();
    let wrong = generate_identity_keypair();
    let project_key = ProjectKey::generate();

    let sealed = seal_key(project_key.as_bytes(), &intended.public).unwrap();
    assert!(open_sealed_key(&sealed, &wrong.secret).is_err());
}

#[test]
fn tampered_ciphertext_fails() {
    let recipient = generate_identity_keypair();
    let project_key = ProjectKey::generate();

    let mut sealed = seal_key(project_key.as_bytes(), &recipient.public).unwrap();
    if let Some(byte) = sealed.ciphertext.first_mut() {
        *byte ^= 0xFF;
    }

    assert!(open_sealed_key(&sealed, &recipient.secret).is_err());
}

#[test]
fn tampered_nonce_fails() {
    let recipient = generate_identity_keypair();
    let project_key = ProjectKey::generate();

    let mut sealed = seal_key(project_key.as_bytes(), &recipient.public).unwrap();
    sealed.nonce[0] ^= 0xFF;

    assert!(open_sealed_key(&sealed, &recipient.secret).is_err());
}

#[test]
fn seals_for_different_recipients_are_unlinkable() {
    let alice = generate_identity_keypair();
    let bob = generate_identity_keypair();
    let project_key = ProjectKey::generate();

    let for_alice = seal_key(project_key.as_bytes(), &alice.public).unwrap();
    let for_bob = seal_key(project_key.as_bytes(), &bob.public).unwrap();

    // Independent ephemeral keys, nonces and ciphertexts
    assert_ne!(for_alice.ephemeral_public_key, for_bob.ephemeral_public_key);
    assert_ne!(for_alice.nonce, for_bob.nonce);
    assert_ne!(for_alice.ciphertext, for_bob.ciphertext);

    // Each opens only with its own recipient's key
    assert_eq!(
        open_sealed_key(&for_alice, &alice.secret).unwrap(),
        project_key.as_bytes()
    );
    assert_eq!(
        open_sealed_key(&for_bob, &bob.secret).unwrap(),
        project_key.as_bytes()
    );
    assert!(open_sealed_key(&for_alice, &bob.secret).is_err());
    assert!(open_sealed_key(&for_bob, &alice.secret).is_err());
}

#[test]
fn repeated_seals_produce_different_ciphertext() {
    let recipient = generate_identity_keypair();
    let project_key = ProjectKey::generate();

    let s1 = seal_key(project_key.as_bytes(), &recipient.public).unwrap();
    let s2 = seal_key(project_key.as_bytes(), &recipient.public).unwrap();

    assert_ne!(s1.ephemeral_public_key, s2.ephemeral_public_key);
    assert_ne!(s1.ciphertext, s2.ciphertext);
    assert_eq!(
        open_sealed_key(&s1, &recipient.secret).unwrap(),
        open_sealed_key(&s2, &recipient.secret).unwrap()
    );
}

#[test]
fn sealed_key_serialization_roundtrip() {
    let recipient = generate_identity_keypair();
    let project_key = ProjectKey::generate();

    let sealed = seal_key(project_key.as_bytes(), &recipient.public).unwrap();
    let json = serde_json::to_string(&sealed).unwrap();
    let deserialized: SealedKey = serde_json::from_str(&json).unwrap();

    let recovered = open_sealed_key(&deserialized, &recipient.secret).unwrap();
    assert_eq!(recovered, project_key.as_bytes());
}

// Property-based tests
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn seal_open_always_roundtrips(payload in proptest::collection::vec(any::<u8>(), 0..128)) {
            let recipient = generate_identity_keypair();
            let sealed = seal_key(&payload, &recipient.public).unwrap();
            let recovered = open_sealed_key(&sealed, &recipient.secret).unwrap();
            prop_assert_eq!(recovered, payload);
        }
    }
}
