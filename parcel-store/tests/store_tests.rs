use parcel_crypto::{
    generate_identity_keypair, seal_key, seal_private_key, KdfParams, ProjectKey,
};
use parcel_store::{
    EnvelopeRecord, InviteRecord, PendingGrant, PlatformStore, ProjectRecord, ProjectStatus,
    ResetTokenRecord, StoreError, UserRecord,
};
use pretty_assertions::assert_eq;

fn make_user(user_id: &str) -> UserRecord {
    let kp = generate_identity_keypair();
    let vaulted = seal_private_key(&kp.secret, "test-password", &KdfParams::MINIMUM).unwrap();
    UserRecord {
        user_id: user_id.to_string(),
        public_key: kp.public_bytes(),
        vaulted_key: vaulted,
        active: true,
        created_at: 1_700_000_000_000,
    }
}

fn make_envelope(project_id: &str, user: &UserRecord) -> EnvelopeRecord {
    let key = ProjectKey::generate();
    let recipient = parcel_crypto::PublicKey::from(user.public_key);
    let sealed = seal_key(key.as_bytes(), &recipient).unwrap();
    EnvelopeRecord {
        project_id: project_id.to_string(),
        user_id: user.user_id.clone(),
        sealed_key: sealed,
        created_at: 1_700_000_000_000,
    }
}

#[test]
fn user_roundtrip() {
    let store = PlatformStore::open_in_memory().unwrap();
    let user = make_user("alice");
    store.insert_user(&user).unwrap();

    let loaded = store.get_user("alice").unwrap().unwrap();
    assert_eq!(loaded.user_id, "alice");
    assert_eq!(loaded.public_key, user.public_key);
    assert!(loaded.active);
}

#[test]
fn missing_user_is_none() {
    let store = PlatformStore::open_in_memory().unwrap();
    assert!(store.get_user("nobody").unwrap().is_none());
}

#[test]
fn duplicate_user_conflicts() {
    let store = PlatformStore::open_in_memory().unwrap();
    let user = make_user("alice");
    store.insert_user(&user).unwrap();
    assert!(matches!(
        store.insert_user(&user),
        Err(StoreError::Conflict(_))
    ));
}

#[test]
fn deactivate_and_reactivate_user() {
    let store = PlatformStore::open_in_memory().unwrap();
    store.insert_user(&make_user("alice")).unwrap();

    store.set_user_active("alice", false).unwrap();
    assert!(!store.get_user("alice").unwrap().unwrap().active);

    store.set_user_active("alice", true).unwrap();
    assert!(store.get_user("alice").unwrap().unwrap().active);
}

#[test]
fn replace_user_vault_swaps_blob_only() {
    let store = PlatformStore::open_in_memory().unwrap();
    let user = make_user("alice");
    store.insert_user(&user).unwrap();

    let kp = generate_identity_keypair();
    let new_vault = seal_private_key(&kp.secret, "new-password", &KdfParams::MINIMUM).unwrap();
    store.replace_user_vault("alice", &new_vault).unwrap();

    let loaded = store.get_user("alice").unwrap().unwrap();
    assert_eq!(loaded.public_key, user.public_key);
    assert_ne!(
        loaded.vaulted_key.salt.as_bytes(),
        user.vaulted_key.salt.as_bytes()
    );
}

#[test]
fn project_roundtrip_and_status_transitions() {
    let store = PlatformStore::open_in_memory().unwrap();
    store
        .insert_project(&ProjectRecord {
            project_id: "proj-1".to_string(),
            status: ProjectStatus::Available,
            created_at: 1,
        })
        .unwrap();

    let loaded = store.get_project("proj-1").unwrap().unwrap();
    assert_eq!(loaded.status, ProjectStatus::Available);

    store
        .set_project_status("proj-1", ProjectStatus::Archived)
        .unwrap();
    let loaded = store.get_project("proj-1").unwrap().unwrap();
    assert_eq!(loaded.status, ProjectStatus::Archived);
}

#[test]
fn envelope_uniqueness_per_project_user_pair() {
    let store = PlatformStore::open_in_memory().unwrap();
    let user = make_user("alice");
    store.insert_user(&user).unwrap();

    let envelope = make_envelope("proj-1", &user);
    store.insert_envelope(&envelope).unwrap();

    // Second insert for the same pair loses at the primary key
    let dup = make_envelope("proj-1", &user);
    assert!(matches!(
        store.insert_envelope(&dup),
        Err(StoreError::Conflict(_))
    ));

    // Exactly one row stored
    assert_eq!(store.list_user_envelopes("alice").unwrap().len(), 1);
}

#[test]
fn envelope_lookup_never_falls_back_to_another_user() {
    let store = PlatformStore::open_in_memory().unwrap();
    let alice = make_user("alice");
    let bob = make_user("bob");
    store.insert_user(&alice).unwrap();
    store.insert_user(&bob).unwrap();
    store.insert_envelope(&make_envelope("proj-1", &alice)).unwrap();

    assert!(store.get_envelope("proj-1", "bob").unwrap().is_none());
    assert!(store.get_envelope("proj-1", "alice").unwrap().is_some());
}

#[test]
fn delete_envelope_is_idempotent() {
    let store = PlatformStore::open_in_memory().unwrap();
    let user = make_user("alice");
    store.insert_user(&user).unwrap();
    store.insert_envelope(&make_envelope("proj-1", &user)).unwrap();

    assert!(store.delete_envelope("proj-1", "alice").unwrap());
    assert!(!store.delete_envelope("proj-1", "alice").unwrap());
    assert!(store.get_envelope("proj-1", "alice").unwrap().is_none());
}

#[test]
fn delete_user_purges_envelopes_and_tokens() {
    let store = PlatformStore::open_in_memory().unwrap();
    let user = make_user("alice");
    store.insert_user(&user).unwrap();
    store.insert_envelope(&make_envelope("proj-1", &user)).unwrap();
    store.insert_envelope(&make_envelope("proj-2", &user)).unwrap();
    store
        .insert_reset_token(&ResetTokenRecord {
            token: "tok-1".to_string(),
            user_id: "alice".to_string(),
            expires_at: i64::MAX,
            used: false,
        })
        .unwrap();

    store.delete_user("alice").unwrap();

    assert!(store.get_user("alice").unwrap().is_none());
    assert!(store.list_user_envelopes("alice").unwrap().is_empty());
    assert!(store.take_reset_token("tok-1", "alice").unwrap().is_none());
}

#[test]
fn replace_envelope_keeps_exactly_one_row() {
    let store = PlatformStore::open_in_memory().unwrap();
    let user = make_user("alice");
    store.insert_user(&user).unwrap();
    store.insert_envelope(&make_envelope("proj-1", &user)).unwrap();

    let replacement = make_envelope("proj-1", &user);
    store.replace_envelope(&replacement).unwrap();

    let rows = store.list_user_envelopes("alice").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sealed_key.ciphertext, replacement.sealed_key.ciphertext);

    // Also works when no prior row exists
    store.replace_envelope(&make_envelope("proj-2", &user)).unwrap();
    assert_eq!(store.list_user_envelopes("alice").unwrap().len(), 2);
}

fn make_invite(email: &str, token: &str, project_ids: &[&str]) -> InviteRecord {
    let invite_kp = generate_identity_keypair();
    let vaulted_secret =
        seal_private_key(&invite_kp.secret, token, &KdfParams::MINIMUM).unwrap();
    let pending_grants = project_ids
        .iter()
        .map(|pid| PendingGrant {
            project_id: pid.to_string(),
            sealed_key: seal_key(ProjectKey::generate().as_bytes(), &invite_kp.public).unwrap(),
        })
        .collect();
    InviteRecord {
        email: email.to_string(),
        token: token.to_string(),
        sponsor_user_id: "sponsor".to_string(),
        vaulted_secret,
        pending_grants,
        expires_at: i64::MAX,
    }
}

#[test]
fn invite_roundtrip_by_token() {
    let store = PlatformStore::open_in_memory().unwrap();
    let invite = make_invite("new@example.org", "invite-token", &["proj-1", "proj-2"]);
    store.upsert_invite(&invite).unwrap();

    let loaded = store.get_invite_by_token("invite-token").unwrap().unwrap();
    assert_eq!(loaded.email, "new@example.org");
    assert_eq!(
        loaded.project_ids().collect::<Vec<_>>(),
        vec!["proj-1", "proj-2"]
    );
}

#[test]
fn upsert_invite_replaces_pending_set() {
    let store = PlatformStore::open_in_memory().unwrap();
    store
        .upsert_invite(&make_invite("new@example.org", "token-a", &["proj-1"]))
        .unwrap();
    store
        .upsert_invite(&make_invite("new@example.org", "token-b", &["proj-1", "proj-2"]))
        .unwrap();

    assert!(store.get_invite_by_token("token-a").unwrap().is_none());
    let loaded = store.get_invite_by_token("token-b").unwrap().unwrap();
    assert_eq!(loaded.pending_grants.len(), 2);
}

#[test]
fn accept_invite_commits_user_and_envelopes_together() {
    let store = PlatformStore::open_in_memory().unwrap();
    let invite = make_invite("new@example.org", "invite-token", &["proj-1", "proj-2"]);
    store.upsert_invite(&invite).unwrap();

    let user = make_user("newbie");
    let envelopes = vec![
        make_envelope("proj-1", &user),
        make_envelope("proj-2", &user),
    ];
    store
        .accept_invite("new@example.org", &user, &envelopes)
        .unwrap();

    assert!(store.get_user("newbie").unwrap().is_some());
    assert_eq!(store.list_user_envelopes("newbie").unwrap().len(), 2);
    assert!(store.get_invite_by_token("invite-token").unwrap().is_none());
}

#[test]
fn accept_invite_rolls_back_on_envelope_conflict() {
    let store = PlatformStore::open_in_memory().unwrap();
    let invite = make_invite("new@example.org", "invite-token", &["proj-1"]);
    store.upsert_invite(&invite).unwrap();

    // An envelope row already occupies (proj-1, newbie), so the insert
    // inside the acceptance transaction must clash on the primary key
    let user = make_user("newbie");
    store.insert_envelope(&make_envelope("proj-1", &user)).unwrap();

    let envelopes = vec![make_envelope("proj-1", &user)];
    let result = store.accept_invite("new@example.org", &user, &envelopes);
    assert!(result.is_err());

    // Nothing from the transaction stuck: no user row, invite still pending
    assert!(store.get_user("newbie").unwrap().is_none());
    assert!(store.get_invite_by_token("invite-token").unwrap().is_some());
}

#[test]
fn reset_token_is_single_use() {
    let store = PlatformStore::open_in_memory().unwrap();
    store
        .insert_reset_token(&ResetTokenRecord {
            token: "tok-1".to_string(),
            user_id: "alice".to_string(),
            expires_at: i64::MAX,
            used: false,
        })
        .unwrap();

    let first = store.take_reset_token("tok-1", "alice").unwrap().unwrap();
    assert!(!first.used);

    let second = store.take_reset_token("tok-1", "alice").unwrap().unwrap();
    assert!(second.used);
}

#[test]
fn mismatched_take_leaves_reset_token_intact() {
    let store = PlatformStore::open_in_memory().unwrap();
    store
        .insert_reset_token(&ResetTokenRecord {
            token: "tok-1".to_string(),
            user_id: "alice".to_string(),
            expires_at: i64::MAX,
            used: false,
        })
        .unwrap();

    // Taking for the wrong user reports the record but does not burn it
    let mismatched = store.take_reset_token("tok-1", "mallory").unwrap().unwrap();
    assert_eq!(mismatched.user_id, "alice");

    let rightful = store.take_reset_token("tok-1", "alice").unwrap().unwrap();
    assert!(!rightful.used);
}

#[test]
fn store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parcel.db");

    {
        let store = PlatformStore::open(&path).unwrap();
        store.insert_user(&make_user("alice")).unwrap();
    }

    let store = PlatformStore::open(&path).unwrap();
    assert!(store.get_user("alice").unwrap().is_some());
}
