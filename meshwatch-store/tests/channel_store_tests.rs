use meshwatch_crypto::{ChannelKey, CipherKind, KeyError, DEFAULT_PSK};
use meshwatch_store::{
    ChannelKeyPatch, ChannelKeyStore, NewChannelKey, StoreError, MAX_CHANNEL_NAME_LEN,
};
use meshwatch_types::ChannelId;
use pretty_assertions::assert_eq;

/// Base64 form of the well-known default key.
const DEFAULT_PSK_B64: &str = "1PG7OiApB1nwvP+rz05pAQ==";

fn store() -> ChannelKeyStore {
    ChannelKeyStore::open_in_memory().unwrap()
}

fn new_key(name: &str, key: &str) -> NewChannelKey {
    NewChannelKey {
        name: name.into(),
        key: key.into(),
        description: None,
        enabled: true,
    }
}

fn b64_of(bytes: &[u8]) -> String {
    ChannelKey::normalize(bytes).unwrap().to_base64()
}

// ── create ───────────────────────────────────────────────────────

#[test]
fn create_persists_a_full_length_key() {
    let store = store();
    let record = store
        .create(new_key("LongFast", DEFAULT_PSK_B64), true)
        .unwrap();
    assert_eq!(record.name, "LongFast");
    assert_eq!(record.key.as_bytes(), DEFAULT_PSK);
    assert_eq!(record.decrypted_count, 0);
    assert!(record.last_decrypted_at.is_none());
    assert!(record.enabled);

    let loaded = store.get(record.id).unwrap();
    assert_eq!(loaded.key.as_bytes(), DEFAULT_PSK);
    assert_eq!(loaded.name, "LongFast");
}

#[test]
fn create_expands_shorthand_before_storing() {
    let store = store();
    // base64 of the single byte 0x01
    let record = store.create(new_key("primary", "AQ=="), true).unwrap();
    assert_eq!(record.key.as_bytes(), DEFAULT_PSK);
    // the stored row holds the expanded form, not the shorthand
    let loaded = store.get(record.id).unwrap();
    assert_eq!(loaded.key.as_bytes().len(), 16);

    // base64 of the single byte 0x03: default key, final byte bumped by two
    let third = store.create(new_key("tertiary", "Aw=="), true).unwrap();
    let mut expected = DEFAULT_PSK;
    expected[15] = expected[15].wrapping_add(2);
    assert_eq!(third.key.as_bytes(), expected);
    assert_ne!(third.id, record.id);
}

#[test]
fn create_accepts_aes256_keys() {
    let store = store();
    let record = store
        .create(new_key("widekey", &b64_of(&[0x42; 32])), true)
        .unwrap();
    assert_eq!(record.key.cipher(), CipherKind::Aes256);
}

#[test]
fn create_trims_the_name() {
    let store = store();
    let record = store
        .create(new_key("  alerts \n", DEFAULT_PSK_B64), true)
        .unwrap();
    assert_eq!(record.name, "alerts");
}

#[test]
fn create_rejects_empty_and_whitespace_names() {
    let store = store();
    for name in ["", "   ", "\t\n"] {
        let err = store.create(new_key(name, DEFAULT_PSK_B64), false).unwrap_err();
        assert!(matches!(err, StoreError::NameEmpty), "name {name:?}");
    }
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn create_enforces_the_protocol_name_rule_when_asked() {
    let store = store();

    let err = store
        .create(new_key("waytoolongname", DEFAULT_PSK_B64), true)
        .unwrap_err();
    assert!(matches!(err, StoreError::NameInvalid(_)));

    let err = store
        .create(new_key("bad name!", DEFAULT_PSK_B64), true)
        .unwrap_err();
    assert!(matches!(err, StoreError::NameInvalid(_)));

    // exactly at the limit is fine
    let name = "a".repeat(MAX_CHANNEL_NAME_LEN);
    store.create(new_key(&name, DEFAULT_PSK_B64), true).unwrap();
}

#[test]
fn create_skips_the_protocol_name_rule_when_not_asked() {
    let store = store();
    let record = store
        .create(new_key("my private channel", DEFAULT_PSK_B64), false)
        .unwrap();
    assert_eq!(record.name, "my private channel");
}

#[test]
fn create_rejects_bad_key_lengths_without_writing() {
    let store = store();
    // base64 of 8 bytes
    let err = store.create(new_key("chan", "AAECAwQFBgc="), true).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Key(KeyError::InvalidLength { actual: 8 })
    ));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn create_rejects_no_crypto_keys() {
    let store = store();
    let err = store.create(new_key("open", "AA=="), true).unwrap_err();
    assert!(matches!(err, StoreError::Key(KeyError::NoCrypto)));
    let err = store.create(new_key("open", ""), true).unwrap_err();
    assert!(matches!(err, StoreError::Key(KeyError::NoCrypto)));
}

#[test]
fn create_rejects_undecodable_keys() {
    let store = store();
    let err = store.create(new_key("chan", "!!!not base64"), true).unwrap_err();
    assert!(matches!(err, StoreError::Key(KeyError::InvalidEncoding(_))));
}

#[test]
fn create_drops_blank_descriptions() {
    let store = store();
    let mut new = new_key("chan", DEFAULT_PSK_B64);
    new.description = Some("   ".into());
    let record = store.create(new, true).unwrap();
    assert!(record.description.is_none());
}

// ── update ───────────────────────────────────────────────────────

#[test]
fn update_replaces_only_patched_fields() {
    let store = store();
    let record = store.create(new_key("original", DEFAULT_PSK_B64), true).unwrap();

    let patch = ChannelKeyPatch {
        description: Some("north side repeater".into()),
        ..Default::default()
    };
    let updated = store.update(record.id, patch, true).unwrap();
    assert_eq!(updated.name, "original");
    assert_eq!(updated.description.as_deref(), Some("north side repeater"));
    assert_eq!(updated.key.as_bytes(), DEFAULT_PSK);
}

#[test]
fn update_normalizes_replacement_keys() {
    let store = store();
    let record = store.create(new_key("chan", DEFAULT_PSK_B64), true).unwrap();

    // shorthand 0x02: default key with the final byte bumped
    let patch = ChannelKeyPatch {
        key: Some("Ag==".into()),
        ..Default::default()
    };
    let updated = store.update(record.id, patch, true).unwrap();
    assert_eq!(updated.key.as_bytes().len(), 16);
    assert_eq!(updated.key.as_bytes()[15], DEFAULT_PSK[15].wrapping_add(1));
}

#[test]
fn update_preserves_decryption_counters() {
    let store = store();
    let record = store.create(new_key("chan", DEFAULT_PSK_B64), true).unwrap();
    store.record_decryption(record.id, chrono::Utc::now()).unwrap();

    let patch = ChannelKeyPatch {
        key: Some(b64_of(&[0x99; 32])),
        ..Default::default()
    };
    let updated = store.update(record.id, patch, true).unwrap();
    assert_eq!(updated.decrypted_count, 1);
    assert!(updated.last_decrypted_at.is_some());
}

#[test]
fn update_validates_replacement_names() {
    let store = store();
    let record = store.create(new_key("chan", DEFAULT_PSK_B64), true).unwrap();

    let patch = ChannelKeyPatch {
        name: Some("not a valid name".into()),
        ..Default::default()
    };
    let err = store.update(record.id, patch, true).unwrap_err();
    assert!(matches!(err, StoreError::NameInvalid(_)));

    // record untouched
    assert_eq!(store.get(record.id).unwrap().name, "chan");
}

#[test]
fn update_clears_description_with_empty_string() {
    let store = store();
    let mut new = new_key("chan", DEFAULT_PSK_B64);
    new.description = Some("old note".into());
    let record = store.create(new, true).unwrap();

    let patch = ChannelKeyPatch {
        description: Some(String::new()),
        ..Default::default()
    };
    let updated = store.update(record.id, patch, true).unwrap();
    assert!(updated.description.is_none());
}

#[test]
fn update_unknown_id_is_not_found() {
    let store = store();
    let err = store
        .update(ChannelId::new(), ChannelKeyPatch::default(), true)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ── toggle / delete ──────────────────────────────────────────────

#[test]
fn toggle_enabled_flips_the_flag() {
    let store = store();
    let record = store.create(new_key("chan", DEFAULT_PSK_B64), true).unwrap();
    assert!(record.enabled);

    let toggled = store.toggle_enabled(record.id).unwrap();
    assert!(!toggled.enabled);
    let toggled = store.toggle_enabled(record.id).unwrap();
    assert!(toggled.enabled);
}

#[test]
fn toggle_unknown_id_is_not_found() {
    let store = store();
    assert!(matches!(
        store.toggle_enabled(ChannelId::new()).unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[test]
fn delete_removes_the_record() {
    let store = store();
    let record = store.create(new_key("chan", DEFAULT_PSK_B64), true).unwrap();
    store.delete(record.id).unwrap();

    assert!(matches!(
        store.get(record.id).unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(matches!(
        store.delete(record.id).unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert_eq!(store.count().unwrap(), 0);
}

// ── list ─────────────────────────────────────────────────────────

#[test]
fn list_returns_store_order() {
    let store = store();
    store.create(new_key("first", DEFAULT_PSK_B64), true).unwrap();
    store.create(new_key("second", &b64_of(&[0x22; 16])), true).unwrap();
    store.create(new_key("third", &b64_of(&[0x33; 32])), true).unwrap();

    let names: Vec<String> = store.list().unwrap().into_iter().map(|v| v.name).collect();
    assert_eq!(names, ["first", "second", "third"]);
}

#[test]
fn list_views_carry_previews_not_keys() {
    let store = store();
    store.create(new_key("LongFast", DEFAULT_PSK_B64), true).unwrap();

    let views = store.list().unwrap();
    assert_eq!(views.len(), 1);
    let view = &views[0];
    assert_eq!(view.key_preview.text, "d4f1bb…");
    assert_eq!(view.cipher, CipherKind::Aes128);
    assert_eq!(view.psk_len, 16);

    // nothing serializable leaks the key material
    let json = serde_json::to_string(&views).unwrap();
    assert!(!json.contains(DEFAULT_PSK_B64));
    assert!(!json.contains("cf4e69"));
}

// ── import ───────────────────────────────────────────────────────

#[test]
fn import_keeps_going_past_bad_records() {
    let store = store();
    let report = store.import(
        vec![
            new_key("alpha", DEFAULT_PSK_B64),
            // base64 of 5 bytes
            new_key("bad", "AAECAwQ="),
            new_key("bravo", &b64_of(&[0x55; 32])),
        ],
        true,
    );

    assert_eq!(report.imported, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes[0].result.is_ok());
    assert!(matches!(
        report.outcomes[1].result,
        Err(StoreError::Key(KeyError::InvalidLength { actual: 5 }))
    ));
    assert!(report.outcomes[2].result.is_ok());
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn import_of_nothing_reports_nothing() {
    let store = store();
    let report = store.import(Vec::new(), true);
    assert_eq!(report.imported, 0);
    assert_eq!(report.rejected, 0);
    assert!(report.outcomes.is_empty());
}

// ── enabled_keys / record_decryption ─────────────────────────────

#[test]
fn enabled_keys_skips_disabled_records_in_order() {
    let store = store();
    let a = store.create(new_key("alpha", DEFAULT_PSK_B64), true).unwrap();
    let b = store.create(new_key("bravo", &b64_of(&[0x22; 16])), true).unwrap();
    let c = store.create(new_key("charlie", &b64_of(&[0x33; 16])), true).unwrap();
    store.toggle_enabled(b.id).unwrap();

    let keys = store.enabled_keys().unwrap();
    let ids: Vec<_> = keys.iter().map(|k| k.id).collect();
    assert_eq!(ids, [a.id, c.id]);
    assert_eq!(keys[0].name, "alpha");
}

#[test]
fn record_decryption_accumulates() {
    let store = store();
    let record = store.create(new_key("chan", DEFAULT_PSK_B64), true).unwrap();

    let first = chrono::Utc::now();
    store.record_decryption(record.id, first).unwrap();
    let second = chrono::Utc::now();
    store.record_decryption(record.id, second).unwrap();

    let loaded = store.get(record.id).unwrap();
    assert_eq!(loaded.decrypted_count, 2);
    assert_eq!(
        loaded.last_decrypted_at.map(|t| t.timestamp_millis()),
        Some(second.timestamp_millis())
    );
}

#[test]
fn record_decryption_for_deleted_key_is_a_noop() {
    let store = store();
    let record = store.create(new_key("chan", DEFAULT_PSK_B64), true).unwrap();
    store.delete(record.id).unwrap();
    store.record_decryption(record.id, chrono::Utc::now()).unwrap();
}

// ── persistence ──────────────────────────────────────────────────

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("channels.db");
    let path = path.to_str().unwrap();

    let id = {
        let store = ChannelKeyStore::new(path).unwrap();
        let mut new = new_key("LongFast", DEFAULT_PSK_B64);
        new.description = Some("primary".into());
        let record = store.create(new, true).unwrap();
        store.record_decryption(record.id, chrono::Utc::now()).unwrap();
        record.id
    };

    let store = ChannelKeyStore::new(path).unwrap();
    let record = store.get(id).unwrap();
    assert_eq!(record.name, "LongFast");
    assert_eq!(record.key.as_bytes(), DEFAULT_PSK);
    assert_eq!(record.description.as_deref(), Some("primary"));
    assert_eq!(record.decrypted_count, 1);
    assert!(record.last_decrypted_at.is_some());
}

// ── error display ────────────────────────────────────────────────

#[test]
fn error_display_not_found_names_the_id() {
    let id = ChannelId::new();
    let msg = format!("{}", StoreError::NotFound(id));
    assert!(msg.contains(&id.to_string()));
}

#[test]
fn error_display_wraps_key_errors() {
    let err: StoreError = KeyError::NoCrypto.into();
    assert!(format!("{err}").contains("invalid key"));
}
