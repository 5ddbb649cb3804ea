use std::io::Write;

use relayadmin_client::{
    JsonFileStore, KeyValueStore, TokenStore,
    token_store::{AUTH_TOKEN_KEY, MAX_STORE_BYTES, load_entries_from_path},
};

#[test]
fn load_entries_rejects_oversized_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("session.json");

    let mut file = std::fs::File::create(&path).expect("create session.json");
    file.write_all(&vec![b'a'; (MAX_STORE_BYTES as usize) + 1024])
        .expect("write oversized session.json");
    drop(file);

    let err = load_entries_from_path(&path).expect_err("oversized file should error");
    let msg = err.to_string();
    assert!(msg.contains("too large"), "unexpected error: {msg}");
}

#[test]
fn oversized_session_restores_as_logged_out() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, vec![b' '; (MAX_STORE_BYTES as usize) + 1]).expect("write padding");

    let store = TokenStore::new(JsonFileStore::new(&path));
    assert_eq!(store.restore(), None);
    assert!(!store.is_authenticated());

    store.set_auth_token(Some("fresh".to_owned()));
    let reread = JsonFileStore::new(&path);
    assert_eq!(
        reread.load(AUTH_TOKEN_KEY).expect("store rewritten").as_deref(),
        Some("fresh")
    );
}
