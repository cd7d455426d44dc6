#![expect(clippy::expect_used, clippy::unwrap_used)]
use crate::ClaimsInfo;
use crate::KnownRole;
use crate::LoginRedirect;
use crate::MemoryTokenStore;
use crate::SessionFileStore;
use crate::SessionManager;
use crate::TokenData;
use crate::TokenStore;
use crate::UserRole;
use crate::get_session_file;
use base64::Engine;
use pretty_assertions::assert_eq;
use serde::Serialize;
use std::sync::Arc;
use tempfile::tempdir;

/// Redirects are irrelevant for these tests; the integration suite covers
/// them.
struct NoopRedirect;

impl LoginRedirect for NoopRedirect {
    fn redirect_to_login(&self) {}
}

fn fake_access_jwt(email: &str, role: &str) -> String {
    #[derive(Serialize)]
    struct Header {
        alg: &'static str,
        typ: &'static str,
    }
    let header = Header {
        alg: "none",
        typ: "JWT",
    };
    let payload = serde_json::json!({
        "sub": 42,
        "email": email,
        "role": role,
    });
    let b64 = |b: &[u8]| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b);
    let header_b64 = b64(&serde_json::to_vec(&header).unwrap());
    let payload_b64 = b64(&serde_json::to_vec(&payload).unwrap());
    let signature_b64 = b64(b"sig");
    format!("{header_b64}.{payload_b64}.{signature_b64}")
}

#[test]
fn file_store_round_trips_tokens() {
    let dir = tempdir().unwrap();
    let store = SessionFileStore::new(dir.path());

    let access = fake_access_jwt("user@example.com", "user");
    let tokens = TokenData::from_raw(access, "r1");
    store.save(&tokens).expect("failed to save tokens");

    let loaded = store.load().unwrap().expect("tokens should exist");
    assert_eq!(loaded, tokens);
    assert_eq!(
        loaded.claims,
        ClaimsInfo {
            email: Some("user@example.com".to_string()),
            role: Some(UserRole::Known(KnownRole::User)),
        }
    );
}

#[test]
fn file_store_load_missing_returns_none() {
    let dir = tempdir().unwrap();
    let store = SessionFileStore::new(dir.path());
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn file_store_clear_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = SessionFileStore::new(dir.path());
    store.save(&TokenData::from_raw("a1", "r1")).unwrap();
    assert!(get_session_file(dir.path()).exists());

    store.clear().unwrap();
    assert!(!get_session_file(dir.path()).exists());
    // Clearing an already-empty store is not an error.
    store.clear().unwrap();
}

#[test]
fn session_json_shape_is_stable() {
    let dir = tempdir().unwrap();
    let store = SessionFileStore::new(dir.path());
    store.save(&TokenData::from_raw("a1", "r1")).unwrap();

    let raw = std::fs::read_to_string(get_session_file(dir.path())).unwrap();
    let val: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(val["tokens"]["access_token"].as_str(), Some("a1"));
    assert_eq!(val["tokens"]["refresh_token"].as_str(), Some("r1"));
    assert!(val["last_refresh"].as_str().is_some());
}

#[cfg(unix)]
#[test]
fn session_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let store = SessionFileStore::new(dir.path());
    store.save(&TokenData::from_raw("a1", "r1")).unwrap();

    let mode = std::fs::metadata(get_session_file(dir.path()))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn manager_loads_persisted_session() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SessionFileStore::new(dir.path()));
    store.save(&TokenData::from_raw("a1", "r1")).unwrap();

    let manager = SessionManager::new("http://127.0.0.1:0", store, Arc::new(NoopRedirect));
    assert_eq!(manager.access_token(), Some("a1".to_string()));
}

#[test]
fn corrupt_session_file_is_treated_as_signed_out() {
    let dir = tempdir().unwrap();
    std::fs::write(get_session_file(dir.path()), "not json").unwrap();

    let store = Arc::new(SessionFileStore::new(dir.path()));
    let manager = SessionManager::new("http://127.0.0.1:0", store, Arc::new(NoopRedirect));
    assert_eq!(manager.access_token(), None);
}

#[test]
fn adopt_tokens_writes_through_and_logout_clears() {
    let store = Arc::new(MemoryTokenStore::new());
    let manager = SessionManager::new(
        "http://127.0.0.1:0/",
        store.clone(),
        Arc::new(NoopRedirect),
    );
    assert_eq!(manager.access_token(), None);

    manager.adopt_tokens(TokenData::from_raw("a1", "r1"));
    assert_eq!(manager.access_token(), Some("a1".to_string()));
    assert_eq!(
        store.load().unwrap(),
        Some(TokenData::from_raw("a1", "r1"))
    );

    manager.logout();
    assert_eq!(manager.access_token(), None);
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn claims_surface_through_the_manager() {
    let access = fake_access_jwt("admin@example.com", "admin");
    let store = Arc::new(MemoryTokenStore::with_tokens(TokenData::from_raw(
        access, "r1",
    )));
    let manager = SessionManager::new("http://127.0.0.1:0", store, Arc::new(NoopRedirect));

    let claims = manager.claims().expect("claims should exist");
    assert_eq!(claims.email.as_deref(), Some("admin@example.com"));
    assert_eq!(claims.role, Some(UserRole::Known(KnownRole::Admin)));
}
