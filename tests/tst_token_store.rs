use chrono::{Duration, Local};
use gex_levels::auth::{TokenStatus, TokenStore};
use gex_levels::models::TokenResponse;

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::load(dir.path().join("tokens.json"));

        assert!(store.tokens().is_none());
        assert_eq!(store.status_at(Local::now()), TokenStatus::Missing);
        assert!(!store.is_access_token_valid_at(Local::now()));
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "access=abc\nrefresh=def").unwrap();

        let store = TokenStore::load(&path);
        assert!(store.tokens().is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let now = Local::now();

        let mut store = TokenStore::load(&path);
        store.save(response("access-1", Some("refresh-1"), Some(1800)), now).unwrap();

        let reloaded = TokenStore::load(&path);
        let tokens = reloaded.tokens().unwrap();
        assert_eq!(tokens.access_token, "access-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(tokens.expires_in, 1800);
        assert_eq!(tokens.token_expiry, now + Duration::seconds(1800));
    }

    #[test]
    fn test_validity_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let mut store = TokenStore::load(dir.path().join("tokens.json"));
        store.save(response("access", Some("refresh"), Some(1800)), now).unwrap();

        // valid until two minutes before expiry
        assert!(store.is_access_token_valid_at(now + Duration::seconds(1679)));
        assert!(!store.is_access_token_valid_at(now + Duration::seconds(1680)));

        assert!(matches!(store.status_at(now), TokenStatus::Valid { .. }));
        assert_eq!(store.status_at(now + Duration::seconds(1700)), TokenStatus::Refreshable);
    }

    #[test]
    fn test_default_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let mut store = TokenStore::load(dir.path().join("tokens.json"));
        store.save(response("access", None, None), now).unwrap();

        let tokens = store.tokens().unwrap();
        assert_eq!(tokens.expires_in, 1800);
        assert_eq!(store.status_at(now + Duration::hours(1)), TokenStatus::Expired);
    }

    #[test]
    fn test_loads_token_file_without_utc_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        // access token expired an hour ago, refresh token still usable
        let now = Local::now();
        let expiry = (now - Duration::hours(1)).naive_local();
        let saved_at = (now - Duration::hours(2)).naive_local();
        let json = format!(
            r#"{{
  "access_token": "A",
  "refresh_token": "R",
  "token_type": "Bearer",
  "expires_in": 1800,
  "token_expiry": "{}",
  "saved_at": "{}"
}}"#,
            expiry.format("%Y-%m-%dT%H:%M:%S%.6f"),
            saved_at.format("%Y-%m-%dT%H:%M:%S%.6f"),
        );
        std::fs::write(&path, json).unwrap();

        let store = TokenStore::load(&path);

        assert!(store.tokens().is_some());
        assert_eq!(store.access_token(), Some("A"));
        assert_eq!(store.refresh_token(), Some("R"));
        assert_eq!(store.status_at(now), TokenStatus::Refreshable);
        let loaded_expiry = store.tokens().unwrap().token_expiry.naive_local();
        assert_eq!(
            loaded_expiry.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            expiry.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
        );
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let now = Local::now();

        let mut store = TokenStore::load(&path);
        store.save(response("access-1", Some("refresh-1"), Some(1800)), now).unwrap();
        store
            .save(response("access-2", None, Some(1800)), now + Duration::minutes(30))
            .unwrap();

        assert_eq!(store.access_token(), Some("access-2"));
        assert_eq!(store.refresh_token(), Some("refresh-1"));

        let reloaded = TokenStore::load(&path);
        assert_eq!(reloaded.refresh_token(), Some("refresh-1"));
    }
}
