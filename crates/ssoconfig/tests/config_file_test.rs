//! Integration tests for loading sso.conf from disk

use ssoconfig::{AesKeyManager, ConfigError, KeyManager, SsoConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_from_file_with_encrypted_value() {
    let temp_dir = TempDir::new().unwrap();
    let conf_path = temp_dir.path().join("sso.conf");

    let key_manager = AesKeyManager::new(*b"fedcba9876543210");
    let sealed = key_manager.encrypt("CN=Acme Root CA,O=Acme").unwrap();

    let conf_content = format!(
        r#"
[registry]
cleaner_start_delay = 20
cleaner_repeat_interval = 120

[x509]
trusted_issuer_dn_pattern = ENC({})
"#,
        sealed
    );
    fs::write(&conf_path, conf_content).unwrap();

    let mut config = SsoConfig::from_file(&conf_path).expect("Failed to load config");
    assert!(config.has_encrypted_values());

    config.decrypt_with(&key_manager).unwrap();
    assert_eq!(
        config.get("x509", "trusted_issuer_dn_pattern"),
        Some("CN=Acme Root CA,O=Acme")
    );
    assert_eq!(config.get("registry", "cleaner_repeat_interval"), Some("120"));
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = SsoConfig::from_file(temp_dir.path().join("absent.conf")).unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}
