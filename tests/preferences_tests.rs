//! Preference Tests: the stored wallet marker on disk
//!
//! These tests verify:
//! 1. Path resolution under SWAPVERSE_ROOT
//! 2. A connected session persists its wallet and a disconnect removes it
//! 3. Restore from a fresh process reads the marker back

#![cfg(feature = "native")]

use once_cell::sync::Lazy;
use std::rc::Rc;
use std::sync::Mutex;
use swapverse::core::constants::{sepolia, PREFERENCE_KEY};
use swapverse::{
    FilePreferences, MemoryHost, MemoryProvider, PreferenceStore, ProviderRegistry, SessionConfig, WalletKind,
    WalletSession,
};
use tempfile::TempDir;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}

const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

fn session_over(host: &MemoryHost, config: &SessionConfig) -> WalletSession {
    let prefs = FilePreferences::load(&config.app, config.storage_key.clone());
    WalletSession::new(ProviderRegistry::new(Rc::new(host.clone())), prefs, config.clone())
}

/// Test: preference file lives under SWAPVERSE_ROOT/<app>/data
#[test]
fn preference_path_follows_root() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("SWAPVERSE_ROOT", dir.path());

    let prefs = FilePreferences::load("test-path", PREFERENCE_KEY);
    assert_eq!(prefs.path(), dir.path().join("test-path").join("data").join("preferences.json"));
    assert_eq!(prefs.load().expect("load"), None);

    prefs.store(WalletKind::Phantom).expect("store");
    assert!(prefs.path().exists());
    assert_eq!(FilePreferences::load("test-path", PREFERENCE_KEY).load().expect("reload"), Some(WalletKind::Phantom));
    assert_eq!(FilePreferences::load("test-path", "other_key").load().expect("other"), None);
}

/// Test: corrupt preference file surfaces as an error, restore stays silent
#[test]
fn corrupt_preference_file_is_not_fatal() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("SWAPVERSE_ROOT", dir.path());

    let config = SessionConfig::new("test-corrupt");
    let prefs = FilePreferences::load(&config.app, config.storage_key.clone());
    std::fs::create_dir_all(prefs.path().parent().expect("parent")).expect("mkdir");
    std::fs::write(prefs.path(), "{not json").expect("write");
    assert!(prefs.load().is_err());

    let host = MemoryHost::new();
    let provider = MemoryProvider::with_accounts(WalletKind::MetaMask, &[ALICE], sepolia::CHAIN_ID);
    provider.authorize();
    host.install(provider.clone());

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    assert_eq!(rt.block_on(session_over(&host, &config).restore_if_approved()), None);
    assert!(provider.requests().is_empty());
}

/// Test: connect persists, a new session restores, disconnect forgets
#[test]
fn session_preference_survives_restart() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("SWAPVERSE_ROOT", dir.path());

    let config = SessionConfig::new("test-restart");
    let host = MemoryHost::new();
    let provider = MemoryProvider::with_accounts(WalletKind::MetaMask, &[ALICE], sepolia::CHAIN_ID);
    host.install(provider.clone());
    let rt = tokio::runtime::Runtime::new().expect("runtime");

    let first = session_over(&host, &config);
    rt.block_on(first.connect(WalletKind::MetaMask)).expect("connect");
    drop(first);

    let raw = std::fs::read_to_string(dir.path().join("test-restart/data/preferences.json")).expect("file");
    let stored: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(stored[PREFERENCE_KEY], "metamask");

    let second = session_over(&host, &config);
    assert_eq!(rt.block_on(second.restore_if_approved()).as_deref(), Some(ALICE));
    second.disconnect();

    let third = session_over(&host, &config);
    assert_eq!(rt.block_on(third.restore_if_approved()), None);
    assert_eq!(FilePreferences::load(&config.app, PREFERENCE_KEY).load().expect("load"), None);
}
