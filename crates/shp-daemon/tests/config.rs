// SPDX-License-Identifier: MIT

//! `Config::from_env`/`tls_available` tests. Runs serially (`env::set_var`
//! is process-global) and always restores the variables it touches.

use std::sync::Mutex;

use shp_daemon::Config;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
    let _guard = ENV_LOCK.lock().unwrap();
    for (k, v) in vars {
        std::env::set_var(k, v);
    }
    f();
    for (k, _) in vars {
        std::env::remove_var(k);
    }
}

#[test]
fn defaults_apply_with_no_environment_set() {
    let _guard = ENV_LOCK.lock().unwrap();
    for key in ["SHP_DATABASE_URL", "SHP_API_BIND", "SHP_DRY_RUN", "SHP_QUOTA_STORAGE_BYTES"] {
        std::env::remove_var(key);
    }
    let config = Config::from_env();
    assert_eq!(config.database_url, "postgres://localhost/shepherd");
    assert_eq!(config.api_bind, "0.0.0.0:8000");
    assert!(!config.dry_run);
    assert_eq!(config.quota_storage_bytes, 5 * 1024 * 1024 * 1024);
}

#[test]
fn environment_overrides_defaults() {
    with_env(
        &[
            ("SHP_DATABASE_URL", "postgres://db/shepherd_test"),
            ("SHP_API_BIND", "127.0.0.1:9000"),
            ("SHP_DRY_RUN", "true"),
            ("SHP_HERD_HOSTNAMES", "board-a, board-b,  ,board-c"),
        ],
        || {
            let config = Config::from_env();
            assert_eq!(config.database_url, "postgres://db/shepherd_test");
            assert_eq!(config.api_bind, "127.0.0.1:9000");
            assert!(config.dry_run);
            assert_eq!(config.herd_hostnames, vec!["board-a", "board-b", "board-c"]);
        },
    );
}

#[test]
fn tls_unavailable_without_both_files() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::remove_var("SHP_SSL_KEYFILE");
    std::env::remove_var("SHP_SSL_CERTFILE");
    let config = Config::from_env();
    assert!(!config.tls_available());
}

#[test]
fn tls_available_once_keyfile_and_certfile_exist() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("key.pem");
    let cert = dir.path().join("cert.pem");
    std::fs::write(&key, "key").unwrap();
    std::fs::write(&cert, "cert").unwrap();

    with_env(
        &[("SHP_SSL_KEYFILE", key.to_str().unwrap()), ("SHP_SSL_CERTFILE", cert.to_str().unwrap())],
        || {
            let config = Config::from_env();
            assert!(config.tls_available());
        },
    );
}

#[test]
fn tls_unavailable_when_only_keyfile_exists() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("key.pem");
    std::fs::write(&key, "key").unwrap();

    with_env(&[("SHP_SSL_KEYFILE", key.to_str().unwrap())], || {
        let config = Config::from_env();
        assert!(!config.tls_available());
    });
}
