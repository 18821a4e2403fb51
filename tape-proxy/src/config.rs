use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tokio::sync::Mutex;

use crate::collaborator::{CollaboratorError, TapeStore};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_TAPE_PATH: &str = "./tapes";
pub const DEFAULT_CONTROL_PLANE_PATH: &str = "/control";
pub const DEFAULT_MAX_CONTROL_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    pub enabled: bool,
    /// Mount prefix. Matched byte-for-byte against the request URL.
    pub path: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: DEFAULT_CONTROL_PLANE_PATH.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub tape_path: PathBuf,
    pub control_plane: ControlPlaneConfig,
    pub max_control_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            tape_path: PathBuf::from(DEFAULT_TAPE_PATH),
            control_plane: ControlPlaneConfig::default(),
            max_control_body_bytes: DEFAULT_MAX_CONTROL_BODY_BYTES,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
    InvalidControlPlanePath(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {key}: {value:?}")
            }
            ConfigError::InvalidControlPlanePath(path) => write!(
                f,
                "control-plane path must be non-empty and start with '/': {path:?}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = parse_value(
            "PROXY_ADDR",
            lookup("PROXY_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        )?;
        let tape_path = lookup("TAPE_PATH")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TAPE_PATH));
        let enabled = match lookup("CONTROL_PLANE_ENABLED") {
            Some(value) => parse_bool("CONTROL_PLANE_ENABLED", &value)?,
            None => false,
        };
        let path = lookup("CONTROL_PLANE_PATH")
            .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_PATH.to_string());
        let max_control_body_bytes = match lookup("CONTROL_PLANE_MAX_BODY_BYTES") {
            Some(value) => parse_value("CONTROL_PLANE_MAX_BODY_BYTES", value)?,
            None => DEFAULT_MAX_CONTROL_BODY_BYTES,
        };

        let config = Self {
            listen_addr,
            tape_path,
            control_plane: ControlPlaneConfig { enabled, path },
            max_control_body_bytes,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = &self.control_plane.path;
        if self.control_plane.enabled && !path.starts_with('/') {
            return Err(ConfigError::InvalidControlPlanePath(path.clone()));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

/// Process-wide configuration shared by the router and the HTTP host.
///
/// The tape path is the only field mutated at runtime, and only through
/// [`ConfigHandle::apply_tape_path`], which keeps it in step with the tape store.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<ProxyConfig>>,
    apply_lock: Arc<Mutex<()>>,
}

impl ConfigHandle {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            apply_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn control_plane(&self) -> ControlPlaneConfig {
        self.inner
            .read()
            .expect("config lock poisoned")
            .control_plane
            .clone()
    }

    pub fn tape_path(&self) -> PathBuf {
        self.inner
            .read()
            .expect("config lock poisoned")
            .tape_path
            .clone()
    }

    pub fn max_control_body_bytes(&self) -> usize {
        self.inner
            .read()
            .expect("config lock poisoned")
            .max_control_body_bytes
    }

    pub(crate) fn with_control_plane<R>(&self, f: impl FnOnce(&ControlPlaneConfig) -> R) -> R {
        let guard = self.inner.read().expect("config lock poisoned");
        f(&guard.control_plane)
    }

    /// Points both the configuration and `store` at `path`.
    ///
    /// The store is updated first and the configuration is committed only if it
    /// accepted the path, so a failed or cancelled store update leaves the
    /// previous path in place on both sides. Concurrent applies are serialized;
    /// the last one to finish wins.
    pub async fn apply_tape_path(
        &self,
        path: &Path,
        store: &dyn TapeStore,
    ) -> Result<(), CollaboratorError> {
        let _apply = self.apply_lock.lock().await;
        store.set_path(path).await?;
        self.inner.write().expect("config lock poisoned").tape_path = path.to_path_buf();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::collaborator::BoxFuture;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ProxyConfig::from_lookup(lookup_from(&[])).expect("defaults should load");
        assert_eq!(config, ProxyConfig::default());
        assert!(!config.control_plane.enabled);
        assert_eq!(config.control_plane.path, "/control");
    }

    #[test]
    fn env_values_override_defaults() {
        let config = ProxyConfig::from_lookup(lookup_from(&[
            ("PROXY_ADDR", "0.0.0.0:9000"),
            ("TAPE_PATH", "/var/tapes"),
            ("CONTROL_PLANE_ENABLED", "yes"),
            ("CONTROL_PLANE_PATH", "/__admin"),
            ("CONTROL_PLANE_MAX_BODY_BYTES", "512"),
        ]))
        .expect("config should load");
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.tape_path, PathBuf::from("/var/tapes"));
        assert!(config.control_plane.enabled);
        assert_eq!(config.control_plane.path, "/__admin");
        assert_eq!(config.max_control_body_bytes, 512);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ProxyConfig::from_lookup(lookup_from(&[("CONTROL_PLANE_ENABLED", "maybe")]))
            .expect_err("bool should be rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CONTROL_PLANE_ENABLED",
                ..
            }
        ));

        let err = ProxyConfig::from_lookup(lookup_from(&[("PROXY_ADDR", "nowhere")]))
            .expect_err("addr should be rejected");
        assert!(matches!(err, ConfigError::InvalidValue { key: "PROXY_ADDR", .. }));
    }

    #[test]
    fn enabled_control_plane_requires_rooted_path() {
        for path in ["", "control"] {
            let err = ProxyConfig::from_lookup(lookup_from(&[
                ("CONTROL_PLANE_ENABLED", "true"),
                ("CONTROL_PLANE_PATH", path),
            ]))
            .expect_err("path should be rejected");
            assert_eq!(err, ConfigError::InvalidControlPlanePath(path.to_string()));
        }

        ProxyConfig::from_lookup(lookup_from(&[
            ("CONTROL_PLANE_ENABLED", "false"),
            ("CONTROL_PLANE_PATH", ""),
        ]))
        .expect("disabled control plane ignores the path");
    }

    struct FailingStore;

    impl TapeStore for FailingStore {
        fn set_path<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<(), CollaboratorError>> {
            Box::pin(async { Err(CollaboratorError::new("tape store", "disk full")) })
        }
    }

    struct AcceptingStore(std::sync::Mutex<Vec<PathBuf>>);

    impl TapeStore for AcceptingStore {
        fn set_path<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), CollaboratorError>> {
            Box::pin(async move {
                self.0.lock().expect("lock").push(path.to_path_buf());
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn apply_tape_path_updates_config_and_store_together() {
        let handle = ConfigHandle::new(ProxyConfig::default());
        let store = AcceptingStore(std::sync::Mutex::new(Vec::new()));

        handle
            .apply_tape_path(Path::new("/tapes/v2"), &store)
            .await
            .expect("apply should succeed");

        assert_eq!(handle.tape_path(), PathBuf::from("/tapes/v2"));
        assert_eq!(
            *store.0.lock().expect("lock"),
            vec![PathBuf::from("/tapes/v2")]
        );
    }

    struct StalledStore {
        started: tokio::sync::Notify,
    }

    impl TapeStore for StalledStore {
        fn set_path<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<(), CollaboratorError>> {
            Box::pin(async move {
                self.started.notify_one();
                std::future::pending::<()>().await;
                Ok(())
            })
        }
    }

    struct SlowStore(std::sync::Mutex<Vec<PathBuf>>);

    impl TapeStore for SlowStore {
        fn set_path<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), CollaboratorError>> {
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                self.0.lock().expect("lock").push(path.to_path_buf());
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn cancelled_apply_leaves_config_untouched() {
        let handle = ConfigHandle::new(ProxyConfig::default());
        let stalled = StalledStore {
            started: tokio::sync::Notify::new(),
        };

        tokio::select! {
            _ = handle.apply_tape_path(Path::new("/tapes/stalled"), &stalled) => {
                panic!("stalled store should never finish");
            }
            _ = stalled.started.notified() => {}
        }
        assert_eq!(handle.tape_path(), PathBuf::from(DEFAULT_TAPE_PATH));

        let store = AcceptingStore(std::sync::Mutex::new(Vec::new()));
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            handle.apply_tape_path(Path::new("/tapes/next"), &store),
        )
        .await
        .expect("apply lock should be released by the dropped apply")
        .expect("apply should succeed");
        assert_eq!(handle.tape_path(), PathBuf::from("/tapes/next"));
    }

    #[tokio::test]
    async fn concurrent_applies_end_on_last_store_path() {
        let handle = ConfigHandle::new(ProxyConfig::default());
        let store = SlowStore(std::sync::Mutex::new(Vec::new()));

        let (first, second) = tokio::join!(
            handle.apply_tape_path(Path::new("/tapes/a"), &store),
            handle.apply_tape_path(Path::new("/tapes/b"), &store),
        );
        first.expect("first apply should succeed");
        second.expect("second apply should succeed");

        let accepted = store.0.lock().expect("lock").clone();
        assert_eq!(accepted.len(), 2);
        assert_eq!(Some(&handle.tape_path()), accepted.last());
    }

    #[tokio::test]
    async fn apply_tape_path_keeps_config_when_store_fails() {
        let handle = ConfigHandle::new(ProxyConfig::default());

        let err = handle
            .apply_tape_path(Path::new("/tapes/v2"), &FailingStore)
            .await
            .expect_err("apply should fail");

        assert_eq!(err.to_string(), "tape store failed: disk full");
        assert_eq!(handle.tape_path(), PathBuf::from(DEFAULT_TAPE_PATH));
    }
}
