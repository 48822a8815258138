use crate::error::ConfigError;
use carla_protocol::DEFAULT_TARGET_NAME;
use url::Url;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 22752;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub const ENV_HOST: &str = "CARLA_REMOTE_HOST";
pub const ENV_PORT: &str = "CARLA_REMOTE_PORT";
pub const ENV_TARGET: &str = "CARLA_REMOTE_TARGET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// OSC path of the host instance, used for per-plugin addresses.
    pub target_name: String,
    /// Buffer size of the observer channel; slow observers lose the oldest events.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            target_name: DEFAULT_TARGET_NAME.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Missing or blank
    /// variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(host) = get(ENV_HOST) {
            cfg.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            cfg.port = port.parse().map_err(|_| ConfigError::InvalidVar {
                var: ENV_PORT,
                value: port.clone(),
            })?;
        }
        if let Some(target) = get(ENV_TARGET) {
            cfg.target_name = target.trim_matches('/').to_string();
        }
        Ok(cfg)
    }

    /// The one place the connection URL is built. Bare IPv6 hosts get brackets.
    pub fn ws_url(&self) -> Result<Url, ConfigError> {
        let host = self.host.trim();
        let url = if host.contains(':') && !host.starts_with('[') {
            format!("ws://[{host}]:{}/", self.port)
        } else {
            format!("ws://{host}:{}/", self.port)
        };
        Ok(Url::parse(&url)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.ws_url().unwrap().as_str(), "ws://127.0.0.1:22752/");
    }

    #[test]
    fn env_overrides() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            (ENV_HOST, "studio.local"),
            (ENV_PORT, " 9000 "),
            (ENV_TARGET, "/Carla-Rack/"),
        ]))
        .unwrap();
        assert_eq!(cfg.host, "studio.local");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.target_name, "Carla-Rack");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let cfg = ClientConfig {
            host: "::1".to_string(),
            port: 9000,
            ..ClientConfig::default()
        };
        assert_eq!(cfg.ws_url().unwrap().as_str(), "ws://[::1]:9000/");

        let already = ClientConfig {
            host: "[::1]".to_string(),
            ..cfg
        };
        assert_eq!(already.ws_url().unwrap().as_str(), "ws://[::1]:9000/");
    }

    #[test]
    fn unparseable_host_is_an_error() {
        let cfg = ClientConfig {
            host: "bad host".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(cfg.ws_url(), Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn bad_port_is_reported() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_PORT, "99999")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { var: ENV_PORT, .. }));
    }
}
