use crate::device::{DeviceId, Preferences};
use crate::engine::EngineSettings;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in content.lines().filter_map(parse_dotenv_line) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let mut value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = &value[1..value.len() - 1];
    }
    Some((key.trim(), value))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub engine: EngineConfig,
    /// JSON list of [`DeviceConfig`].
    pub devices_file: Option<PathBuf>,
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Gateway topic prefix, e.g. `zwave2mqtt/<device>/scene`.
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub debounce_window_ms: u64,
    pub dimming_tick_ms: u64,
    pub association_spacing_ms: u64,
    pub hub_node_id: u8,
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            debounce_window: Duration::from_millis(self.debounce_window_ms),
            hub_node_id: self.hub_node_id,
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.dimming_tick_ms.max(1))
    }

    pub fn association_spacing(&self) -> Duration {
        Duration::from_millis(self.association_spacing_ms)
    }
}

/// One wall switch entry of the devices file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Read the devices file.
pub fn load_devices(path: &Path) -> Result<Vec<DeviceConfig>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn default_state_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scene-switch-sync")
        .join("state.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: "scene-switch-sync".to_string(),
                username: None,
                password: None,
                topic_prefix: "zwave2mqtt".to_string(),
            },
            engine: EngineConfig {
                debounce_window_ms: 2000,
                dimming_tick_ms: 1000,
                association_spacing_ms: 500,
                hub_node_id: crate::engine::DEFAULT_HUB_NODE_ID,
            },
            devices_file: None,
            state_file: default_state_file(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source, falling back to
    /// defaults for anything missing or unparsable.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // MQTT configuration
        if let Some(host) = var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Some(port) = var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Some(client_id) = var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Some(username) = var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Some(password) = var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Some(prefix) = var("MQTT_TOPIC_PREFIX") {
            config.mqtt.topic_prefix = prefix.trim_end_matches('/').to_string();
        }

        // Engine timing
        if let Some(ms) = var("DEBOUNCE_WINDOW_MS")
            && let Ok(ms) = ms.parse()
        {
            config.engine.debounce_window_ms = ms;
        }
        if let Some(ms) = var("DIMMING_TICK_MS")
            && let Ok(ms) = ms.parse()
        {
            config.engine.dimming_tick_ms = ms;
        }
        if let Some(ms) = var("ASSOCIATION_SPACING_MS")
            && let Ok(ms) = ms.parse()
        {
            config.engine.association_spacing_ms = ms;
        }
        if let Some(id) = var("HUB_NODE_ID")
            && let Ok(id) = id.parse()
        {
            config.engine.hub_node_id = id;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.mqtt.topic_prefix, "zwave2mqtt");
        assert_eq!(config.engine.debounce_window_ms, 2000);
        assert_eq!(config.engine.hub_node_id, 1);
        assert_eq!(config.engine.tick_period(), Duration::from_secs(1));
        assert!(config.state_file.ends_with("scene-switch-sync/state.json"));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = Config::from_lookup(lookup(&[
            ("MQTT_BROKER_HOST", "10.0.0.2"),
            ("MQTT_BROKER_PORT", "not-a-port"),
            ("MQTT_TOPIC_PREFIX", "zwave/"),
            ("DEBOUNCE_WINDOW_MS", "1500"),
            ("HUB_NODE_ID", "3"),
        ]));
        assert_eq!(config.mqtt.broker_host, "10.0.0.2");
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.mqtt.topic_prefix, "zwave");
        assert_eq!(
            config.engine.settings().debounce_window,
            Duration::from_millis(1500)
        );
        assert_eq!(config.engine.settings().hub_node_id, 3);
    }

    #[test]
    fn test_parse_dotenv_line() {
        assert_eq!(parse_dotenv_line("A=b c"), Some(("A", "b c")));
        assert_eq!(parse_dotenv_line(" KEY = \"quoted\" "), Some(("KEY", "quoted")));
        assert_eq!(parse_dotenv_line("# comment"), None);
        assert_eq!(parse_dotenv_line("NOEQUALS"), None);
        assert_eq!(parse_dotenv_line("Q=\""), Some(("Q", "\"")));
    }

    #[test]
    fn test_load_devices() {
        let path = std::env::temp_dir().join(format!(
            "scene-switch-sync-devices-{}.json",
            std::process::id()
        ));
        fs::write(
            &path,
            r#"[
                {"id": "hall", "preferences": {"sync_enabled": true, "association_targets": [12]}},
                {"id": "porch"}
            ]"#,
        )
        .unwrap();

        let devices = load_devices(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, DeviceId::from("hall"));
        assert!(devices[0].preferences.sync_enabled);
        assert_eq!(devices[0].preferences.association_targets, vec![12]);
        assert_eq!(devices[0].preferences.dimming_duration_seconds, 8);
        assert_eq!(devices[1].preferences, Preferences::default());
    }

    #[test]
    fn test_load_devices_missing_file() {
        let path = std::env::temp_dir().join("scene-switch-sync-does-not-exist.json");
        assert!(load_devices(&path).is_err());
    }
}
