use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "chat_client.toml";
pub const MAX_HISTORY_LIMIT: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub ws_url: Option<String>,
    pub auth_token: Option<String>,
    pub history_limit: u32,
    pub suggestion_debounce_ms: u64,
    pub event_buffer: usize,
    pub reconnect_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            ws_url: None,
            auth_token: None,
            history_limit: 50,
            suggestion_debounce_ms: 150,
            event_buffer: 1024,
            reconnect_delay_ms: 1000,
        }
    }
}

impl ClientSettings {
    pub fn suggestion_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn history_limit(&self) -> u32 {
        self.history_limit.clamp(1, MAX_HISTORY_LIMIT)
    }

    /// Explicit `ws_url`, or `server_url` with a ws scheme and `/ws` path.
    pub fn resolved_ws_url(&self) -> anyhow::Result<Url> {
        if let Some(ws_url) = &self.ws_url {
            return Url::parse(ws_url).with_context(|| format!("invalid ws_url '{ws_url}'"));
        }

        let mut url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server_url '{}'", self.server_url))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(anyhow!("server_url must be http(s), got '{other}'")),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("failed to derive websocket url from '{}'", self.server_url))?;
        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    ws_url: Option<String>,
    auth_token: Option<String>,
    history_limit: Option<u32>,
    suggestion_debounce_ms: Option<u64>,
    event_buffer: Option<usize>,
    reconnect_delay_ms: Option<u64>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            apply_file_settings(&mut settings, file_cfg);
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if file_cfg.ws_url.is_some() {
        settings.ws_url = file_cfg.ws_url;
    }
    if file_cfg.auth_token.is_some() {
        settings.auth_token = file_cfg.auth_token;
    }
    if let Some(v) = file_cfg.history_limit {
        settings.history_limit = v;
    }
    if let Some(v) = file_cfg.suggestion_debounce_ms {
        settings.suggestion_debounce_ms = v;
    }
    if let Some(v) = file_cfg.event_buffer {
        settings.event_buffer = v;
    }
    if let Some(v) = file_cfg.reconnect_delay_ms {
        settings.reconnect_delay_ms = v;
    }
}

fn apply_env_overrides(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = var("CHAT_WS_URL") {
        settings.ws_url = Some(v);
    }
    if let Some(v) = var("APP__WS_URL") {
        settings.ws_url = Some(v);
    }

    if let Some(v) = var("CHAT_AUTH_TOKEN") {
        settings.auth_token = Some(v);
    }
    if let Some(v) = var("APP__AUTH_TOKEN") {
        settings.auth_token = Some(v);
    }

    if let Some(Ok(parsed)) = var("APP__HISTORY_LIMIT").map(|v| v.parse::<u32>()) {
        settings.history_limit = parsed;
    }
    if let Some(Ok(parsed)) = var("APP__SUGGESTION_DEBOUNCE_MS").map(|v| v.parse::<u64>()) {
        settings.suggestion_debounce_ms = parsed;
    }
    if let Some(Ok(parsed)) = var("APP__RECONNECT_DELAY_MS").map(|v| v.parse::<u64>()) {
        settings.reconnect_delay_ms = parsed;
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use super::*;

    #[test]
    fn derives_ws_url_from_server_url() {
        let settings = ClientSettings {
            server_url: "https://school.test/api/".into(),
            ..ClientSettings::default()
        };
        assert_eq!(
            settings.resolved_ws_url().expect("ws url").as_str(),
            "wss://school.test/api/ws"
        );

        let plain = ClientSettings::default();
        assert_eq!(
            plain.resolved_ws_url().expect("ws url").as_str(),
            "ws://127.0.0.1:8443/ws"
        );
    }

    #[test]
    fn explicit_ws_url_wins() {
        let settings = ClientSettings {
            ws_url: Some("ws://rt.school.test/socket".into()),
            ..ClientSettings::default()
        };
        assert_eq!(
            settings.resolved_ws_url().expect("ws url").as_str(),
            "ws://rt.school.test/socket"
        );
    }

    #[test]
    fn file_values_then_env_overrides() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "server_url = \"http://file.test\"\nhistory_limit = 20\nsuggestion_debounce_ms = 90"
        )
        .expect("write");

        let mut settings = ClientSettings::default();
        let raw = fs::read_to_string(file.path()).expect("read");
        apply_file_settings(&mut settings, toml::from_str(&raw).expect("toml"));
        assert_eq!(settings.server_url, "http://file.test");
        assert_eq!(settings.history_limit, 20);
        assert_eq!(settings.suggestion_debounce(), Duration::from_millis(90));

        let env: HashMap<&str, &str> = HashMap::from([
            ("APP__SERVER_URL", "http://env.test"),
            ("APP__HISTORY_LIMIT", "not-a-number"),
            ("CHAT_AUTH_TOKEN", "secret"),
        ]);
        apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.server_url, "http://env.test");
        assert_eq!(settings.history_limit, 20);
        assert_eq!(settings.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = load_settings_from(&dir.path().join("absent.toml"));
        assert_eq!(settings.history_limit, ClientSettings::default().history_limit);
    }

    #[test]
    fn history_limit_is_clamped() {
        let settings = ClientSettings {
            history_limit: 5000,
            ..ClientSettings::default()
        };
        assert_eq!(settings.history_limit(), MAX_HISTORY_LIMIT);
    }
}
