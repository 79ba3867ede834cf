//! Device configuration document and its durable store
//!
//! The admin layer owns `config.json`; the controller loads a fresh snapshot
//! at the start of every refresh and every power-cycle decision and never
//! keeps one across cycles. Keys this crate does not model are carried in
//! `extra` so a save never drops settings written by the admin layer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::kma::GridPoint;
use crate::widget::LayoutSpec;

/// Reads are retried to ride out a writer that does not rename atomically
const LOAD_ATTEMPTS: u32 = 3;
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config document is not a JSON object")]
    NotAnObject,
}

/// Operating mode of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    /// Interactive: stay awake on USB power while a human configures the frame
    #[default]
    Settings,
    /// Unattended battery cycling
    Operation,
}

impl PowerMode {
    pub fn toggled(self) -> Self {
        match self {
            PowerMode::Settings => PowerMode::Operation,
            PowerMode::Operation => PowerMode::Settings,
        }
    }
}

impl std::fmt::Display for PowerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerMode::Settings => write!(f, "settings"),
            PowerMode::Operation => write!(f, "operation"),
        }
    }
}

/// Power-cycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSettings {
    pub mode: PowerMode,
    /// Minutes between wakes during active hours
    pub interval_min: u32,
    /// First hour of the active window (inclusive)
    pub active_start_hour: u32,
    /// End hour of the active window (exclusive)
    pub active_end_hour: u32,
    /// Minutes to stay up after a refresh before shutting down
    pub runtime_min: u32,
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            mode: PowerMode::Settings,
            interval_min: 60,
            active_start_hour: 5,
            active_end_hour: 22,
            runtime_min: 3,
        }
    }
}

impl PowerSettings {
    pub fn runtime(&self) -> Duration {
        Duration::from_secs(u64::from(self.runtime_min) * 60)
    }
}

/// Display location: a human-readable name plus the KMA forecast grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub name: String,
    pub nx: i32,
    pub ny: i32,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            name: "경기도 평택시 고덕동".to_string(),
            nx: 61,
            ny: 115,
        }
    }
}

impl Location {
    pub fn grid(&self) -> GridPoint {
        GridPoint {
            nx: self.nx,
            ny: self.ny,
        }
    }
}

/// The whole settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// KMA (weather) service key
    pub api_key_kma: String,
    /// AirKorea (dust) service key
    pub api_key_air: String,
    pub layout: LayoutSpec,
    pub location: Location,
    /// AirKorea measuring station
    pub station_name: String,
    /// Pinned upload file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_photo: Option<String>,
    pub shuffle_mode: bool,
    pub shuffle_playlist: Vec<String>,
    pub power: PowerSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key_kma: String::new(),
            api_key_air: String::new(),
            layout: LayoutSpec::default(),
            location: Location::default(),
            station_name: "고덕".to_string(),
            selected_photo: None,
            shuffle_mode: false,
            shuffle_playlist: Vec::new(),
            power: PowerSettings::default(),
            extra: Map::new(),
        }
    }
}

impl Config {
    /// KMA key, falling back to the legacy shared `api_key` entry
    pub fn kma_key(&self) -> &str {
        self.key_or_shared(&self.api_key_kma)
    }

    /// AirKorea key, falling back to the legacy shared `api_key` entry
    pub fn air_key(&self) -> &str {
        self.key_or_shared(&self.api_key_air)
    }

    fn key_or_shared<'a>(&'a self, key: &'a str) -> &'a str {
        if !key.is_empty() {
            return key;
        }
        self.extra
            .get("api_key")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Pinned photo name, treating an empty string as unset
    pub fn pinned_photo(&self) -> Option<&str> {
        self.selected_photo.as_deref().filter(|name| !name.is_empty())
    }
}

/// Durable JSON store with atomic (temp file + rename) writes
pub struct ConfigStore {
    path: PathBuf,
    template: Option<PathBuf>,
    /// Serializes writers within this process (they share one temp file)
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            template: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Template copied into place the first time no config exists
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a fresh snapshot for reading. A missing or unreadable document
    /// yields the defaults; anything that writes back goes through
    /// `try_load` or patches the raw document instead.
    pub async fn load(&self) -> Config {
        match self.try_load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to load config from {}: {}, using defaults",
                    self.path.display(),
                    e
                );
                Config::default()
            }
        }
    }

    /// Load a fresh snapshot. A missing document (and no template) yields
    /// the defaults; an unreadable one is an error once retries run out.
    pub async fn try_load(&self) -> Result<Config, ConfigError> {
        match self.read_document().await? {
            Some(config) => Ok(config),
            None => {
                tracing::debug!("No config at {}, using defaults", self.path.display());
                Ok(Config::default())
            }
        }
    }

    /// Parse the document, or `None` when there is none yet
    async fn read_document<T: DeserializeOwned>(&self) -> Result<Option<T>, ConfigError> {
        if !exists(&self.path).await {
            self.install_template().await;
            if !exists(&self.path).await {
                return Ok(None);
            }
        }

        let mut attempt = 1;
        loop {
            match self.read().await {
                Ok(document) => return Ok(Some(document)),
                Err(e) if attempt < LOAD_ATTEMPTS => {
                    tracing::debug!("Config read attempt {} failed: {}", attempt, e);
                    tokio::time::sleep(LOAD_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn install_template(&self) {
        let Some(template) = &self.template else {
            return;
        };
        if !exists(template).await {
            return;
        }
        if let Some(parent) = self.path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match tokio::fs::copy(template, &self.path).await {
            Ok(_) => tracing::info!("Installed config template {}", template.display()),
            Err(e) => tracing::warn!("Failed to copy config template: {}", e),
        }
    }

    /// Persist the document atomically: readers see either the old or the
    /// new file, never a partial one.
    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let _writer = self.write_lock.lock().await;
        self.write(config).await
    }

    async fn write<T: Serialize>(&self, document: &T) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(document)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = temp_path(&self.path);
        let result = write_synced(&tmp_path, &json).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&tmp_path, &self.path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    /// Set the operating mode and persist it immediately.
    ///
    /// Only `power.mode` is touched in the stored document, so fields this
    /// crate cannot parse survive. An unreadable document is left alone.
    pub async fn set_mode(&self, mode: PowerMode) -> Result<(), ConfigError> {
        let _writer = self.write_lock.lock().await;
        let mut document = self.raw_document().await?;
        patch_mode(&mut document, mode)?;
        self.write(&document).await
    }

    /// Flip settings <-> operation and persist it immediately
    pub async fn toggle_mode(&self) -> Result<PowerMode, ConfigError> {
        let _writer = self.write_lock.lock().await;
        let mut document = self.raw_document().await?;
        let current = mode_of(&document);
        let next = current.toggled();
        patch_mode(&mut document, next)?;
        self.write(&document).await?;

        tracing::info!("Power mode changed: {} -> {}", current, next);
        Ok(next)
    }

    async fn raw_document(&self) -> Result<Value, ConfigError> {
        Ok(self
            .read_document()
            .await?
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}

/// `power.mode` of a raw document; absent or unknown reads as the default
fn mode_of(document: &Value) -> PowerMode {
    document
        .get("power")
        .and_then(|power| power.get("mode"))
        .and_then(|mode| PowerMode::deserialize(mode).ok())
        .unwrap_or_default()
}

fn patch_mode(document: &mut Value, mode: PowerMode) -> Result<(), ConfigError> {
    let Value::Object(root) = document else {
        return Err(ConfigError::NotAnObject);
    };

    let power = root
        .entry("power")
        .or_insert_with(|| Value::Object(Map::new()));
    if !power.is_object() {
        *power = Value::Object(Map::new());
    }
    if let Value::Object(power) = power {
        power.insert("mode".to_string(), Value::String(mode.to_string()));
    }
    Ok(())
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// On-disk layout of the frame's working directory
#[derive(Debug, Clone)]
pub struct FramePaths {
    home: PathBuf,
}

impl FramePaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Base directory from `FRAME_HOME`, defaulting to the working directory
    pub fn from_env() -> Self {
        let home = std::env::var_os("FRAME_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.json")
    }

    pub fn config_template(&self) -> PathBuf {
        self.home.join("config_template.json")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.home.join("uploads")
    }

    /// Live preview consumed by the admin UI
    pub fn preview_file(&self) -> PathBuf {
        self.home.join("static").join("preview.jpg")
    }

    /// Dithered panel frame written by the file display driver
    pub fn panel_dump_file(&self) -> PathBuf {
        self.home.join("static").join("panel.png")
    }

    pub fn icons_dir(&self) -> PathBuf {
        self.home.join("icons")
    }

    /// Font files tried in order; the first that parses wins
    pub fn font_candidates(&self) -> Vec<PathBuf> {
        vec![
            self.home.join("AppleSDGothicNeoB.ttf"),
            self.home.join("fonts").join("frame.ttf"),
            PathBuf::from("/usr/share/fonts/truetype/nanum/NanumGothicBold.ttf"),
            PathBuf::from("/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc"),
            PathBuf::from("/usr/share/fonts/truetype/noto/NotoSansCJK-Bold.ttc"),
            PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::LayoutKind;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let config = store.load().await;
        assert_eq!(config, Config::default());
        assert_eq!(config.power.mode, PowerMode::Settings);
    }

    #[tokio::test]
    async fn test_template_installed_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("config_template.json");
        std::fs::write(&template, r#"{"station_name": "종로구"}"#).unwrap();

        let store = ConfigStore::new(dir.path().join("config.json")).with_template(&template);
        let config = store.load().await;

        assert_eq!(config.station_name, "종로구");
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = ConfigStore::new(&path).load().await;
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_save_preserves_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "ai_provider": "huggingface",
                "layout": {"type": "custom", "x": "120", "y": 40, "font_size": 20},
                "power": {"mode": "operation", "interval_min": 30}
            }"#,
        )
        .unwrap();

        let store = ConfigStore::new(&path);
        let mut config = store.load().await;
        assert_eq!(config.layout.kind, LayoutKind::Custom);
        assert_eq!(config.layout.x, Some(120.0));
        assert_eq!(config.power.mode, PowerMode::Operation);
        assert_eq!(config.power.interval_min, 30);
        assert_eq!(config.power.active_end_hour, 22);

        config.station_name = "고덕".to_string();
        store.save(&config).await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["ai_provider"], "huggingface");
        assert_eq!(raw["layout"]["font_size"], 20);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_toggle_mode_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));

        assert_eq!(store.toggle_mode().await.unwrap(), PowerMode::Operation);
        assert_eq!(store.load().await.power.mode, PowerMode::Operation);
        assert_eq!(store.toggle_mode().await.unwrap(), PowerMode::Settings);
        assert_eq!(store.load().await.power.mode, PowerMode::Settings);
    }

    #[tokio::test]
    async fn test_blank_layout_number_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "api_key_kma": "K",
                "api_key_air": "A",
                "station_name": "종로구",
                "layout": {"opacity": "", "widget_size": "x"},
                "power": {"mode": "operation"}
            }"#,
        )
        .unwrap();

        let store = ConfigStore::new(&path);
        let config = store.try_load().await.unwrap();
        assert_eq!(config.kma_key(), "K");
        assert_eq!(config.air_key(), "A");
        assert_eq!(config.station_name, "종로구");
        assert_eq!(config.power.mode, PowerMode::Operation);
        assert_eq!(config.layout.scale(), 1.0);

        assert_eq!(store.toggle_mode().await.unwrap(), PowerMode::Settings);
        let config = store.load().await;
        assert_eq!(config.kma_key(), "K");
        assert_eq!(config.station_name, "종로구");
        assert_eq!(config.power.mode, PowerMode::Settings);
    }

    #[tokio::test]
    async fn test_try_load_reports_unparsable_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key_kma": "K", "power": {"interval_min": "thirty"}}"#).unwrap();

        let store = ConfigStore::new(&path);
        assert!(matches!(store.try_load().await, Err(ConfigError::Json(_))));
        assert_eq!(store.load().await, Config::default());
    }

    #[tokio::test]
    async fn test_mode_change_only_patches_power_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_key_kma": "K", "power": {"mode": "settings", "interval_min": "thirty"}}"#,
        )
        .unwrap();

        let store = ConfigStore::new(&path);
        assert_eq!(store.toggle_mode().await.unwrap(), PowerMode::Operation);

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["api_key_kma"], "K");
        assert_eq!(raw["power"]["mode"], "operation");
        assert_eq!(raw["power"]["interval_min"], "thirty");
    }

    #[tokio::test]
    async fn test_mode_change_leaves_broken_json_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key_kma": "K""#).unwrap();

        let store = ConfigStore::new(&path);
        assert!(store.toggle_mode().await.is_err());
        assert!(store.set_mode(PowerMode::Operation).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"api_key_kma": "K""#);

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            store.set_mode(PowerMode::Operation).await,
            Err(ConfigError::NotAnObject)
        ));
    }

    #[test]
    fn test_shared_key_fallback() {
        let mut config = Config::default();
        config
            .extra
            .insert("api_key".to_string(), Value::String("shared".to_string()));
        config.api_key_air = "air".to_string();

        assert_eq!(config.kma_key(), "shared");
        assert_eq!(config.air_key(), "air");
    }

    #[test]
    fn test_empty_pinned_photo_is_unset() {
        let config = Config {
            selected_photo: Some(String::new()),
            ..Config::default()
        };
        assert_eq!(config.pinned_photo(), None);
    }
}
