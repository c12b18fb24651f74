#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use classchat_protocol::DEFAULT_MAX_FRAME_SIZE;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::SecretString;
use crate::history::DEFAULT_HISTORY_PAGE_SIZE;
use crate::reconnect::{DEFAULT_RECONNECT_MAX_DELAY, DEFAULT_RECONNECT_MIN_DELAY, RECONNECT_RESET_AFTER, ReconnectPolicy};

pub const DEFAULT_HTTP_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_BASE_URL: &str = "ws://localhost:8000";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_HISTORY_MAX_PAGES: u32 = 10;

/// Default config path: `~/.classchat/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".classchat").join("config.toml"))
}

/// Load the client config from TOML and env overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
	let path = default_config_path()?;
	load_client_config_from_path(&path)
}

/// Same as `load_client_config` but with an explicit config path.
pub fn load_client_config_from_path(path: &Path) -> anyhow::Result<ClientConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ClientConfig::from_file(file_cfg);
	apply_env_overrides(&mut cfg);
	cfg.normalize();
	Ok(cfg)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub http_base_url: String,
	pub ws_base_url: String,
	pub connect_timeout: Duration,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
	/// `None` retries forever.
	pub reconnect_max_attempts: Option<u32>,
	pub history_page_size: u32,
	pub history_max_pages: u32,
	pub max_frame_bytes: usize,
	pub access_token: Option<SecretString>,
	pub user_id: Option<String>,
	pub display_name: Option<String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			http_base_url: DEFAULT_HTTP_BASE_URL.to_string(),
			ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
			reconnect_min_delay: DEFAULT_RECONNECT_MIN_DELAY,
			reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
			reconnect_max_attempts: Some(DEFAULT_RECONNECT_MAX_ATTEMPTS),
			history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
			history_max_pages: DEFAULT_HISTORY_MAX_PAGES,
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			access_token: None,
			user_id: None,
			display_name: None,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	access_token: Option<String>,
	user_id: Option<String>,
	display_name: Option<String>,

	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	connection: FileConnectionSettings,

	#[serde(default)]
	history: FileHistorySettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	http_base_url: Option<String>,
	ws_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConnectionSettings {
	connect_timeout_ms: Option<u64>,
	reconnect_min_delay_ms: Option<u64>,
	reconnect_max_delay_ms: Option<u64>,
	reconnect_max_attempts: Option<u32>,
	max_frame_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileHistorySettings {
	page_size: Option<u32>,
	max_pages: Option<u32>,
}

fn non_blank(s: Option<String>) -> Option<String> {
	s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// `0` means unlimited.
fn attempts_limit(v: u32) -> Option<u32> {
	(v > 0).then_some(v)
}

impl ClientConfig {
	fn from_file(file: FileConfig) -> Self {
		let d = Self::default();
		Self {
			http_base_url: non_blank(file.server.http_base_url).unwrap_or(d.http_base_url),
			ws_base_url: non_blank(file.server.ws_base_url).unwrap_or(d.ws_base_url),
			connect_timeout: file
				.connection
				.connect_timeout_ms
				.filter(|ms| *ms > 0)
				.map(Duration::from_millis)
				.unwrap_or(d.connect_timeout),
			reconnect_min_delay: file
				.connection
				.reconnect_min_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(d.reconnect_min_delay),
			reconnect_max_delay: file
				.connection
				.reconnect_max_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(d.reconnect_max_delay),
			reconnect_max_attempts: file
				.connection
				.reconnect_max_attempts
				.map_or(d.reconnect_max_attempts, attempts_limit),
			history_page_size: file.history.page_size.filter(|v| *v > 0).unwrap_or(d.history_page_size),
			history_max_pages: file.history.max_pages.filter(|v| *v > 0).unwrap_or(d.history_max_pages),
			max_frame_bytes: file
				.connection
				.max_frame_bytes
				.filter(|v| *v > 0)
				.unwrap_or(d.max_frame_bytes),
			access_token: non_blank(file.access_token).map(SecretString::new),
			user_id: non_blank(file.user_id),
			display_name: non_blank(file.display_name),
		}
	}

	/// Fix up inconsistent values.
	pub fn normalize(&mut self) {
		if self.reconnect_min_delay.is_zero() {
			self.reconnect_min_delay = Duration::from_millis(1);
		}
		if self.reconnect_min_delay > self.reconnect_max_delay {
			warn!(
				min_ms = self.reconnect_min_delay.as_millis() as u64,
				max_ms = self.reconnect_max_delay.as_millis() as u64,
				"reconnect_min_delay > reconnect_max_delay; swapping"
			);
			std::mem::swap(&mut self.reconnect_min_delay, &mut self.reconnect_max_delay);
		}
	}

	pub fn reconnect_policy(&self) -> ReconnectPolicy {
		ReconnectPolicy {
			min_delay: self.reconnect_min_delay,
			max_delay: self.reconnect_max_delay,
			max_attempts: self.reconnect_max_attempts,
			reset_after: RECONNECT_RESET_AFTER,
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ClientConfig) {
	apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Apply `CLASSCHAT_*` overrides read through `lookup`.
fn apply_overrides(cfg: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
	if let Some(v) = non_blank(lookup("CLASSCHAT_HTTP_BASE_URL")) {
		cfg.http_base_url = v;
		info!("client config: http_base_url overridden by env");
	}

	if let Some(v) = non_blank(lookup("CLASSCHAT_WS_BASE_URL")) {
		cfg.ws_base_url = v;
		info!("client config: ws_base_url overridden by env");
	}

	if let Some(v) = lookup("CLASSCHAT_CONNECT_TIMEOUT_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
		&& ms > 0
	{
		cfg.connect_timeout = Duration::from_millis(ms);
		info!(ms, "client config: connect_timeout overridden by env");
	}

	if let Some(v) = lookup("CLASSCHAT_RECONNECT_MIN_DELAY_MS")
		&& let Ok(min_ms) = v.trim().parse::<u64>()
	{
		cfg.reconnect_min_delay = Duration::from_millis(min_ms);
		info!(min_ms, "client config: reconnect_min_delay overridden by env");
	}

	if let Some(v) = lookup("CLASSCHAT_RECONNECT_MAX_DELAY_MS")
		&& let Ok(max_ms) = v.trim().parse::<u64>()
	{
		cfg.reconnect_max_delay = Duration::from_millis(max_ms);
		info!(max_ms, "client config: reconnect_max_delay overridden by env");
	}

	if let Some(v) = lookup("CLASSCHAT_RECONNECT_MAX_ATTEMPTS")
		&& let Ok(attempts) = v.trim().parse::<u32>()
	{
		cfg.reconnect_max_attempts = attempts_limit(attempts);
		info!(attempts, "client config: reconnect_max_attempts overridden by env");
	}

	if let Some(v) = lookup("CLASSCHAT_HISTORY_PAGE_SIZE")
		&& let Ok(size) = v.trim().parse::<u32>()
		&& size > 0
	{
		cfg.history_page_size = size;
		info!(size, "client config: history_page_size overridden by env");
	}

	if let Some(v) = non_blank(lookup("CLASSCHAT_ACCESS_TOKEN")) {
		cfg.access_token = Some(SecretString::new(v));
		info!("client auth: access_token overridden by env");
	}

	if let Some(v) = non_blank(lookup("CLASSCHAT_USER_ID")) {
		cfg.user_id = Some(v);
		info!("client auth: user_id overridden by env");
	}
}
