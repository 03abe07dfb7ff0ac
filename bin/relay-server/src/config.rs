//! Server configuration.
//!
//! Loaded in three layers: built-in defaults, an optional YAML file
//! (`--config` / `RELAY_CONFIG_FILE`, default `config.yml` when present), then
//! environment variables.  Credential variables keep the names the vendors document
//! (`LINE_CHANNEL_SECRET`, `FACEBOOK_PAGE_ACCESS_TOKEN`, `OPENAI_API_KEY`, ...).

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

use crate::relay::hours::WorkingHours;

const DEFAULT_CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime configuration for relay-server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP address to bind.
    pub bind_address: String,
    /// sqlx connection string.  SQLite by default.
    pub database_url: String,
    pub database_max_connections: u32,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,
    /// Emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Bearer token for `/admin` routes.  Unset leaves them open.
    pub admin_token: Option<String>,

    /// IANA zone used for "today" and working hours.
    pub timezone: String,

    // ── agent ───────────────────────────────────────────────────────────────
    pub model: String,
    pub temperature: f32,
    pub system_prompt_path: PathBuf,
    pub price_sheet_path: Option<PathBuf>,
    pub tool_schema_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,

    // ── follow-up and gating ───────────────────────────────────────────────
    pub follow_up_days: i64,
    /// `HH:MM`; both ends must be set to enable gating.
    pub work_start: Option<String>,
    pub work_end: Option<String>,

    // ── spreadsheet ─────────────────────────────────────────────────────────
    pub spreadsheet_id: Option<String>,
    pub profile_sheet: String,
    pub contact_sheet: String,
    pub settings_sheet: String,
    /// Static OAuth token for the Sheets API.  Takes precedence over
    /// `google_credentials_path`.
    pub google_access_token: Option<String>,
    /// Service-account JSON key.  When neither this nor a static token is
    /// set, application-default credentials are used.
    pub google_credentials_path: Option<PathBuf>,

    // ── channels ────────────────────────────────────────────────────────────
    pub line_channel_access_token: Option<String>,
    pub line_channel_secret: Option<String>,
    pub messenger_page_access_token: Option<String>,
    pub messenger_verify_token: Option<String>,
    /// Enables `X-Hub-Signature-256` checks when set.
    pub messenger_app_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_owned(),
            database_url: "sqlite://relay.db?mode=rwc".to_owned(),
            database_max_connections: 5,
            log_level: "info".to_owned(),
            log_json: false,
            admin_token: None,
            timezone: "Asia/Bangkok".to_owned(),
            model: "gpt-4o-mini-2024-07-18".to_owned(),
            temperature: 0.0,
            system_prompt_path: PathBuf::from("prompts/operator_agent_prompt.txt"),
            price_sheet_path: None,
            tool_schema_path: PathBuf::from("tools/functions_calling.json"),
            openai_api_key: None,
            openai_base_url: relay_agent::openai::DEFAULT_BASE_URL.to_owned(),
            follow_up_days: 7,
            work_start: None,
            work_end: None,
            spreadsheet_id: None,
            profile_sheet: "Client tag".to_owned(),
            contact_sheet: "Client info".to_owned(),
            settings_sheet: "Settings".to_owned(),
            google_access_token: None,
            google_credentials_path: None,
            line_channel_access_token: None,
            line_channel_secret: None,
            messenger_page_access_token: None,
            messenger_verify_token: None,
            messenger_app_secret: None,
        }
    }
}

impl Config {
    /// Defaults → YAML file → process environment.
    ///
    /// `path` is an explicit config file, which must exist.  Without one,
    /// `config.yml` in the working directory is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_yaml_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_owned(),
            source,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Override fields from environment-style lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).and_then(clean);

        set_string(&mut self.bind_address, get("RELAY_BIND"));
        set_string(&mut self.database_url, get("RELAY_DATABASE_URL"));
        set_parsed(&mut self.database_max_connections, get("RELAY_DATABASE_MAX_CONNECTIONS"));
        set_string(&mut self.log_level, get("RELAY_LOG"));
        if let Some(v) = get("RELAY_LOG_JSON") {
            self.log_json = v == "1" || v.eq_ignore_ascii_case("true");
        }
        set_option(&mut self.admin_token, get("RELAY_ADMIN_TOKEN"));
        set_string(&mut self.timezone, get("RELAY_TIMEZONE"));

        set_string(&mut self.model, get("RELAY_MODEL"));
        set_parsed(&mut self.temperature, get("RELAY_TEMPERATURE"));
        if let Some(v) = get("RELAY_SYSTEM_PROMPT") {
            self.system_prompt_path = PathBuf::from(v);
        }
        if let Some(v) = get("RELAY_PRICE_SHEET") {
            self.price_sheet_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("RELAY_TOOL_SCHEMAS") {
            self.tool_schema_path = PathBuf::from(v);
        }
        set_option(&mut self.openai_api_key, get("OPENAI_API_KEY"));
        set_string(&mut self.openai_base_url, get("OPENAI_BASE_URL"));

        set_parsed(&mut self.follow_up_days, get("RELAY_FOLLOW_UP_DAYS"));
        set_option(&mut self.work_start, get("RELAY_WORK_START"));
        set_option(&mut self.work_end, get("RELAY_WORK_END"));

        set_option(&mut self.spreadsheet_id, get("RELAY_SPREADSHEET_ID"));
        set_string(&mut self.profile_sheet, get("RELAY_PROFILE_SHEET"));
        set_string(&mut self.contact_sheet, get("RELAY_CONTACT_SHEET"));
        set_string(&mut self.settings_sheet, get("RELAY_SETTINGS_SHEET"));
        set_option(&mut self.google_access_token, get("GOOGLE_SHEETS_ACCESS_TOKEN"));
        if let Some(v) = get("GOOGLE_APPLICATION_CREDENTIALS") {
            self.google_credentials_path = Some(PathBuf::from(v));
        }

        set_option(&mut self.line_channel_access_token, get("LINE_CHANNEL_ACCESS_TOKEN"));
        set_option(&mut self.line_channel_secret, get("LINE_CHANNEL_SECRET"));
        set_option(&mut self.messenger_page_access_token, get("FACEBOOK_PAGE_ACCESS_TOKEN"));
        set_option(&mut self.messenger_verify_token, get("MESSENGER_VERIFY_TOKEN"));
        set_option(&mut self.messenger_app_secret, get("FACEBOOK_APP_SECRET"));
    }

    pub fn line_enabled(&self) -> bool {
        self.line_channel_access_token.is_some() && self.line_channel_secret.is_some()
    }

    pub fn messenger_enabled(&self) -> bool {
        self.messenger_page_access_token.is_some() && self.messenger_verify_token.is_some()
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse::<Tz>().map_err(|e| ConfigError::Invalid {
            key: "RELAY_TIMEZONE",
            message: e.to_string(),
        })
    }

    /// Working hours from config, if both ends are set.
    pub fn working_hours(&self) -> Result<Option<WorkingHours>, ConfigError> {
        match (&self.work_start, &self.work_end) {
            (Some(start), Some(end)) => WorkingHours::parse(start, end)
                .map(Some)
                .map_err(|message| ConfigError::Invalid {
                    key: "RELAY_WORK_START/RELAY_WORK_END",
                    message,
                }),
            (None, None) => Ok(None),
            _ => Err(ConfigError::Invalid {
                key: "RELAY_WORK_START/RELAY_WORK_END",
                message: "both start and end must be set".to_owned(),
            }),
        }
    }

    pub fn spreadsheet_id(&self) -> Result<&str, ConfigError> {
        self.spreadsheet_id
            .as_deref()
            .ok_or(ConfigError::Missing("RELAY_SPREADSHEET_ID"))
    }

    pub fn openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    /// Checks shared by every mode.  Failing here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_channel_access_token.is_some() != self.line_channel_secret.is_some() {
            return Err(ConfigError::Invalid {
                key: "LINE_CHANNEL_ACCESS_TOKEN/LINE_CHANNEL_SECRET",
                message: "both must be set to enable LINE".to_owned(),
            });
        }
        if self.messenger_page_access_token.is_some() != self.messenger_verify_token.is_some() {
            return Err(ConfigError::Invalid {
                key: "FACEBOOK_PAGE_ACCESS_TOKEN/MESSENGER_VERIFY_TOKEN",
                message: "both must be set to enable Messenger".to_owned(),
            });
        }
        if !self.line_enabled() && !self.messenger_enabled() {
            return Err(ConfigError::Missing(
                "LINE_CHANNEL_ACCESS_TOKEN or FACEBOOK_PAGE_ACCESS_TOKEN",
            ));
        }
        if self.follow_up_days < 0 {
            return Err(ConfigError::Invalid {
                key: "RELAY_FOLLOW_UP_DAYS",
                message: "must not be negative".to_owned(),
            });
        }
        self.spreadsheet_id()?;
        self.tz()?;
        self.working_hours()?;
        Ok(())
    }
}

impl Config {
    /// [`Config::validate`] plus the settings only the webhook server needs.
    pub fn validate_serve(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.openai_api_key()?;
        Ok(())
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

/// Trim whitespace and surrounding quotes; empty values count as unset.
fn clean(value: String) -> Option<String> {
    let v = value.trim().trim_matches('"').trim();
    if v.is_empty() { None } else { Some(v.to_owned()) }
}

fn set_string(field: &mut String, value: Option<String>) {
    if let Some(v) = value {
        *field = v;
    }
}

fn set_option(field: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *field = value;
    }
}

fn set_parsed<T: std::str::FromStr>(field: &mut T, value: Option<String>) {
    if let Some(parsed) = value.and_then(|v| v.parse().ok()) {
        *field = parsed;
    }
}
