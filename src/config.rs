//! Configuration for area-toolkit
//!
//! Loads configuration from TOML file at `~/.config/area-toolkit/config.toml`
//! Auto-generates default config file on first run if missing.
//! A few command line flags (`--display`, `--geometry`, `--title`) override
//! the loaded values; they are passed through without further meaning.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::display::DisplayOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub window: WindowConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path, writing the defaults there if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);
        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area-toolkit");
        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;
        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    /// Apply command line overrides. Unknown arguments are ignored.
    pub fn apply_args<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_ref() {
                "--display" | "-display" => {
                    let name = args.next().context("--display needs a value")?;
                    self.display.name = Some(name.as_ref().to_string());
                }
                "--geometry" | "-geometry" => {
                    let spec = args.next().context("--geometry needs a value")?;
                    self.window.apply_geometry(spec.as_ref())?;
                }
                "--title" | "-title" => {
                    let title = args.next().context("--title needs a value")?;
                    self.window.title = title.as_ref().to_string();
                }
                "--sync" | "-sync" => self.display.synchronous = true,
                _ => {}
            }
        }
        Ok(())
    }

    /// Connection tuning derived from the `display` and `timing` sections
    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            double_click: Duration::from_millis(self.timing.double_click_ms),
            idle_wait: Duration::from_millis(self.timing.idle_wait_ms),
            max_wait: Duration::from_millis(self.timing.max_wait_ms),
            synchronous: self.display.synchronous,
        }
    }
}

/// Display connection configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// X display name, e.g. ":1" (falls back to $DISPLAY)
    pub name: Option<String>,
    /// Round-trip after every flush (slow, for debugging server errors)
    pub synchronous: bool,
}

/// Initial window geometry and title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: i32,
    pub height: i32,
    pub x: i32,
    pub y: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "area-toolkit".to_string(),
            width: 400,
            height: 300,
            x: 100,
            y: 100,
        }
    }
}

impl WindowConfig {
    /// Parse an X-style geometry string: `WxH`, `+X+Y` or `WxH+X+Y`
    /// (offsets may be negative)
    pub fn apply_geometry(&mut self, spec: &str) -> Result<()> {
        let offsets_at = spec.find(['+', '-']).unwrap_or(spec.len());
        let (size, offsets) = spec.split_at(offsets_at);

        if !size.is_empty() {
            let (w, h) = size
                .split_once(['x', 'X'])
                .with_context(|| format!("Invalid geometry size '{}'", size))?;
            let width: i32 = w.parse().with_context(|| format!("Invalid width '{}'", w))?;
            let height: i32 = h.parse().with_context(|| format!("Invalid height '{}'", h))?;
            if width <= 0 || height <= 0 {
                bail!("Geometry size must be positive, got {}x{}", width, height);
            }
            self.width = width;
            self.height = height;
        }

        if !offsets.is_empty() {
            // The y offset starts at the first sign after the x digits
            let digits_at = offsets.len() - offsets.trim_start_matches(['+', '-']).len();
            let y_at = offsets[digits_at..]
                .find(['+', '-'])
                .map(|i| i + digits_at)
                .with_context(|| format!("Invalid geometry offsets '{}'", offsets))?;
            let (x, y) = offsets.split_at(y_at);
            self.x = parse_offset(x).with_context(|| format!("Invalid x offset '{}'", x))?;
            self.y = parse_offset(y).with_context(|| format!("Invalid y offset '{}'", y))?;
        }
        Ok(())
    }
}

/// `+N`, `-N` or `+-N`
fn parse_offset(text: &str) -> Result<i32> {
    let unsigned = text.strip_prefix('+').unwrap_or(text);
    Ok(unsigned.parse()?)
}

/// Event loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Largest press-to-press gap for a double click
    pub double_click_ms: u64,
    /// Wait cap when no timer is armed
    pub idle_wait_ms: u64,
    /// Wait cap when the next timer is further away
    pub max_wait_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            double_click_ms: 500,
            idle_wait_ms: 100,
            max_wait_ms: 100_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "area_toolkit=debug,info".to_string(),
        }
    }
}
