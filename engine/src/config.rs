use crate::error::{EditError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_THUMBNAIL_SCALE: &str = "PAGEWRIGHT_THUMBNAIL_SCALE";
pub const ENV_PDFIUM_DIR: &str = "PAGEWRIGHT_PDFIUM_DIR";
pub const ENV_COMPRESS: &str = "PAGEWRIGHT_COMPRESS";
pub const ENV_TEMP_DIR: &str = "PAGEWRIGHT_TEMP_DIR";
pub const ENV_RENDER_THUMBNAILS: &str = "PAGEWRIGHT_THUMBNAILS";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Scale factor applied to pages when rendering thumbnails.
    pub thumbnail_scale: f32,
    /// Directories searched for the pdfium library before the system one.
    pub pdfium_dirs: Vec<PathBuf>,
    pub compress_output: bool,
    /// Where save artifacts are staged. Defaults to the destination's directory,
    /// which keeps the final rename atomic.
    pub temp_dir: Option<PathBuf>,
    pub image_dpi: u32,
    /// Render thumbnails in the background after opening and rotating.
    pub render_thumbnails: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thumbnail_scale: 0.25,
            pdfium_dirs: vec![PathBuf::from("./"), PathBuf::from("./frameworks/")],
            compress_output: true,
            temp_dir: None,
            image_dpi: 144,
            render_thumbnails: true,
        }
    }
}

/// Parse a boolean-like environment value.
///
/// Truthy: `1`, `true`, `yes`, `on`. Falsy: `0`, `false`, `no`, `off` and the
/// empty string. Case-insensitive, surrounding whitespace ignored.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Reads `path` when given, then applies the `PAGEWRIGHT_*` environment
    /// variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|name| env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| EditError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| EditError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()
    }

    /// Applies overrides looked up by variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_THUMBNAIL_SCALE) {
            self.thumbnail_scale = value.trim().parse().map_err(|_| {
                EditError::InvalidConfig(format!("{} must be a number", ENV_THUMBNAIL_SCALE))
            })?;
        }

        if let Some(value) = lookup(ENV_PDFIUM_DIR) {
            self.pdfium_dirs = env::split_paths(&value).collect();
        }

        if let Some(value) = lookup(ENV_COMPRESS) {
            self.compress_output = parse_flag(ENV_COMPRESS, &value)?;
        }

        if let Some(value) = lookup(ENV_RENDER_THUMBNAILS) {
            self.render_thumbnails = parse_flag(ENV_RENDER_THUMBNAILS, &value)?;
        }

        if let Some(value) = lookup(ENV_TEMP_DIR) {
            let value = value.trim();
            self.temp_dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }

        self.validate()
    }

    fn validate(self) -> Result<Self> {
        if !(self.thumbnail_scale > 0.0 && self.thumbnail_scale <= 4.0) {
            return Err(EditError::InvalidConfig(format!(
                "thumbnail_scale must be in (0, 4], got {}",
                self.thumbnail_scale
            )));
        }
        if self.image_dpi == 0 {
            return Err(EditError::InvalidConfig("image_dpi must be positive".into()));
        }
        Ok(self)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    parse_env_flag(value)
        .ok_or_else(|| EditError::InvalidConfig(format!("{} must be a boolean, got '{}'", name, value)))
}
