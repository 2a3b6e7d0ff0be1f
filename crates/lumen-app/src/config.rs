// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use lumen_render::RenderOptions;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "lumen".to_owned(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    /// Unset means "on in debug builds".
    pub validation: Option<bool>,
    /// Unset waits on frame fences forever.
    pub fence_timeout_ms: Option<u64>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            clear_color: default_clear(),
            validation: None,
            fence_timeout_ms: None,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

impl AppCfg {
    pub fn render_options(&self, force_validation: bool) -> RenderOptions {
        let defaults = RenderOptions::default();
        RenderOptions {
            clear_color: self.render.clear_color,
            validation: force_validation || self.render.validation.unwrap_or(defaults.validation),
            fence_timeout: self.render.fence_timeout_ms.map(Duration::from_millis),
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

/// Reads `path`; a missing or malformed file yields the defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(text) => match parse_cfg(&text) {
            Ok(cfg) => {
                info!("loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("ignoring malformed {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("no {}, using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("cannot read {}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}
