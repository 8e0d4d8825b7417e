use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::circle::BlobParams;
use crate::compose::PaletteSource;
use crate::ingest::SyntheticCameraConfig;
use crate::pipeline::PipelineSettings;
use crate::select::{DepthPolicy, DEFAULT_DEPTH_SEARCH_RADIUS};

const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const MAX_DEPTH_SEARCH_RADIUS: u32 = 64;

#[derive(Debug, Deserialize, Default)]
struct MaskNodeConfigFile {
    disable_circle_depth: Option<bool>,
    disable_mask_depth: Option<bool>,
    query_timeout_ms: Option<u64>,
    depth_search_radius: Option<u32>,
    palette_seed: Option<u64>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MaskNodeConfig {
    pub disable_circle_depth: bool,
    pub disable_mask_depth: bool,
    pub query_timeout: Duration,
    pub depth_search_radius: u32,
    pub palette_seed: Option<u64>,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl MaskNodeConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MASK_NODE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit file instead of `MASK_NODE_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MaskNodeConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        Self {
            disable_circle_depth: file.disable_circle_depth.unwrap_or(true),
            disable_mask_depth: file.disable_mask_depth.unwrap_or(false),
            query_timeout: Duration::from_millis(
                file.query_timeout_ms.unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
            ),
            depth_search_radius: file
                .depth_search_radius
                .unwrap_or(DEFAULT_DEPTH_SEARCH_RADIUS),
            palette_seed: file.palette_seed,
            camera: CameraSettings {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("MASK_DISABLE_CIRCLE_DEPTH") {
            self.disable_circle_depth = parse_flag("MASK_DISABLE_CIRCLE_DEPTH", &value)?;
        }
        if let Ok(value) = std::env::var("MASK_DISABLE_MASK_DEPTH") {
            self.disable_mask_depth = parse_flag("MASK_DISABLE_MASK_DEPTH", &value)?;
        }
        if let Ok(value) = std::env::var("MASK_QUERY_TIMEOUT_MS") {
            let millis: u64 = value.trim().parse().map_err(|_| {
                anyhow!("MASK_QUERY_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.query_timeout = Duration::from_millis(millis);
        }
        if let Ok(value) = std::env::var("MASK_DEPTH_SEARCH_RADIUS") {
            self.depth_search_radius = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("MASK_DEPTH_SEARCH_RADIUS must be a pixel count"))?;
        }
        if let Ok(value) = std::env::var("MASK_PALETTE_SEED") {
            if !value.trim().is_empty() {
                let seed = value
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("MASK_PALETTE_SEED must be an unsigned integer"))?;
                self.palette_seed = Some(seed);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.query_timeout.is_zero() {
            return Err(anyhow!("query timeout must be greater than zero"));
        }
        if self.depth_search_radius > MAX_DEPTH_SEARCH_RADIUS {
            return Err(anyhow!(
                "depth search radius {} exceeds {}",
                self.depth_search_radius,
                MAX_DEPTH_SEARCH_RADIUS
            ));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera frame size must be non-empty"));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            depth_policy: DepthPolicy {
                search_radius: self.depth_search_radius,
            },
            palette: PaletteSource::from_seed(self.palette_seed),
            circle: (!self.disable_circle_depth).then(BlobParams::default),
        }
    }

    /// Synthetic camera at the configured url and size, with the default scene.
    pub fn camera_config(&self) -> SyntheticCameraConfig {
        SyntheticCameraConfig {
            url: self.camera.url.clone(),
            width: self.camera.width,
            height: self.camera.height,
            ..SyntheticCameraConfig::default()
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (true/false)", name)),
    }
}

fn read_config_file(path: &Path) -> Result<MaskNodeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
