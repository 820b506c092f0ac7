use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{ColorBounds, DEFAULT_WINDOW_FRAMES};
use crate::pipeline::{PipelineConfig, DEFAULT_PACING};
use crate::stage::{EdgeDetection, Reduction, StageConfig};

const DEFAULT_SOURCE: &str = "stub://synthetic";
const DEFAULT_KERNEL_SIZE: u32 = 3;
const DEFAULT_SIGMA: f64 = 0.05;
const DEFAULT_NEIGHBOURS: u32 = 8;
const DEFAULT_VIBRATION_WINDOW: u32 = 2;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VibrationdConfigFile {
    source: Option<String>,
    window: Option<WindowConfigFile>,
    edges: Option<EdgesConfigFile>,
    reduction: Option<Reduction>,
    bounds: Option<ColorBounds>,
    vibration: Option<VibrationConfigFile>,
    capture: Option<CaptureConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct WindowConfigFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct EdgesConfigFile {
    mode: Option<String>,
    kernel_size: Option<u32>,
    sigma: Option<f64>,
    l2_gradient: Option<bool>,
    low: Option<f64>,
    high: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct VibrationConfigFile {
    neighbours: Option<u32>,
    window_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    subsample: Option<bool>,
    pacing_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VibrationdConfig {
    pub source: String,
    pub stage: StageConfig,
    pub pipeline: PipelineConfig,
    /// PNG output directory; `None` logs frames instead.
    pub output_dir: Option<PathBuf>,
}

impl Default for VibrationdConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            stage: StageConfig::default(),
            pipeline: PipelineConfig::default(),
            output_dir: None,
        }
    }
}

impl VibrationdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VIBRATION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VibrationdConfigFile) -> Result<Self> {
        let edges = file.edges.unwrap_or_default();
        let kernel_size = edges.kernel_size.unwrap_or(DEFAULT_KERNEL_SIZE);
        let l2_gradient = edges.l2_gradient.unwrap_or(true);
        let edges = match edges.mode.as_deref().unwrap_or("auto") {
            "auto" => EdgeDetection::Auto {
                kernel_size,
                sigma: edges.sigma.unwrap_or(DEFAULT_SIGMA),
                l2_gradient,
            },
            "fixed" => EdgeDetection::Fixed {
                low: edges
                    .low
                    .ok_or_else(|| anyhow!("edges.low is required for fixed edge detection"))?,
                high: edges
                    .high
                    .ok_or_else(|| anyhow!("edges.high is required for fixed edge detection"))?,
                kernel_size,
                l2_gradient,
            },
            "threshold" => EdgeDetection::Threshold {
                low: edges
                    .low
                    .ok_or_else(|| anyhow!("edges.low is required for threshold mode"))?,
                high: edges.high.unwrap_or(255.0),
            },
            other => {
                return Err(anyhow!(
                    "unknown edges.mode '{}' (expected auto, fixed or threshold)",
                    other
                ))
            }
        };
        let vibration = file.vibration.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        Ok(Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            stage: StageConfig {
                capacity: file
                    .window
                    .and_then(|window| window.capacity)
                    .unwrap_or(DEFAULT_WINDOW_FRAMES),
                edges,
                reduction: file.reduction.unwrap_or_default(),
                bounds: file.bounds.unwrap_or_default(),
                neighbours: vibration.neighbours.unwrap_or(DEFAULT_NEIGHBOURS),
                window_size: vibration.window_size.unwrap_or(DEFAULT_VIBRATION_WINDOW),
            },
            pipeline: PipelineConfig {
                subsample: capture.subsample.unwrap_or(true),
                pacing: capture
                    .pacing_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_PACING),
            },
            output_dir: file.output.and_then(|output| output.dir),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("VIBRATION_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(capacity) = std::env::var("VIBRATION_CAPACITY") {
            self.stage.capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("VIBRATION_CAPACITY must be a positive integer"))?;
        }
        if let Ok(subsample) = std::env::var("VIBRATION_SUBSAMPLE") {
            self.pipeline.subsample = parse_bool(&subsample)
                .ok_or_else(|| anyhow!("VIBRATION_SUBSAMPLE must be true or false"))?;
        }
        if let Ok(pacing) = std::env::var("VIBRATION_PACING_MS") {
            let millis: u64 = pacing.trim().parse().map_err(|_| {
                anyhow!("VIBRATION_PACING_MS must be an integer number of milliseconds")
            })?;
            self.pipeline.pacing = Duration::from_millis(millis);
        }
        if let Ok(reduction) = std::env::var("VIBRATION_REDUCTION") {
            self.stage.reduction = reduction.parse()?;
        }
        if let Ok(dir) = std::env::var("VIBRATION_OUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if self.stage.capacity == 0 {
            return Err(anyhow!("window capacity must be greater than zero"));
        }
        if self.stage.window_size == 0 {
            return Err(anyhow!("vibration window size must be greater than zero"));
        }
        match self.stage.edges {
            EdgeDetection::Auto {
                kernel_size, sigma, ..
            } => {
                validate_kernel_size(kernel_size)?;
                if !sigma.is_finite() || sigma < 0.0 {
                    return Err(anyhow!("edges.sigma must be finite and non-negative"));
                }
            }
            EdgeDetection::Fixed {
                low,
                high,
                kernel_size,
                ..
            } => {
                validate_kernel_size(kernel_size)?;
                validate_thresholds(low, high)?;
            }
            EdgeDetection::Threshold { low, high } => validate_thresholds(low, high)?,
        }
        Ok(())
    }
}

fn validate_kernel_size(kernel_size: u32) -> Result<()> {
    if !(3..=7).contains(&kernel_size) || kernel_size % 2 == 0 {
        return Err(anyhow!(
            "edges.kernel_size must be 3, 5 or 7 (got {})",
            kernel_size
        ));
    }
    Ok(())
}

fn validate_thresholds(low: f64, high: f64) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || low < 0.0 || low > high {
        return Err(anyhow!(
            "edge thresholds must satisfy 0 <= low <= high (low={}, high={})",
            low,
            high
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<VibrationdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: VibrationdConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = VibrationdConfig::from_file(VibrationdConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.stage.capacity, 10);
        assert_eq!(cfg.stage.bounds, ColorBounds::new(8, 9, 10, 11));
        assert_eq!(cfg.stage.reduction, Reduction::DifferenceReduce);
        assert!(cfg.pipeline.subsample);
        assert_eq!(cfg.pipeline.pacing, Duration::from_millis(10));
    }

    #[test]
    fn fixed_mode_requires_thresholds() {
        let file = VibrationdConfigFile {
            edges: Some(EdgesConfigFile {
                mode: Some("fixed".into()),
                ..EdgesConfigFile::default()
            }),
            ..VibrationdConfigFile::default()
        };
        assert!(VibrationdConfig::from_file(file).is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = VibrationdConfig::default();
        cfg.stage.capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = VibrationdConfig::default();
        cfg.stage.edges = EdgeDetection::Auto {
            kernel_size: 4,
            sigma: 0.05,
            l2_gradient: true,
        };
        assert!(cfg.validate().is_err());

        let mut cfg = VibrationdConfig::default();
        cfg.stage.edges = EdgeDetection::Threshold {
            low: 200.0,
            high: 100.0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
