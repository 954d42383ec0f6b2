use crate::cli::Cli;
use redactor_core::DEFAULT_DPI;
use redactor_ocr::TesseractConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_OCR_DPI: &str = "REDACTOR_OCR_DPI";
pub const ENV_PDFIUM_PATH: &str = "REDACTOR_PDFIUM_PATH";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactConfig {
    /// 扫描页渲染 DPI
    pub dpi: u32,
    /// pdfium 库所在目录
    pub pdfium_path: Option<PathBuf>,
    /// 保存后复查输出
    pub verify: bool,
    pub tesseract: TesseractConfig,
}

impl Default for RedactConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            pdfium_path: None,
            verify: false,
            tesseract: TesseractConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl RedactConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// 环境变量覆盖配置文件
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_OCR_DPI) {
            self.dpi = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_OCR_DPI,
                value: raw.clone(),
            })?;
        }
        if let Some(path) = lookup(ENV_PDFIUM_PATH).filter(|p| !p.is_empty()) {
            self.pdfium_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// 命令行参数优先级最高
    pub fn apply_args(&mut self, cli: &Cli) {
        if let Some(dpi) = cli.dpi {
            self.dpi = dpi;
        }
        if let Some(path) = &cli.pdfium_path {
            self.pdfium_path = Some(path.clone());
        }
        if cli.verify {
            self.verify = true;
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.dpi == 0 {
            return Err(ConfigError::Invalid {
                key: "dpi",
                value: self.dpi.to_string(),
            });
        }
        Ok(self)
    }

    /// 默认值 < 配置文件 < 环境变量 < 命令行参数
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_args(cli);
        log::debug!("[Config] {:?}", config);
        config.validate()
    }
}
