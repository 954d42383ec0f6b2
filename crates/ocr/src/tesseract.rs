//! Tesseract OCR 引擎实现（CLI 包装）

use crate::error::OcrError;
use image::{DynamicImage, ImageFormat};
use redactor_core::{OcrDetection, OcrEngine};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

/// Tesseract 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TesseractConfig {
    /// 可执行文件路径，默认在 PATH 中查找
    pub binary_path: Option<String>,
    /// 设置为 TESSDATA_PREFIX
    pub tessdata_path: Option<String>,
    pub lang: String,
    /// 页面分割模式
    pub psm: u32,
    /// 引擎模式
    pub oem: u32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            tessdata_path: None,
            lang: "eng".to_string(),
            psm: 3,
            oem: 1,
        }
    }
}

/// Tesseract OCR 引擎
///
/// 创建时不访问可执行文件，第一次识别时才检测版本。
pub struct TesseractEngine {
    config: TesseractConfig,
    version: Option<String>,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Self {
        Self {
            config,
            version: None,
        }
    }

    fn binary_path(&self) -> &str {
        self.config.binary_path.as_deref().unwrap_or("tesseract")
    }

    /// 检测到的版本号
    pub fn version(&mut self) -> Result<&str, OcrError> {
        if self.version.is_none() {
            let version = get_tesseract_version(self.binary_path())?;
            log::info!("[Tesseract] 初始化成功，版本: {}", version);
            self.version = Some(version);
        }
        Ok(self.version.as_deref().unwrap_or("unknown"))
    }

    fn run(&self, image_path: &Path) -> Result<String, OcrError> {
        let mut cmd = Command::new(self.binary_path());
        cmd.arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.lang)
            .arg("--psm")
            .arg(self.config.psm.to_string())
            .arg("--oem")
            .arg(self.config.oem.to_string())
            .arg("tsv");

        if let Some(tessdata_path) = &self.config.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata_path);
        }

        log::debug!(
            "[Tesseract] 执行: {} {:?} -l {} --psm {} --oem {} tsv",
            self.binary_path(),
            image_path,
            self.config.lang,
            self.config.psm,
            self.config.oem
        );

        let output = cmd
            .output()
            .map_err(|e| OcrError::Command(format!("无法启动 {}: {}", self.binary_path(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Command(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn recognize_image(&mut self, image: &DynamicImage) -> Result<Vec<OcrDetection>, OcrError> {
        self.version()?;
        let start = Instant::now();

        // 灰度 PNG 写入临时文件，drop 时删除
        let mut temp = tempfile::Builder::new()
            .prefix("redactor_ocr_")
            .suffix(".png")
            .tempfile()?;
        DynamicImage::ImageLuma8(image.to_luma8())
            .write_to(temp.as_file_mut(), ImageFormat::Png)
            .map_err(|e| OcrError::ImageProcess(format!("保存临时图片失败: {}", e)))?;
        temp.as_file_mut().flush()?;

        let tsv = self.run(temp.path())?;
        let results = parse_tesseract_tsv(&tsv);

        log::info!(
            "[Tesseract] 识别完成，耗时: {} ms，结果数: {}",
            start.elapsed().as_millis(),
            results.len()
        );
        Ok(results)
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&mut self, image: &DynamicImage) -> redactor_core::Result<Vec<OcrDetection>> {
        Ok(self.recognize_image(image)?)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// 解析 Tesseract TSV 输出
///
/// TSV 格式：
/// level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
///
/// 只保留单词级别（level=5）的结果，坐标为像素
pub fn parse_tesseract_tsv(tsv: &str) -> Vec<OcrDetection> {
    let mut results = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let level: i32 = cols[0].parse().unwrap_or(-1);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        results.push(OcrDetection {
            text: text.to_string(),
            left: cols[6].parse().unwrap_or(0.0),
            top: cols[7].parse().unwrap_or(0.0),
            width: cols[8].parse().unwrap_or(0.0),
            height: cols[9].parse().unwrap_or(0.0),
            confidence: conf,
        });
    }

    results
}

/// 获取 Tesseract 版本
pub fn get_tesseract_version(binary_path: &str) -> Result<String, OcrError> {
    let output = Command::new(binary_path)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::Unavailable(format!("无法执行 {}: {}", binary_path, e)))?;

    if !output.status.success() {
        return Err(OcrError::Unavailable(format!(
            "{} --version 执行失败",
            binary_path
        )));
    }

    // 部分版本把版本信息写到 stderr
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(parse_version(&combined))
}

/// 格式通常是 "tesseract 5.3.0" 或 "tesseract v5.3.0"
fn parse_version(output: &str) -> String {
    output
        .lines()
        .filter(|line| line.contains("tesseract"))
        .find_map(|line| line.split_whitespace().nth(1))
        .map(|v| v.trim_start_matches('v').to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
