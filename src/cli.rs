//! 命令行参数与词条收集

use clap::{ArgAction, Parser};
use redactor_core::{RedactError, TermSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "redactor",
    version,
    about = "Permanently redact terms from a PDF, including scanned pages"
)]
pub struct Cli {
    /// PDF file to redact (never modified)
    pub pdf: PathBuf,

    /// Terms to redact, matched case-insensitively
    pub terms: Vec<String>,

    /// Read additional terms from a file, one per line
    #[arg(long, value_name = "FILE")]
    pub terms_file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Rasterization DPI for OCR of scanned pages
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Directory containing the pdfium library
    #[arg(long, value_name = "DIR")]
    pub pdfium_path: Option<PathBuf>,

    /// Re-open the output and check that no term is still found
    #[arg(long)]
    pub verify: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// 输入文件必须存在且扩展名为 .pdf（不区分大小写）
pub fn validate_input(path: &Path) -> Result<PathBuf, RedactError> {
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !path.is_file() || !is_pdf {
        return Err(RedactError::Input(format!(
            "'{}' is not a valid PDF file",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

/// 合并位置参数与词条文件中的词条
pub fn collect_terms(cli: &Cli) -> anyhow::Result<TermSet> {
    let mut terms = TermSet::new(&cli.terms);
    if let Some(path) = &cli.terms_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read terms file {}: {}", path.display(), e))?;
        terms.extend(TermSet::from_lines(&text));
    }
    Ok(terms)
}

/// 交互式读取词条：每行一个，连续两个空行结束
pub fn read_terms<R: BufRead>(reader: R) -> std::io::Result<TermSet> {
    let mut lines = Vec::new();
    let mut blank_run = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run >= 2 {
                break;
            }
        } else {
            blank_run = 0;
            lines.push(line);
        }
    }
    Ok(TermSet::new(lines))
}
