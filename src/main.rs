//! Redactor - 从 PDF 文档中永久删除指定词语
//!
//! 原生页面直接搜索文字；扫描页先渲染成位图交给 Tesseract 识别，
//! 写入不可见文字层后再脱敏。

mod cli;
mod config;
mod console;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use config::RedactConfig;
use console::ConsoleObserver;
use redactor_core::{
    verify_output, CancelFlag, Pipeline, PipelineOptions, RedactError, RedactReport, TermSet,
    VerifyResult,
};
use redactor_ocr::TesseractEngine;
use redactor_pdf::{OpenOptions, PdfDocument};
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "redactor=warn",
        1 => "redactor=info",
        _ => "redactor=debug",
    };

    // log 记录经 tracing-log 桥接到同一个订阅者
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            if matches!(err.downcast_ref::<RedactError>(), Some(RedactError::Interrupted)) {
                eprintln!("\nOperation cancelled by user.");
            } else {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let input = cli::validate_input(&cli.pdf)?;
    let config = RedactConfig::load(&cli).context("failed to load configuration")?;

    let mut terms = cli::collect_terms(&cli)?;
    if terms.is_empty() && std::io::stdin().is_terminal() {
        println!("Enter terms to redact (one per line, press Enter twice to finish):");
        terms = cli::read_terms(std::io::stdin().lock())?;
    }
    if terms.is_empty() {
        println!("No terms entered. Exiting.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Opening PDF: {}", input.display());
    println!("Terms to redact: {}", terms.iter().collect::<Vec<_>>().join(", "));

    let cancel = CancelFlag::new();
    let worker_cancel = cancel.clone();
    let mut job = tokio::task::spawn_blocking(move || {
        redact_file(&input, &terms, &config, worker_cancel)
    });

    // 中断时只设置标志，流水线在下一个页面边界停下，不写出任何文件
    let outcome = tokio::select! {
        joined = &mut job => joined,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("[CLI] 收到中断信号，等待当前页面处理结束");
            cancel.cancel();
            job.await
        }
    };
    let (report, verification) = outcome.context("redaction task failed")??;

    let Some(report) = report else {
        println!("No terms entered. Exiting.");
        return Ok(ExitCode::SUCCESS);
    };

    println!("\nRedaction complete!");
    log::info!("[CLI] 输出文件 {}", report.output_path.display());

    if let Some(result) = verification {
        if result.ok {
            println!("Verification passed: no term remains in the output.");
        } else {
            for warning in &result.warnings {
                println!("Warning: {}", warning);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// 在阻塞线程上运行完整流水线，按需复查输出
fn redact_file(
    input: &Path,
    terms: &TermSet,
    config: &RedactConfig,
    cancel: CancelFlag,
) -> redactor_core::Result<(Option<RedactReport>, Option<VerifyResult>)> {
    let open_options = OpenOptions {
        pdfium_path: config.pdfium_path.clone(),
        disable_pdfium: false,
    };
    let options = PipelineOptions {
        dpi: config.dpi,
        ..Default::default()
    };

    let mut observer = ConsoleObserver::stdout();
    let report = Pipeline::new(TesseractEngine::new(config.tesseract.clone()), &mut observer)
        .with_options(options)
        .with_cancel_flag(cancel)
        .run(input, terms, |path| Ok(PdfDocument::open_with(path, &open_options)?))?;

    let verification = match (&report, config.verify) {
        (Some(report), true) => Some(verify_file(&report.output_path, terms)?),
        _ => None,
    };
    Ok((report, verification))
}

fn verify_file(output: &Path, terms: &TermSet) -> redactor_core::Result<VerifyResult> {
    let options = OpenOptions {
        disable_pdfium: true,
        ..Default::default()
    };
    let mut document = PdfDocument::open_with(output, &options)?;
    verify_output(&mut document, terms)
}
