//! Setup/initialization module - handles worker startup tasks
//!
//! Includes:
//! - Logger initialization
//! - Folder structure initialization

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, WriteStyle};
use log::kv::Key;
use std::{fs, io::Write};

use crate::config::AppConfig;

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

/// Create the local directories the worker writes into
pub fn initialize_folder(config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&config.staging_dir).context(format!(
        "failed to create staging directory {:?}",
        config.staging_dir
    ))?;
    if config.store_endpoint.is_none() {
        fs::create_dir_all(&config.store_root)
            .context(format!("failed to create store root {:?}", config.store_root))?;
    }
    if let Some(parent) = config.database_path.parent() {
        fs::create_dir_all(parent)
            .context(format!("failed to create database directory {:?}", parent))?;
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

const DIM: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::BrightBlack)));
const CYAN: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Cyan)));

/// Width of the duration column, the gutter every message line is printed after
const DURATION_WIDTH: usize = 10;

/// Initialize the global logger. INFO and above unless `RUST_LOG` says otherwise.
pub fn initialize_logger() {
    let result = Builder::new()
        .write_style(WriteStyle::Auto)
        .format(|buf, record| {
            let ts = buf.timestamp_millis();

            let level_style = buf.default_level_style(record.level());
            let lvl = format!(
                "{}{}{}",
                level_style.render(),
                record.level(),
                level_style.render_reset()
            );

            // Extract raw duration and format to 2 decimal places
            let dur_raw = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| {
                    let s = format!("{}", v);
                    if let Some(idx) = s.find(|c: char| c.is_alphabetic()) {
                        let (num, unit) = (&s[..idx], &s[idx..]);
                        if let Ok(val) = num.parse::<f32>() {
                            return format!("{:.2} {}", val, unit);
                        }
                    }
                    s
                })
                .unwrap_or_default();

            let dur = if dur_raw.is_empty() {
                " ".repeat(DURATION_WIDTH)
            } else {
                format!("{CYAN}{:>width$}{CYAN:#}", dur_raw, width = DURATION_WIDTH)
            };

            writeln!(
                buf,
                "{DIM}{}{DIM:#} {} {DIM}{}{DIM:#}",
                ts,
                lvl,
                record.target()
            )?;

            let message = format!("{}", record.args());
            let subsequent_indent = " ".repeat(DURATION_WIDTH + 1);
            let mut lines = message.lines();
            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            for line in lines {
                writeln!(buf, "{}{}", subsequent_indent, line)?;
            }

            Ok(())
        })
        .filter(None, log::LevelFilter::Info)
        .filter(Some("reqwest"), log::LevelFilter::Warn)
        .parse_default_env()
        .try_init();

    if let Err(err) = result {
        eprintln!("Logger already initialized: {}", err);
    }
}

pub fn initialize(config: &AppConfig) -> Result<()> {
    initialize_logger();
    initialize_folder(config)
}
