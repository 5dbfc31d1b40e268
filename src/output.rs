use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink, RunResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match (event.percent, event.elapsed) {
            (Some(percent), Some(elapsed)) => info!(
                "{} ({percent:.1}%, {:.1}s)",
                event.message,
                elapsed.as_secs_f64()
            ),
            _ => info!("{}", event.message),
        }
    }
}

pub fn print_summary(result: &RunResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    if !result.datasets.is_empty() {
        println!("Datasets: {}", result.datasets.len());
        for item in &result.datasets {
            let color = if item.success { green } else { red };
            println!(
                "{color}  {} -> {} (copied {}, linked {}, unchanged {}){reset}",
                item.dataset, item.target_directory, item.copied, item.linked, item.skipped
            );
            if let Some(error) = &item.error {
                println!("{red}    {error}{reset}");
            }
        }
    }

    println!("Checksum directories: {}", result.directories.len());
    for item in &result.directories {
        let color = if item.success { green } else { red };
        println!(
            "{color}  {}: {} hashed, {} row(s){}{reset}",
            item.directory,
            item.hashed,
            item.rows_written,
            item.manifest
                .as_deref()
                .map(|path| format!(" -> {path}"))
                .unwrap_or_default()
        );
        if let Some(error) = &item.error {
            println!("{red}    {error}{reset}");
        }
    }

    for message in &result.messages {
        let color = match message.level {
            crate::report::Level::Error => red,
            _ => yellow,
        };
        println!("{color}{:?}: {}{reset}", message.level, message.text);
    }

    if result.success {
        println!("{green}Completed successfully{reset}");
    } else {
        println!(
            "{red}Completed with failures: {} dataset(s), {} director(y/ies){reset}",
            result.failed_datasets, result.failed_directories
        );
    }
}
