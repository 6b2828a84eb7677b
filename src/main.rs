use std::path::{Path, PathBuf};

use anyhow::Result;

use patchbay::model::config::ManagerConfig;
use patchbay::plugin::discover::scan_spec_dir;
use patchbay::{FileHints, Host, LocalPacks, LogSink, LoggingBridge};

fn main() -> Result<()> {
    // Initialize logging to file (never stdout)
    let data_dir = directories::ProjectDirs::from("", "", "patchbay")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    std::fs::create_dir_all(&data_dir)?;

    let file_appender = tracing_appender::rolling::daily(&data_dir, "patchbay.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter("patchbay=info")
        .init();

    tracing::info!("patchbay starting");

    let config = ManagerConfig::load()?;

    let result = run(config, &data_dir);
    if let Err(e) = &result {
        eprintln!("patchbay error: {e:?}");
    }
    result
}

/// One headless startup pass: scan specs, register, load, report.
fn run(config: ManagerConfig, data_dir: &Path) -> Result<()> {
    let spec_dir = config.spec_dir();

    let mut host = Host::new(
        &config,
        Box::new(LoggingBridge),
        Box::new(LocalPacks),
        Box::new(FileHints::open(data_dir.join("hints.toml"))),
        Box::new(LogSink),
    );

    if host.check_spec_changes(&spec_dir) {
        println!("note: plugin specs changed since the last session");
    }

    for err in host.register(scan_spec_dir(&spec_dir)) {
        eprintln!("spec error: {err}");
    }

    let report = host.startup();
    for err in &report.diagnostics {
        eprintln!("dependency error: {err}");
    }
    for err in &report.errors {
        eprintln!("load error: {err}");
    }

    let stats = host.stats();
    println!(
        "patchbay: {} plugins / {} loaded, {} lazy, {} disabled, {} errors",
        stats.total, stats.loaded, stats.lazy, stats.disabled, stats.errors
    );
    for name in &report.deferred {
        tracing::debug!("deferred: {name}");
    }

    tracing::info!("startup pass complete in {:?}", stats.total_load_time);
    Ok(())
}
