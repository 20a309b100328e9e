// Supervisor entry point (C10). Scans intake, keeps up to `MAX_CONTAINERS`
// worker processes in flight, and drains gracefully on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mediacatalog::config::Config;
use mediacatalog::supervisor::{install_shutdown_handler, Supervisor};

fn worker_binary_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("worker")))
        .unwrap_or_else(|| PathBuf::from("worker"))
}

fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("supervisor: configuration error: {e}");
            std::process::exit(2);
        }
    };
    mediacatalog::logging::init(&config);

    if let Err(e) = mediacatalog::catalog::open_pool(&config.catalog_db_path) {
        log::error!("supervisor: failed to initialize catalog: {e}");
        std::process::exit(1);
    }

    let shutdown = install_shutdown_handler();
    let mut sup = Supervisor::new(worker_binary_path(), config, shutdown.clone());

    log::info!("supervisor: starting intake loop");
    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = sup.run_once() {
            log::error!("supervisor: cycle failed: {e}");
        }
        std::thread::sleep(Duration::from_secs(mediacatalog::constants::SUPERVISOR_OUTER_RESCAN_SECONDS));
    }

    log::info!("supervisor: shutdown complete");
}
