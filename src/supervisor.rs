// Supervisor (C10): scans the intake directory, classifies entries, and
// keeps up to `max_containers` worker processes in flight. The isolation
// substrate is an OS child process (SPEC_FULL.md S4.9): "start a worker"
// spawns the worker binary with `NEW_FILE` set in its environment; "reap"
// polls `try_wait()`. The retry/timeout wrapper around the reap is kept
// regardless, so the contract holds if a future deployment swaps in a
// networked or containerized substrate.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::MediaType;

pub struct PendingFile {
    pub path: PathBuf,
    pub media_type: MediaType,
}

struct LiveWorker {
    child: Child,
    path: PathBuf,
    started_at: Instant,
}

/// Classifies every entry directly reachable from `intake_dir` by extension,
/// per the configured allowlists. Entries matching neither list are skipped.
pub fn scan_intake(config: &Config) -> Vec<PendingFile> {
    let mut pending = Vec::new();
    for entry in WalkDir::new(&config.files_to_process_directory).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_lowercase(),
            None => continue,
        };
        if config.image_extensions.contains(&ext) {
            pending.push(PendingFile { path: path.to_path_buf(), media_type: MediaType::Image });
        } else if config.movie_extensions.contains(&ext) {
            pending.push(PendingFile { path: path.to_path_buf(), media_type: MediaType::Movie });
        }
    }
    pending.sort_by(|a, b| a.path.cmp(&b.path));
    pending
}

fn media_type_token(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Image => "image",
        MediaType::Movie => "movie",
    }
}

fn spawn_worker(worker_binary: &Path, config: &Config, file: &PendingFile) -> std::io::Result<Child> {
    std::process::Command::new(worker_binary)
        .env("NEW_FILE", format!("{},{}", file.path.display(), media_type_token(file.media_type)))
        .env("CATALOG_DB_PATH", &config.catalog_db_path)
        .env("IMAGE_DIRECTORY", &config.image_directory)
        .env("MOVIES_DIRECTORY", &config.movies_directory)
        .env("DUPLICATE_DIRECTORY", &config.duplicate_directory)
        .env("ERROR_DIRECTORY", &config.error_directory)
        .env("GEOCODER_USER_AGENT", &config.geocoder_user_agent)
        .env("GEOCODER_BASE_URL", &config.geocoder_base_url)
        .spawn()
}

/// Polls `try_wait()` up to `REAP_MAX_RETRIES` times, sleeping briefly
/// between attempts, bailing out after `REAP_TIMEOUT_SECONDS` total.
fn reap_with_retry(worker: &mut LiveWorker) -> Option<std::io::Result<std::process::ExitStatus>> {
    let deadline = Instant::now() + Duration::from_secs(crate::constants::REAP_TIMEOUT_SECONDS);
    for attempt in 0..crate::constants::REAP_MAX_RETRIES {
        match worker.child.try_wait() {
            Ok(Some(status)) => return Some(Ok(status)),
            Ok(None) => {
                if Instant::now() >= deadline {
                    return None;
                }
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => {
                if attempt + 1 == crate::constants::REAP_MAX_RETRIES {
                    return Some(Err(e));
                }
            }
        }
    }
    None
}

pub struct Supervisor {
    worker_binary: PathBuf,
    config: Config,
    queue: VecDeque<PendingFile>,
    live: Vec<LiveWorker>,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(worker_binary: PathBuf, config: Config, shutdown: Arc<AtomicBool>) -> Self {
        Supervisor { worker_binary, config, queue: VecDeque::new(), live: Vec::new(), shutdown }
    }

    /// Runs one full outer cycle: rescan, then drain the queue while
    /// starting/reaping workers, until the queue and live set are both
    /// empty or the shutdown flag is set.
    pub fn run_once(&mut self) -> Result<()> {
        for file in scan_intake(&self.config) {
            self.queue.push_back(file);
        }

        while (!self.queue.is_empty() || !self.live.is_empty()) && !self.shutdown.load(Ordering::SeqCst) {
            self.reap_finished();

            while self.live.len() < self.config.max_containers && !self.queue.is_empty() {
                let file = self.queue.pop_front().unwrap();
                match spawn_worker(&self.worker_binary, &self.config, &file) {
                    Ok(child) => self.live.push(LiveWorker { child, path: file.path, started_at: Instant::now() }),
                    Err(e) => log::error!("failed to spawn worker for {}: {e}", file.path.display()),
                }
            }

            std::thread::sleep(Duration::from_secs(crate::constants::SUPERVISOR_INNER_POLL_SECONDS));
        }

        if self.shutdown.load(Ordering::SeqCst) {
            self.drain_on_shutdown();
        }

        Ok(())
    }

    fn reap_finished(&mut self) {
        let mut still_live = Vec::new();
        for mut worker in self.live.drain(..) {
            match reap_with_retry(&mut worker) {
                Some(Ok(status)) => {
                    if !status.success() {
                        self.move_to_errors(&worker.path);
                    }
                }
                Some(Err(e)) => {
                    log::error!("reap failed for {}: {e}", worker.path.display());
                    self.move_to_errors(&worker.path);
                }
                None => still_live.push(worker),
            }
        }
        self.live = still_live;
    }

    fn drain_on_shutdown(&mut self) {
        while !self.live.is_empty() {
            self.reap_finished();
            if !self.live.is_empty() {
                std::thread::sleep(Duration::from_secs(crate::constants::SUPERVISOR_INNER_POLL_SECONDS));
            }
        }
    }

    fn move_to_errors(&self, path: &Path) {
        if !path.exists() {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(&self.config.error_directory) {
            log::error!("cannot create error directory: {e}");
            return;
        }
        if let Some(name) = path.file_name() {
            if let Err(e) = std::fs::rename(path, self.config.error_directory.join(name)) {
                log::error!("failed to move {} to errors: {e}", path.display());
            }
        }
    }
}

/// Registers SIGINT/SIGTERM handlers that set the returned flag. After the
/// flag is set, `Supervisor::run_once` stops starting new workers and waits
/// for the live set to drain.
pub fn install_shutdown_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        log::error!("failed to install shutdown handler: {e}");
    }
    shutdown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> Config {
        Config {
            files_to_process_directory: dir.join("intake"),
            image_directory: dir.join("images"),
            movies_directory: dir.join("movies"),
            duplicate_directory: dir.join("dupes"),
            error_directory: dir.join("errors"),
            log_directory: None,
            image_extensions: vec!["jpg".into()],
            movie_extensions: vec!["mp4".into()],
            mse_threshold: 0.0,
            max_containers: 13,
            catalog_db_path: dir.join("catalog.db"),
            geocoder_user_agent: "test".into(),
            geocoder_base_url: "http://localhost".into(),
            file_debug_level: "info".into(),
            console_debug_level: "info".into(),
        }
    }

    #[test]
    fn scan_intake_classifies_by_extension_and_skips_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(&config.files_to_process_directory).unwrap();
        std::fs::write(config.files_to_process_directory.join("a.jpg"), b"x").unwrap();
        std::fs::write(config.files_to_process_directory.join("b.mp4"), b"x").unwrap();
        std::fs::write(config.files_to_process_directory.join("c.txt"), b"x").unwrap();

        let pending = scan_intake(&config);
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|p| p.media_type == MediaType::Image));
        assert!(pending.iter().any(|p| p.media_type == MediaType::Movie));
    }

    #[test]
    fn scan_intake_on_missing_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        assert!(scan_intake(&config).is_empty());
    }
}
