//! Logging setup
//!
//! JSON logs go to stdout, and optionally to a log file that rotates by size
//! (`gateway.log`, `gateway.log.1`, ... `gateway.log.<N>`).

use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// When and how far log files are rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size at which the active file is rotated
    pub max_bytes: u64,
    /// Rotated files kept besides the active one
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

#[derive(Debug)]
struct ActiveFile {
    path: PathBuf,
    file: File,
    written: u64,
    policy: RotationPolicy,
}

impl ActiveFile {
    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn numbered(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    /// Shift `log.N-1 -> log.N ... log -> log.1`, dropping the oldest
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.policy.max_files == 0 {
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.numbered(self.policy.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.policy.max_files).rev() {
            let from = self.numbered(index);
            if from.exists() {
                fs::rename(&from, self.numbered(index + 1))?;
            }
        }
        fs::rename(&self.path, self.numbered(1))?;

        self.file = Self::open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// Size-rotating log file, shareable across tracing layers
#[derive(Debug, Clone)]
pub struct RotatingFileWriter {
    active: Arc<Mutex<ActiveFile>>,
}

impl RotatingFileWriter {
    pub fn new(path: impl AsRef<Path>, policy: RotationPolicy) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = ActiveFile::open(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            active: Arc::new(Mutex::new(ActiveFile {
                path,
                file,
                written,
                policy,
            })),
        })
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, ActiveFile>> {
        self.active
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut active = self.lock()?;

        // An oversized record still lands whole in a fresh file
        if active.written > 0 && active.written + buf.len() as u64 > active.policy.max_bytes {
            active.rotate()?;
        }

        let written = active.file.write(buf)?;
        active.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.file.flush()
    }
}

impl<'a> fmt::MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer().json().with_filter(filter());
    let subscriber = tracing_subscriber::registry().with(console_layer);

    match log_file {
        Some(path) => {
            let writer = RotatingFileWriter::new(path, RotationPolicy::default())
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let file_layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());

            subscriber
                .with(file_layer)
                .try_init()
                .context("Failed to install tracing subscriber")?;
            tracing::info!(path = %path.display(), "Also logging to rotating file");
        }
        None => subscriber
            .try_init()
            .context("Failed to install tracing subscriber")?,
    }

    Ok(())
}
