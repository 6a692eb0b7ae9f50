//! Where finished conversions go: inline data URIs or one-shot downloads.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::Serialize;
use tempfile::NamedTempFile;
use uuid::Uuid;

use image_converter_core::ImageFormat;

/// Stored outputs older than this are removed by the sweep.
pub const MAX_STORED_AGE: Duration = Duration::from_secs(30 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeliveryMode {
    /// Base64 data URI in the JSON response
    Inline,
    /// Stored file fetched once through /download
    Download,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    Inline { data_uri: String },
    Download { url: String, file_name: String },
}

#[derive(Debug, Clone)]
pub struct OutputSink {
    mode: DeliveryMode,
    dir: PathBuf,
}

impl OutputSink {
    pub fn new(mode: DeliveryMode, dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            dir: dir.into(),
        }
    }

    /// Hand `bytes` to the client side. Blocking; call from a worker thread.
    ///
    /// `suggested_name` is what the browser should save the download as.
    pub fn deliver(&self, bytes: &[u8], format: ImageFormat, suggested_name: &str) -> io::Result<Delivery> {
        match self.mode {
            DeliveryMode::Inline => Ok(Delivery::Inline {
                data_uri: data_uri(bytes, format),
            }),
            DeliveryMode::Download => {
                let stored = self.store(bytes, format)?;
                Ok(Delivery::Download {
                    url: format!("/download/{stored}"),
                    file_name: suggested_name.to_string(),
                })
            }
        }
    }

    /// Persist under a fresh `<uuid>.<ext>` name and return that name.
    pub fn store(&self, bytes: &[u8], format: ImageFormat) -> io::Result<String> {
        std::fs::create_dir_all(&self.dir)?;
        let name = format!("{}.{}", Uuid::new_v4(), format.extension());

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(self.dir.join(&name)).map_err(|e| e.error)?;

        log::debug!("Stored {} bytes as {}", bytes.len(), name);
        Ok(name)
    }

    /// Read a stored output and delete it. `None` for unknown or already
    /// taken names.
    pub fn take(&self, name: &str) -> io::Result<Option<(Vec<u8>, ImageFormat)>> {
        let Some(format) = parse_stored_name(name) else {
            return Ok(None);
        };

        // Renaming first makes a concurrent second read miss
        let path = self.dir.join(name);
        let claimed = self.dir.join(format!("{name}.taken"));
        match std::fs::rename(&path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }

        let bytes = std::fs::read(&claimed);
        if let Err(e) = std::fs::remove_file(&claimed) {
            log::warn!("Failed to delete downloaded file {name}: {e}");
        }
        Ok(Some((bytes?, format)))
    }

    /// Remove every regular file in the directory older than `max_age`.
    pub fn sweep(&self, max_age: Duration) -> io::Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age > max_age {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Sweep could not remove {}: {e}", entry.path().display()),
                }
            }
        }
        Ok(removed)
    }
}

pub fn data_uri(bytes: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", format.mime(), B64.encode(bytes))
}

/// Accept only names this sink could have produced.
fn parse_stored_name(name: &str) -> Option<ImageFormat> {
    let (stem, ext) = name.rsplit_once('.')?;
    Uuid::parse_str(stem).ok()?;
    let format = ImageFormat::from_extension(ext)?;
    (format.extension() == ext).then_some(format)
}
