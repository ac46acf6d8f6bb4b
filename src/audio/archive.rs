use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Summary of a finalized archive file.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Path of the finished WAV file
    pub path: PathBuf,
    /// Total samples written
    pub sample_count: usize,
    /// Audio duration in seconds
    pub duration_secs: f64,
}

/// Streams decoded PCM into a WAV file, one call per archive.
///
/// Samples are appended in arrival order by a single logical owner (the
/// session's inbound flow) and the container header is finalized on
/// `close`, so a file that reaches `close` is always playable even when
/// no audio arrived at all.
pub struct AudioArchiver {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_count: usize,
    sample_rate: u32,
}

impl AudioArchiver {
    /// Open a new archive file, creating missing parent directories.
    pub fn open(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create recordings directory: {:?}", parent))?;
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create archive file: {:?}", path))?;

        info!("Archive opened: {:?} ({}Hz mono)", path, sample_rate);

        Ok(Self {
            writer: Some(writer),
            path,
            sample_count: 0,
            sample_rate,
        })
    }

    /// Append decoded samples in arrival order.
    ///
    /// Panics if called after `close`: the archiver has exactly one owner
    /// and writing past finalization is a programming error, not a
    /// runtime condition.
    pub fn append(&mut self, samples: &[i16]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .unwrap_or_else(|| panic!("append called on a closed archive: {:?}", self.path));

        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to archive")?;
        }

        self.sample_count += samples.len();
        Ok(())
    }

    /// Path the archive is being written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples written so far.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Flush and finalize the container header.
    pub fn close(mut self) -> Result<ArchiveSummary> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize archive WAV")?;
        }

        let summary = ArchiveSummary {
            path: self.path.clone(),
            sample_count: self.sample_count,
            duration_secs: self.sample_count as f64 / self.sample_rate as f64,
        };

        info!(
            "Archive closed: {:?} ({:.2}s, {} samples)",
            summary.path, summary.duration_secs, summary.sample_count
        );

        Ok(summary)
    }
}

/// Destination for a call's decoded audio. Sessions write through this
/// trait; `AudioArchiver` is the WAV-file implementation.
pub trait ArchiveSink: Send {
    /// Append decoded samples in arrival order.
    fn append(&mut self, samples: &[i16]) -> Result<()>;

    /// Flush and finalize, yielding the archive summary.
    fn close(self: Box<Self>) -> Result<ArchiveSummary>;

    /// Path of the underlying archive file.
    fn path(&self) -> &Path;
}

impl ArchiveSink for AudioArchiver {
    fn append(&mut self, samples: &[i16]) -> Result<()> {
        AudioArchiver::append(self, samples)
    }

    fn close(self: Box<Self>) -> Result<ArchiveSummary> {
        AudioArchiver::close(*self)
    }

    fn path(&self) -> &Path {
        AudioArchiver::path(self)
    }
}

impl Drop for AudioArchiver {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize archive on drop: {}", e);
            }
        }
    }
}
