//! Timelapse assembly from stored frames
//!
//! Frames are taken in filename order, which is capture order. Frames whose
//! dimensions differ from the first accepted one are left out, since a video
//! stream cannot change size midway.

use crate::{list_frames, HarvestError, ProgressTracker};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub trait FrameSink {
    fn append_frame(&mut self, frame: &Path) -> Result<(), HarvestError>;
    fn finish(&mut self) -> Result<(), HarvestError>;
}

/// Writes an ffmpeg concat demuxer manifest (`ffmpeg -f concat -i PATH`).
pub struct ConcatManifestSink<W: Write> {
    writer: W,
    frame_duration: String,
    last_frame: Option<PathBuf>,
    header_written: bool,
}

impl ConcatManifestSink<BufWriter<File>> {
    pub fn create(path: &Path, fps: u32) -> Result<Self, HarvestError> {
        let file = File::create(path).map_err(|e| {
            HarvestError::FilesystemError(format!("creating {}: {e}", path.display()))
        })?;
        Ok(Self::new(BufWriter::new(file), fps))
    }
}

impl<W: Write> ConcatManifestSink<W> {
    pub fn new(writer: W, fps: u32) -> Self {
        Self {
            writer,
            frame_duration: format!("1/{}", fps.max(1)),
            last_frame: None,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self) -> Result<(), HarvestError> {
        if !self.header_written {
            writeln!(self.writer, "ffconcat version 1.0")?;
            self.header_written = true;
        }
        Ok(())
    }
}

/// Quote a path for a concat manifest `file` directive.
fn quote_path(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

impl<W: Write> FrameSink for ConcatManifestSink<W> {
    fn append_frame(&mut self, frame: &Path) -> Result<(), HarvestError> {
        self.write_header()?;
        writeln!(self.writer, "file {}", quote_path(frame))?;
        writeln!(self.writer, "duration {}", self.frame_duration)?;
        self.last_frame = Some(frame.to_path_buf());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HarvestError> {
        self.write_header()?;
        // The concat demuxer ignores the duration of the final entry.
        if let Some(last) = self.last_frame.take() {
            writeln!(self.writer, "file {}", quote_path(&last))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelapseSummary {
    pub frames: usize,
    pub skipped: usize,
    pub duration: Duration,
}

/// Stored frames in `dir` with the given extension, in capture order.
pub fn collect_frames(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, HarvestError> {
    let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
    let frames = list_frames(dir)?
        .into_iter()
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(&wanted))
                .unwrap_or(false)
        })
        .map(|name| dir.join(name))
        .collect::<Vec<_>>();

    debug!("Found {} .{} frames in {}", frames.len(), wanted, dir.display());
    Ok(frames)
}

pub fn write_timelapse(
    frames: &[PathBuf],
    sink: &mut dyn FrameSink,
    fps: u32,
) -> Result<TimelapseSummary, HarvestError> {
    if fps == 0 {
        return Err(HarvestError::ConfigurationError(
            "fps must be greater than 0".to_string(),
        ));
    }

    let tracker = ProgressTracker::new(frames.len());
    let mut expected: Option<(u32, u32)> = None;
    let mut accepted = 0usize;

    for frame in frames {
        let dimensions = match image::image_dimensions(frame) {
            Ok(dimensions) => dimensions,
            Err(e) => {
                warn!("Skipping unreadable frame {}: {}", frame.display(), e);
                tracker.record_completion(false);
                continue;
            }
        };

        match expected {
            Some(first) if first != dimensions => {
                warn!(
                    "Skipping {}: {}x{} does not match {}x{}",
                    frame.display(),
                    dimensions.0,
                    dimensions.1,
                    first.0,
                    first.1
                );
                tracker.record_completion(false);
                continue;
            }
            Some(_) => {}
            None => expected = Some(dimensions),
        }

        sink.append_frame(frame)?;
        accepted += 1;
        tracker.record_completion(true);
    }

    sink.finish()?;

    let progress = tracker.get_progress();
    let summary = TimelapseSummary {
        frames: accepted,
        skipped: progress.errors,
        duration: Duration::from_secs_f64(accepted as f64 / fps as f64),
    };
    info!(
        "Timelapse of {} frames ({} skipped), {:.1}s at {} fps",
        summary.frames,
        summary.skipped,
        summary.duration.as_secs_f64(),
        fps
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::fixtures;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn manifest(frames: &[PathBuf], fps: u32) -> (TimelapseSummary, String) {
        let mut sink = ConcatManifestSink::new(Vec::new(), fps);
        let summary = write_timelapse(frames, &mut sink, fps).unwrap();
        (summary, String::from_utf8(sink.into_inner()).unwrap())
    }

    #[test]
    fn test_collect_frames_filters_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20240101000200.png"), fixtures::png(3)).unwrap();
        std::fs::write(dir.path().join("20240101000100.PNG"), fixtures::png(2)).unwrap();
        std::fs::write(dir.path().join("20240101000000.jpg"), b"other").unwrap();
        std::fs::write(dir.path().join(".x.part"), b"staged").unwrap();

        let frames = collect_frames(dir.path(), ".png").unwrap();
        assert_eq!(
            frames,
            vec![
                dir.path().join("20240101000100.PNG"),
                dir.path().join("20240101000200.png"),
            ]
        );
    }

    #[test]
    fn test_manifest_lists_frames_and_repeats_last() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, fixtures::png(1)).unwrap();
        std::fs::write(&b, fixtures::png(2)).unwrap();

        let (summary, text) = manifest(&[a.clone(), b.clone()], 2);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.duration, Duration::from_secs(1));

        let expected = format!(
            "ffconcat version 1.0\nfile '{a}'\nduration 1/2\nfile '{b}'\nduration 1/2\nfile '{b}'\n",
            a = a.display(),
            b = b.display()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_mismatched_and_broken_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("1.png");
        let wide = dir.path().join("2.png");
        let broken = dir.path().join("3.png");
        let last = dir.path().join("4.png");

        std::fs::write(&first, fixtures::png(1)).unwrap();
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(16, 6))
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        std::fs::write(&wide, buffer).unwrap();
        std::fs::write(&broken, b"not an image").unwrap();
        std::fs::write(&last, fixtures::png(4)).unwrap();

        let (summary, text) = manifest(&[first, wide.clone(), broken, last], 30);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.skipped, 2);
        assert!(!text.contains(&wide.display().to_string()));
    }

    #[test]
    fn test_empty_sequence_and_zero_fps() {
        let (summary, text) = manifest(&[], 30);
        assert_eq!(summary.frames, 0);
        assert_eq!(text, "ffconcat version 1.0\n");

        let mut sink = ConcatManifestSink::new(Vec::new(), 0);
        assert!(write_timelapse(&[], &mut sink, 0).is_err());
    }

    #[test]
    fn test_quote_path_escapes_single_quotes() {
        assert_eq!(quote_path(Path::new("/a/it's.png")), r"'/a/it'\''s.png'");
    }
}
