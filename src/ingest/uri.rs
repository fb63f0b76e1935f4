use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "avi", "mov", "webm", "h264"];
const DEFAULT_CAMERA: &str = "/dev/video0";

/// A parsed input location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputUri {
    Synthetic {
        name: String,
        /// Frames to produce before the stream ends (0 = endless).
        frames: u64,
        /// Leading captures that report no frame.
        misses: u64,
    },
    Images(PathBuf),
    Video(PathBuf),
    V4l2(String),
    Rtsp(String),
}

impl InputUri {
    /// Parse an input URI. An empty string selects the platform default
    /// (the first V4L2 camera when built with ingest-v4l2, otherwise a test pattern).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::platform_default());
        }

        if !raw.contains("://") {
            if raw.starts_with("/dev/video") {
                return Ok(Self::V4l2(raw.to_string()));
            }
            return Ok(classify_path(Path::new(raw)));
        }

        let url = Url::parse(raw).with_context(|| format!("invalid input URI '{}'", raw))?;
        match url.scheme() {
            "synthetic" => {
                let name = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .unwrap_or("camera")
                    .to_string();
                let mut frames = 0;
                let mut misses = 0;
                for (key, value) in url.query_pairs() {
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| anyhow!("synthetic input: '{}' must be an integer", key))?;
                    match key.as_ref() {
                        "frames" => frames = parsed,
                        "misses" => misses = parsed,
                        other => return Err(anyhow!("synthetic input: unknown option '{}'", other)),
                    }
                }
                Ok(Self::Synthetic {
                    name,
                    frames,
                    misses,
                })
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow!("file URI '{}' is not a local path", raw))?;
                Ok(classify_path(&path))
            }
            "v4l2" => {
                let device = if url.path().is_empty() || url.path() == "/" {
                    DEFAULT_CAMERA.to_string()
                } else {
                    url.path().to_string()
                };
                Ok(Self::V4l2(device))
            }
            "rtsp" | "rtspt" => Ok(Self::Rtsp(raw.to_string())),
            other => Err(anyhow!("unsupported input scheme '{}://'", other)),
        }
    }

    fn platform_default() -> Self {
        if cfg!(feature = "ingest-v4l2") {
            Self::V4l2(DEFAULT_CAMERA.to_string())
        } else {
            Self::Synthetic {
                name: "camera".to_string(),
                frames: 0,
                misses: 0,
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Synthetic { .. } => "synthetic",
            Self::Images(_) => "images",
            Self::Video(_) => "video file",
            Self::V4l2(_) => "v4l2 camera",
            Self::Rtsp(_) => "rtsp",
        }
    }
}

impl fmt::Display for InputUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synthetic { name, .. } => write!(f, "synthetic://{}", name),
            Self::Images(path) | Self::Video(path) => write!(f, "{}", path.display()),
            Self::V4l2(device) => write!(f, "v4l2://{}", device),
            Self::Rtsp(url) => f.write_str(url),
        }
    }
}

fn classify_path(path: &Path) -> InputUri {
    let is_video = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if is_video {
        InputUri::Video(path.to_path_buf())
    } else {
        InputUri::Images(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_synthetic_options() -> Result<()> {
        let uri = InputUri::parse("synthetic://lab?frames=3&misses=2")?;
        assert_eq!(
            uri,
            InputUri::Synthetic {
                name: "lab".to_string(),
                frames: 3,
                misses: 2
            }
        );
        Ok(())
    }

    #[test]
    fn rejects_bad_synthetic_options() {
        assert!(InputUri::parse("synthetic://lab?frames=many").is_err());
        assert!(InputUri::parse("synthetic://lab?fps=3").is_err());
    }

    #[test]
    fn classifies_plain_paths() -> Result<()> {
        assert_eq!(
            InputUri::parse("clips/street.MP4")?,
            InputUri::Video(PathBuf::from("clips/street.MP4"))
        );
        assert_eq!(
            InputUri::parse("images/")?,
            InputUri::Images(PathBuf::from("images/"))
        );
        assert_eq!(
            InputUri::parse("/dev/video1")?,
            InputUri::V4l2("/dev/video1".to_string())
        );
        Ok(())
    }

    #[test]
    fn parses_schemes() -> Result<()> {
        assert_eq!(
            InputUri::parse("v4l2:///dev/video2")?,
            InputUri::V4l2("/dev/video2".to_string())
        );
        assert_eq!(
            InputUri::parse("file:///tmp/frames")?,
            InputUri::Images(PathBuf::from("/tmp/frames"))
        );
        assert_eq!(
            InputUri::parse("rtsp://10.0.0.5:554/stream")?,
            InputUri::Rtsp("rtsp://10.0.0.5:554/stream".to_string())
        );
        assert!(InputUri::parse("csi://0").is_err());
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn empty_uri_defaults_to_test_pattern() -> Result<()> {
        assert_eq!(InputUri::parse("")?.kind(), "synthetic");
        Ok(())
    }
}
