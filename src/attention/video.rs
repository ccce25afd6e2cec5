use std::path::Path;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use super::PlaybackKind;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "ogv", "ogg", "mov", "mkv"];
const YOUTUBE_ID_LEN: usize = 11;

/// What the user asked to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VideoSource {
    #[serde(rename_all = "camelCase")]
    RemoteEmbedded { video_id: String, url: String },
    #[serde(rename_all = "camelCase")]
    LocalFile { name: String },
}

impl VideoSource {
    pub fn playback_kind(&self) -> PlaybackKind {
        match self {
            VideoSource::RemoteEmbedded { .. } => PlaybackKind::RemoteEmbedded,
            VideoSource::LocalFile { .. } => PlaybackKind::LocalFile,
        }
    }

    /// Accepts YouTube watch, shorts, embed and youtu.be links.
    pub fn parse_url(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let url = Url::parse(trimmed).map_err(|_| anyhow!("Not a valid video link: {trimmed}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Unsupported link scheme: {}", url.scheme());
        }

        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("Not a valid video link: {trimmed}"))?
            .trim_start_matches("www.")
            .trim_start_matches("m.");

        let candidate: Option<String> = match host {
            "youtu.be" => url
                .path_segments()
                .and_then(|mut segments| segments.next())
                .map(str::to_string),
            "youtube.com" | "youtube-nocookie.com" => {
                let mut segments = url.path_segments().into_iter().flatten();
                match segments.next() {
                    Some("embed" | "shorts" | "live" | "v") => segments.next().map(str::to_string),
                    _ => url
                        .query_pairs()
                        .find(|(key, _)| key == "v")
                        .map(|(_, value)| value.into_owned()),
                }
            }
            _ => bail!("Only YouTube links are supported, got {host}"),
        };

        let video_id = candidate
            .filter(|id| is_youtube_id(id))
            .ok_or_else(|| anyhow!("Could not find a video id in {trimmed}"))?;

        Ok(VideoSource::RemoteEmbedded {
            video_id,
            url: trimmed.to_string(),
        })
    }

    /// Accepts a file whose MIME type is `video/*`, or whose extension is a
    /// known video container when the MIME type is unknown.
    pub fn from_file(name: &str, mime_type: Option<&str>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            bail!("No file selected");
        }

        let accepted = match mime_type.map(str::trim).filter(|mime| !mime.is_empty()) {
            Some(mime) => mime.to_ascii_lowercase().starts_with("video/"),
            None => Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false),
        };

        if !accepted {
            bail!("{name} is not a video file");
        }
        Ok(VideoSource::LocalFile {
            name: name.to_string(),
        })
    }
}

fn is_youtube_id(id: &str) -> bool {
    id.len() == YOUTUBE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
