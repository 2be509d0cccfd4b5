// src/extract/video.rs
//! Video platform recognition: host matching, id parsing, oEmbed endpoints
//! and the thumbnails/embeds derivable from an id alone.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::content::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoPlatform {
    YouTube,
    Vimeo,
    Dailymotion,
}

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];
const VIMEO_HOSTS: &[&str] = &["vimeo.com"];
const DAILYMOTION_HOSTS: &[&str] = &["dailymotion.com", "dai.ly"];

static YOUTUBE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("youtube id regex"));
static VIMEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5,12}$").expect("vimeo id regex"));
static DAILYMOTION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]{5,10}$").expect("dailymotion id regex"));

fn host_matches(host: &str, domains: &[&str]) -> bool {
    domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

impl VideoPlatform {
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        if host_matches(&host, YOUTUBE_HOSTS) {
            Some(VideoPlatform::YouTube)
        } else if host_matches(&host, VIMEO_HOSTS) {
            Some(VideoPlatform::Vimeo)
        } else if host_matches(&host, DAILYMOTION_HOSTS) {
            Some(VideoPlatform::Dailymotion)
        } else {
            None
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VideoPlatform::YouTube => "YouTube",
            VideoPlatform::Vimeo => "Vimeo",
            VideoPlatform::Dailymotion => "Dailymotion",
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            VideoPlatform::YouTube => Platform::Youtube,
            VideoPlatform::Vimeo => Platform::Vimeo,
            VideoPlatform::Dailymotion => Platform::Dailymotion,
        }
    }

    /// Public oEmbed endpoint for `page_url`.
    pub fn oembed_url(&self, page_url: &str) -> String {
        let (base, extra): (&str, &[(&str, &str)]) = match self {
            VideoPlatform::YouTube => ("https://www.youtube.com/oembed", &[("format", "json")]),
            VideoPlatform::Vimeo => ("https://vimeo.com/api/oembed.json", &[]),
            VideoPlatform::Dailymotion => (
                "https://www.dailymotion.com/services/oembed",
                &[("format", "json")],
            ),
        };
        let mut params = vec![("url", page_url)];
        params.extend_from_slice(extra);
        match Url::parse_with_params(base, &params) {
            Ok(u) => u.to_string(),
            Err(_) => base.to_string(),
        }
    }

    /// Largest thumbnail that can be derived from the id without an API call.
    pub fn derived_thumbnail(&self, id: &str) -> String {
        match self {
            VideoPlatform::YouTube => format!("https://img.youtube.com/vi/{id}/maxresdefault.jpg"),
            VideoPlatform::Vimeo => format!("https://vumbnail.com/{id}.jpg"),
            VideoPlatform::Dailymotion => {
                format!("https://www.dailymotion.com/thumbnail/video/{id}")
            }
        }
    }

    pub fn embed_url(&self, id: &str) -> String {
        match self {
            VideoPlatform::YouTube => format!("https://www.youtube.com/embed/{id}"),
            VideoPlatform::Vimeo => format!("https://player.vimeo.com/video/{id}"),
            VideoPlatform::Dailymotion => format!("https://www.dailymotion.com/embed/video/{id}"),
        }
    }

    pub fn video_id(&self, url: &Url) -> Option<String> {
        match self {
            VideoPlatform::YouTube => youtube_id(url),
            VideoPlatform::Vimeo => vimeo_id(url),
            VideoPlatform::Dailymotion => dailymotion_id(url),
        }
    }
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

fn youtube_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let segs = segments(url);
    let candidate = if host == "youtu.be" || host.ends_with(".youtu.be") {
        segs.first().map(|s| s.to_string())
    } else {
        match segs.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            ["embed" | "shorts" | "live" | "v", id, ..] => Some(id.to_string()),
            _ => None,
        }
    }?;
    YOUTUBE_ID.is_match(&candidate).then_some(candidate)
}

fn vimeo_id(url: &Url) -> Option<String> {
    // vimeo.com/123, vimeo.com/channels/staffpicks/123, player.vimeo.com/video/123
    segments(url)
        .into_iter()
        .rev()
        .find(|s| VIMEO_ID.is_match(s))
        .map(str::to_string)
}

fn dailymotion_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let segs = segments(url);
    let raw = if host == "dai.ly" {
        segs.first().copied()
    } else {
        match segs.as_slice() {
            ["video", id, ..] | ["embed", "video", id, ..] => Some(*id),
            _ => None,
        }
    }?;
    // dailymotion.com/video/x8abc12_some-slug
    let id = raw.split('_').next().unwrap_or(raw);
    DAILYMOTION_ID.is_match(id).then(|| id.to_string())
}

/// The subset of the oEmbed response the extractor reads.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OEmbed {
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub thumbnail_url: Option<String>,
    pub provider_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn recognizes_hosts() {
        assert_eq!(
            VideoPlatform::from_url(&u("https://m.youtube.com/watch?v=dQw4w9WgXcQ")),
            Some(VideoPlatform::YouTube)
        );
        assert_eq!(
            VideoPlatform::from_url(&u("https://player.vimeo.com/video/76979871")),
            Some(VideoPlatform::Vimeo)
        );
        assert_eq!(
            VideoPlatform::from_url(&u("https://dai.ly/x8abc12")),
            Some(VideoPlatform::Dailymotion)
        );
        assert_eq!(VideoPlatform::from_url(&u("https://notyoutube.com/watch")), None);
        assert_eq!(VideoPlatform::from_url(&u("https://example.com/")), None);
    }

    #[test]
    fn youtube_id_variants() {
        let yt = VideoPlatform::YouTube;
        for s in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ?rel=0",
        ] {
            assert_eq!(yt.video_id(&u(s)).as_deref(), Some("dQw4w9WgXcQ"), "{s}");
        }
        assert_eq!(yt.video_id(&u("https://www.youtube.com/@channel")), None);
        assert_eq!(yt.video_id(&u("https://www.youtube.com/watch?v=short")), None);
    }

    #[test]
    fn vimeo_and_dailymotion_ids() {
        assert_eq!(
            VideoPlatform::Vimeo
                .video_id(&u("https://vimeo.com/channels/staffpicks/76979871"))
                .as_deref(),
            Some("76979871")
        );
        assert_eq!(
            VideoPlatform::Dailymotion
                .video_id(&u("https://www.dailymotion.com/video/x8abc12_some-slug"))
                .as_deref(),
            Some("x8abc12")
        );
    }

    #[test]
    fn oembed_url_encodes_target() {
        let s = VideoPlatform::YouTube.oembed_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(s.starts_with("https://www.youtube.com/oembed?url=https%3A%2F%2F"));
        assert!(s.ends_with("&format=json"));
    }
}
