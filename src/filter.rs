// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Decides whether a scraped href points at playable video.
//!
//! Hrefs are not normalized: a relative or scheme-less link that matches is
//! passed through verbatim.

const MEDIA_EXTENSIONS: &[&str] = &[".m3u8", ".mp4", ".mkv", ".webm", ".avi", ".mpd", ".ts"];

/// Embed hosts whose pages wrap a playable video.
pub const EMBED_HOSTS: &[&str] = &[
    "mixdrop",
    "supervideo",
    "dropload",
    "maxstream",
    "streamtape",
    "doodstream",
    "dood.",
    "vixcloud",
    "uqload",
    "voe.sx",
];

pub fn is_stream_candidate(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return false;
    }

    // Ignore query and fragment when checking the extension
    let path = lower
        .split(['?', '#'])
        .next()
        .unwrap_or(lower.as_str());

    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || EMBED_HOSTS.iter().any(|host| lower.contains(host))
}

/// Returns the embed host an href belongs to, if any.
pub fn embed_host(href: &str) -> Option<&'static str> {
    let lower = href.to_ascii_lowercase();
    EMBED_HOSTS.iter().copied().find(|host| lower.contains(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_extensions_match_regardless_of_case() {
        assert!(is_stream_candidate("https://x.test/stream.mp4"));
        assert!(is_stream_candidate("HTTPS://X.TEST/Movie/Index.M3U8"));
        assert!(is_stream_candidate("https://CDN.test/a/b/clip.MP4"));
        assert!(is_stream_candidate("https://cdn.test/live.m3u8?token=abc"));
    }

    #[test]
    fn embed_hosts_match_without_extension() {
        assert!(is_stream_candidate("https://mixdrop.co/e/abc123"));
        assert!(is_stream_candidate("https://MIXDROP.ag/f/xyz"));
        assert!(is_stream_candidate("//supervideo.tv/embed-9"));
    }

    #[test]
    fn ordinary_pages_are_rejected() {
        assert!(!is_stream_candidate("https://site.test/film/some-movie/"));
        assert!(!is_stream_candidate("https://site.test/about.html"));
        assert!(!is_stream_candidate("mp4"));
        assert!(!is_stream_candidate(""));
    }

    #[test]
    fn relative_links_pass_through() {
        assert!(is_stream_candidate("/media/episode1.mp4"));
        assert!(is_stream_candidate("video.m3u8"));
    }

    #[test]
    fn embed_host_lookup() {
        assert_eq!(embed_host("https://Mixdrop.co/e/1"), Some("mixdrop"));
        assert_eq!(embed_host("https://x.test/a.mp4"), None);
    }
}
