// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::config::{ProxyMode, ProxySettings};
use crate::filter;
use tracing::warn;

/// A MediaFlow-style relay: fetches a URL on our behalf and streams it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    base_url: String,
    password: Option<String>,
}

impl Relay {
    pub fn new(base_url: &str, password: Option<&str>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    pub fn from_settings(settings: &ProxySettings) -> Option<Self> {
        settings
            .mediaflow_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| Self::new(u, settings.mediaflow_password.as_deref()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Builds the relay URL for `original`. With a host hint the extractor
    /// endpoint is used so the relay resolves the embed page itself.
    pub fn wrap(&self, original: &str, host_hint: Option<&str>) -> String {
        let encoded = urlencoding::encode(original);
        let mut url = match host_hint {
            Some(host) => format!(
                "{}/extractor/video?host={}&d={}",
                self.base_url,
                urlencoding::encode(host),
                encoded
            ),
            None => format!("{}/proxy?url={}", self.base_url, encoded),
        };

        if let Some(password) = &self.password {
            url.push_str("&api_password=");
            url.push_str(&urlencoding::encode(password));
        }

        url
    }
}

/// Extractor name the relay expects for a known embed host.
pub fn host_hint(url: &str) -> Option<&'static str> {
    let host = filter::embed_host(url)?;
    Some(match host {
        "mixdrop" => "Mixdrop",
        "supervideo" => "Supervideo",
        "dropload" => "Dropload",
        "maxstream" => "Maxstream",
        "streamtape" => "Streamtape",
        "doodstream" | "dood." => "Doodstream",
        "vixcloud" => "VixCloud",
        "uqload" => "Uqload",
        "voe.sx" => "Voe",
        _ => return None,
    })
}

/// Produces the playable URL for a scraped link.
///
/// `generic_proxy` only affects how pages are fetched, so the link is left
/// as-is. Rewrapping an already rewritten URL nests it again.
pub fn rewrite(
    original_url: &str,
    mode: ProxyMode,
    relay: Option<&Relay>,
    host_hint: Option<&str>,
) -> String {
    match mode {
        ProxyMode::None | ProxyMode::GenericProxy => original_url.to_string(),
        ProxyMode::Mediaflow => match relay {
            Some(relay) => relay.wrap(original_url, host_hint),
            None => {
                warn!(
                    "Mediaflow mode selected but no relay configured, leaving {} unmodified",
                    original_url
                );
                original_url.to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> Relay {
        Relay::new("https://relay.test/", Some("secret"))
    }

    #[test]
    fn mediaflow_encodes_original_and_password() {
        let url = rewrite(
            "https://x.test/stream.mp4",
            ProxyMode::Mediaflow,
            Some(&relay()),
            None,
        );
        assert_eq!(
            url,
            "https://relay.test/proxy?url=https%3A%2F%2Fx.test%2Fstream.mp4&api_password=secret"
        );
    }

    #[test]
    fn none_and_generic_leave_url_unmodified() {
        let original = "https://x.test/stream.mp4";
        assert_eq!(rewrite(original, ProxyMode::None, Some(&relay()), None), original);
        assert_eq!(
            rewrite(original, ProxyMode::GenericProxy, Some(&relay()), None),
            original
        );
    }

    #[test]
    fn single_rewrite_adds_relay_once_and_rewraps_nest() {
        let once = rewrite(
            "https://x.test/a.m3u8",
            ProxyMode::Mediaflow,
            Some(&relay()),
            None,
        );
        assert_eq!(once.matches("https://relay.test").count(), 1);

        let twice = rewrite(&once, ProxyMode::Mediaflow, Some(&relay()), None);
        assert_eq!(twice.matches("https://relay.test").count(), 1);
        assert!(twice.starts_with("https://relay.test/proxy?url=https%3A%2F%2Frelay.test%2Fproxy"));
        assert_eq!(twice.matches("api_password=secret").count(), 1);
    }

    #[test]
    fn host_hint_uses_extractor_endpoint() {
        let original = "https://mixdrop.co/e/abc";
        let hint = host_hint(original);
        assert_eq!(hint, Some("Mixdrop"));

        let url = rewrite(original, ProxyMode::Mediaflow, Some(&relay()), hint);
        assert_eq!(
            url,
            "https://relay.test/extractor/video?host=Mixdrop&d=https%3A%2F%2Fmixdrop.co%2Fe%2Fabc&api_password=secret"
        );
    }

    #[test]
    fn missing_password_is_omitted() {
        let relay = Relay::new("https://relay.test", Some(""));
        assert_eq!(
            relay.wrap("https://x.test/v.mp4", None),
            "https://relay.test/proxy?url=https%3A%2F%2Fx.test%2Fv.mp4"
        );
    }

    #[test]
    fn mediaflow_without_relay_passes_through() {
        assert_eq!(
            rewrite("https://x.test/v.mp4", ProxyMode::Mediaflow, None, None),
            "https://x.test/v.mp4"
        );
    }
}
