// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Payload shapes of the Stremio addon protocol and their assembly.

use crate::config::{ContentType, SiteConfig};
use crate::filter;
use crate::metadata::{FALLBACK_NAME, TitleInfo};
use crate::proxy::{self, Relay};
use crate::sites::ScrapeResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const ADDON_ID: &str = "org.streamscout.addon";
/// Prefix of catalog ids minted from scraped links.
pub const META_ID_PREFIX: &str = "ss";
const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraField {
    pub name: String,
    #[serde(rename = "isRequired", default)]
    pub is_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDecl {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub id: String,
    pub name: String,
    pub extra: Vec<ExtraField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub resources: Vec<String>,
    pub types: Vec<ContentType>,
    pub catalogs: Vec<CatalogDecl>,
    #[serde(rename = "idPrefixes")]
    pub id_prefixes: Vec<String>,
}

/// Catalog id declared for a content type.
pub fn catalog_id(content_type: ContentType) -> String {
    format!("streamscout-{}", content_type)
}

fn catalog_name(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Movie => "StreamScout Movies",
        ContentType::Series => "StreamScout Series",
        ContentType::Anime => "StreamScout Anime",
        ContentType::Channel => "StreamScout Live TV",
    }
}

/// The manifest, with catalogs limited to `served` content types.
pub fn build_manifest(served: &BTreeSet<ContentType>) -> Manifest {
    let catalogs = ContentType::ALL
        .iter()
        .filter(|t| served.contains(*t))
        .map(|&t| CatalogDecl {
            content_type: t,
            id: catalog_id(t),
            name: catalog_name(t).to_string(),
            extra: vec![ExtraField {
                name: "search".to_string(),
                is_required: false,
            }],
        })
        .collect();

    Manifest {
        id: ADDON_ID.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: "StreamScout".to_string(),
        description: "Movies, series, anime and live TV scraped from configurable sites"
            .to_string(),
        resources: vec![
            "catalog".to_string(),
            "meta".to_string(),
            "stream".to_string(),
        ],
        types: ContentType::ALL.to_vec(),
        catalogs,
        id_prefixes: vec![
            "tt".to_string(),
            "tmdb:".to_string(),
            format!("{}:", META_ID_PREFIX),
        ],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMeta {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CatalogMeta {
    pub fn from_title(id: &str, content_type: ContentType, info: TitleInfo) -> Self {
        Self {
            id: id.to_string(),
            content_type,
            name: info.name,
            poster: info.poster,
            description: info.description,
            genres: info.genres,
        }
    }
}

/// Catalog id for a scraped link: `ss:{SITE}:{percent-encoded url}`.
pub fn meta_id(site: &str, raw_url: &str) -> String {
    format!(
        "{}:{}:{}",
        META_ID_PREFIX,
        site.to_ascii_uppercase(),
        urlencoding::encode(raw_url)
    )
}

/// Splits an id minted by [`meta_id`] back into site code and URL.
pub fn parse_meta_id(id: &str) -> Option<(String, String)> {
    let rest = id.strip_prefix(META_ID_PREFIX)?.strip_prefix(':')?;
    let (site, encoded) = rest.split_once(':')?;
    if site.is_empty() || encoded.is_empty() {
        return None;
    }
    let url = urlencoding::decode(encoded).ok()?.into_owned();
    Some((site.to_string(), url))
}

/// Name for a link when nothing better is known: its last path segment.
pub fn name_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|s| s.split(['?', '#']).next().unwrap_or(s))
        .filter(|s| !s.is_empty())
        .map(|s| s.replace(['-', '_'], " "))
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// One meta per scraped link, each carrying the title found beside it.
pub fn build_catalog(
    results: &[ScrapeResult],
    content_type: ContentType,
    limit: usize,
) -> Vec<CatalogMeta> {
    results
        .iter()
        .take(limit)
        .map(|r| CatalogMeta {
            id: meta_id(&r.source_site, &r.raw_url),
            content_type: r.content_type_guess.unwrap_or(content_type),
            name: r.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
            poster: None,
            description: Some(format!("From {}", r.source_site)),
            genres: Vec::new(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyHeaders {
    pub request: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorHints {
    #[serde(rename = "notWebReady")]
    pub not_web_ready: bool,
    #[serde(rename = "proxyHeaders", skip_serializing_if = "Option::is_none")]
    pub proxy_headers: Option<ProxyHeaders>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub name: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "behaviorHints", skip_serializing_if = "Option::is_none")]
    pub behavior_hints: Option<BehaviorHints>,
}

/// Embed hosts refuse playback without the embedding page as Referer.
fn behavior_hints(raw_url: &str, site: &SiteConfig) -> Option<BehaviorHints> {
    filter::embed_host(raw_url)?;
    Some(BehaviorHints {
        not_web_ready: true,
        proxy_headers: Some(ProxyHeaders {
            request: HashMap::from([("Referer".to_string(), site.base_url.clone())]),
        }),
    })
}

/// Turns a scraped link into a stream, rewriting it per the site's proxy mode.
pub fn build_stream(result: &ScrapeResult, site: &SiteConfig, relay: Option<&Relay>) -> StreamEntry {
    let url = proxy::rewrite(
        &result.raw_url,
        site.proxy_mode,
        relay,
        proxy::host_hint(&result.raw_url),
    );

    StreamEntry {
        name: site.id.clone(),
        title: result.title.clone().unwrap_or_else(|| "Stream".to_string()),
        url,
        behavior_hints: behavior_hints(&result.raw_url, site),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyMode;

    fn site(mode: ProxyMode) -> SiteConfig {
        SiteConfig {
            id: "CB01".to_string(),
            base_url: "https://cb01.test".to_string(),
            enabled: true,
            proxy_mode: mode,
            proxy_pages: false,
            content_types: BTreeSet::from([ContentType::Movie]),
        }
    }

    fn result(url: &str, title: Option<&str>) -> ScrapeResult {
        ScrapeResult {
            source_site: "CB01".to_string(),
            raw_url: url.to_string(),
            title: title.map(str::to_string),
            content_type_guess: None,
        }
    }

    #[test]
    fn manifest_drops_unserved_catalogs() {
        let manifest = build_manifest(&BTreeSet::from([ContentType::Movie, ContentType::Anime]));
        let ids: Vec<_> = manifest.catalogs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["streamscout-movie", "streamscout-anime"]);
        assert_eq!(manifest.types.len(), 4);

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["catalogs"][0]["type"], "movie");
        assert_eq!(json["catalogs"][0]["extra"][0]["name"], "search");
    }

    #[test]
    fn meta_ids_round_trip() {
        let id = meta_id("cb01", "https://cb01.test/film/a-b?x=1");
        assert!(id.starts_with("ss:CB01:"));
        assert_eq!(
            parse_meta_id(&id),
            Some(("CB01".to_string(), "https://cb01.test/film/a-b?x=1".to_string()))
        );
        assert_eq!(parse_meta_id("tt0111161"), None);
        assert_eq!(parse_meta_id("ss:CB01:"), None);
    }

    #[test]
    fn catalog_keeps_titles_with_their_links() {
        let results = vec![
            result("https://x.test/one", Some("One")),
            result("https://x.test/two", None),
            result("https://x.test/three", Some("Three")),
        ];
        let metas = build_catalog(&results, ContentType::Movie, 50);
        assert_eq!(metas[0].name, "One");
        assert_eq!(metas[1].name, UNTITLED);
        assert_eq!(metas[2].name, "Three");
        assert_eq!(
            parse_meta_id(&metas[2].id).map(|(_, u)| u).as_deref(),
            Some("https://x.test/three")
        );

        assert_eq!(build_catalog(&results, ContentType::Movie, 2).len(), 2);
    }

    #[test]
    fn stream_urls_follow_proxy_mode() {
        let relay = Relay::new("https://relay.test", Some("secret"));
        let r = result("https://x.test/stream.mp4", Some("Test Movie"));

        let direct = build_stream(&r, &site(ProxyMode::None), Some(&relay));
        assert_eq!(direct.url, "https://x.test/stream.mp4");
        assert_eq!(direct.title, "Test Movie");
        assert_eq!(direct.behavior_hints, None);

        let relayed = build_stream(&r, &site(ProxyMode::Mediaflow), Some(&relay));
        assert_eq!(
            relayed.url,
            "https://relay.test/proxy?url=https%3A%2F%2Fx.test%2Fstream.mp4&api_password=secret"
        );
    }

    #[test]
    fn embed_streams_get_referer_hint() {
        let entry = build_stream(
            &result("https://mixdrop.co/e/abc", None),
            &site(ProxyMode::None),
            None,
        );
        let hints = entry.behavior_hints.unwrap();
        assert!(hints.not_web_ready);
        assert_eq!(
            hints.proxy_headers.unwrap().request.get("Referer").map(String::as_str),
            Some("https://cb01.test")
        );

        let json = serde_json::to_value(
            build_stream(&result("https://x.test/a.mp4", None), &site(ProxyMode::None), None),
        )
        .unwrap();
        assert!(json.get("behaviorHints").is_none());
        assert_eq!(json["title"], "Stream");
    }

    #[test]
    fn names_from_urls() {
        assert_eq!(name_from_url("https://s.test/film/the-big-movie/"), "the big movie");
        assert_eq!(name_from_url("https://s.test/v/clip.mp4?t=1"), "clip.mp4");
        assert_eq!(name_from_url(""), FALLBACK_NAME);
    }
}
