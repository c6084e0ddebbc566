// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::config::{ContentType, TmdbConfig};
use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const FALLBACK_NAME: &str = "Unknown title";
pub const FALLBACK_DESCRIPTION: &str = "No description available.";
pub const FALLBACK_POSTER: &str = "https://via.placeholder.com/300x450?text=No+Poster";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("no TMDB API key configured")]
    NotConfigured,
    #[error("TMDB request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("TMDB returned status {0}")]
    Status(StatusCode),
    #[error("no TMDB entry for '{0}'")]
    NotFound(String),
}

/// Display information for a title.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleInfo {
    pub name: String,
    pub poster: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
}

impl TitleInfo {
    pub fn placeholder() -> Self {
        Self {
            name: FALLBACK_NAME.to_string(),
            poster: Some(FALLBACK_POSTER.to_string()),
            description: Some(FALLBACK_DESCRIPTION.to_string()),
            genres: Vec::new(),
        }
    }
}

/// A reference to a TMDB entry derived from an addon id.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TmdbRef {
    Imdb(String),
    Tmdb(u64),
}

impl TmdbRef {
    /// `tt1234567`, `tt1234567:1:2` (season/episode suffix) or `tmdb:603`.
    fn from_id(id: &str) -> Option<Self> {
        if let Some(rest) = id.strip_prefix("tmdb:") {
            let num = rest.split(':').next()?;
            return num.parse().ok().map(TmdbRef::Tmdb);
        }
        let base = id.split(':').next()?;
        if base.len() > 2
            && base.starts_with("tt")
            && base[2..].chars().all(|c| c.is_ascii_digit())
        {
            return Some(TmdbRef::Imdb(base.to_string()));
        }
        None
    }
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<FindItem>,
    #[serde(default)]
    tv_results: Vec<FindItem>,
}

#[derive(Debug, Deserialize)]
struct FindItem {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Details {
    #[serde(alias = "name")]
    title: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    config: TmdbConfig,
}

impl TmdbClient {
    pub fn new(config: &TmdbConfig, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .with_context(|| "Failed to build TMDB client")?,
            config: config.clone(),
        })
    }

    pub async fn lookup(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> Result<TitleInfo, MetadataError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(MetadataError::NotConfigured)?;

        let (kind, tmdb_id) = match TmdbRef::from_id(id) {
            Some(TmdbRef::Tmdb(n)) => (media_kind(content_type), n),
            Some(TmdbRef::Imdb(imdb)) => self.find(api_key, &imdb, content_type).await?,
            None => return Err(MetadataError::NotFound(id.to_string())),
        };

        let details: Details = self
            .get(api_key, &format!("/{}/{}", kind, tmdb_id), &[])
            .await?;

        debug!("TMDB resolved {} to {:?}", id, details.title);

        Ok(TitleInfo {
            name: details
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| FALLBACK_NAME.to_string()),
            poster: details
                .poster_path
                .map(|p| format!("{}{}", self.config.image_base.trim_end_matches('/'), p)),
            description: details.overview.filter(|o| !o.is_empty()),
            genres: details.genres.into_iter().map(|g| g.name).collect(),
        })
    }

    async fn find(
        &self,
        api_key: &str,
        imdb_id: &str,
        content_type: ContentType,
    ) -> Result<(&'static str, u64), MetadataError> {
        let found: FindResponse = self
            .get(
                api_key,
                &format!("/find/{}", imdb_id),
                &[("external_source", "imdb_id")],
            )
            .await?;

        let movie = found.movie_results.first().map(|m| ("movie", m.id));
        let tv = found.tv_results.first().map(|t| ("tv", t.id));

        // Respect the requested kind when both lists have a hit
        let hit = match media_kind(content_type) {
            "tv" => tv.or(movie),
            _ => movie.or(tv),
        };
        hit.ok_or_else(|| MetadataError::NotFound(imdb_id.to_string()))
    }

    async fn get<T>(&self, api_key: &str, path: &str, extra: &[(&str, &str)]) -> Result<T, MetadataError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", api_key), ("language", self.config.language.as_str())])
            .query(extra)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(MetadataError::Status(status));
        }
        Ok(response.json().await?)
    }
}

fn media_kind(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Series | ContentType::Anime => "tv",
        ContentType::Movie | ContentType::Channel => "movie",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_addon_ids() {
        assert_eq!(
            TmdbRef::from_id("tt0111161"),
            Some(TmdbRef::Imdb("tt0111161".to_string()))
        );
        assert_eq!(
            TmdbRef::from_id("tt0944947:1:2"),
            Some(TmdbRef::Imdb("tt0944947".to_string()))
        );
        assert_eq!(TmdbRef::from_id("tmdb:603"), Some(TmdbRef::Tmdb(603)));
        assert_eq!(TmdbRef::from_id("tmdb:abc"), None);
        assert_eq!(TmdbRef::from_id("ttabc"), None);
        assert_eq!(TmdbRef::from_id("ss:CB01:x"), None);
    }

    #[tokio::test]
    async fn missing_api_key_is_not_configured() {
        let client = TmdbClient::new(&TmdbConfig::default(), 5).unwrap();
        let err = client
            .lookup(ContentType::Movie, "tt0111161")
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotConfigured));
    }

    #[test]
    fn placeholder_uses_fixed_values() {
        let info = TitleInfo::placeholder();
        assert_eq!(info.name, FALLBACK_NAME);
        assert_eq!(info.poster.as_deref(), Some(FALLBACK_POSTER));
        assert_eq!(info.description.as_deref(), Some(FALLBACK_DESCRIPTION));
    }
}
