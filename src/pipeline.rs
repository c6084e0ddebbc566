// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::addon::{self, CatalogMeta, StreamEntry};
use crate::config::{Config, ContentType, SiteConfig};
use crate::filter::is_stream_candidate;
use crate::metadata::{MetadataError, TitleInfo, TmdbClient};
use crate::proxy::Relay;
use crate::sites::{PageFetcher, ScrapeContext, ScrapeResult, SiteRegistry};
use crate::token::Selection;
use anyhow::Result;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs one addon request against a configuration snapshot: scrape the
/// selected sites one after another, filter, rewrite and assemble.
pub struct Aggregator {
    config: Arc<Config>,
    registry: Arc<SiteRegistry>,
    fetcher: PageFetcher,
    tmdb: TmdbClient,
}

impl Aggregator {
    pub fn new(config: Arc<Config>, registry: Arc<SiteRegistry>) -> Result<Self> {
        let fetcher = PageFetcher::new(&config.scraping, &config.proxy)?;
        let tmdb = TmdbClient::new(&config.tmdb, config.scraping.timeout_secs)?;
        Ok(Self {
            config,
            registry,
            fetcher,
            tmdb,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The token's relay wins over the configured one.
    fn relay_for(&self, selection: &Selection) -> Option<Relay> {
        selection
            .relay
            .clone()
            .or_else(|| Relay::from_settings(&self.config.proxy))
    }

    fn active_sites<'a>(&'a self, selection: &Selection) -> impl Iterator<Item = &'a SiteConfig> {
        self.config
            .enabled_sites()
            .filter(move |site| selection.includes(&site.id))
    }

    /// Content types served by at least one selected, enabled site.
    pub fn served_types(&self, selection: &Selection) -> BTreeSet<ContentType> {
        self.active_sites(selection)
            .flat_map(|site| site.content_types.iter().copied())
            .collect()
    }

    pub async fn scrape_site(
        &self,
        site: &SiteConfig,
        query: Option<&str>,
        relay: Option<&Relay>,
    ) -> Vec<ScrapeResult> {
        let scraper = self.registry.get(&site.id);
        let ctx = ScrapeContext {
            fetcher: &self.fetcher,
            relay,
        };
        scraper.scrape(ctx, site, query).await
    }

    async fn scrape_all(
        &self,
        selection: &Selection,
        content_type: ContentType,
        query: Option<&str>,
        relay: Option<&Relay>,
    ) -> Vec<(&SiteConfig, Vec<ScrapeResult>)> {
        let mut out = Vec::new();
        for site in self.active_sites(selection) {
            if !site.serves(content_type) {
                debug!("Skipping site {}: does not serve {}", site.id, content_type);
                continue;
            }
            let results = self.scrape_site(site, query, relay).await;
            out.push((site, results));
        }
        out
    }

    pub async fn catalog(
        &self,
        selection: &Selection,
        content_type: ContentType,
        query: Option<&str>,
    ) -> Vec<CatalogMeta> {
        let relay = self.relay_for(selection);
        let results: Vec<ScrapeResult> = self
            .scrape_all(selection, content_type, query, relay.as_ref())
            .await
            .into_iter()
            .flat_map(|(_, results)| results)
            .collect();

        info!(
            "Catalog {} (search: {:?}): {} result(s)",
            content_type,
            query,
            results.len()
        );
        addon::build_catalog(&results, content_type, self.config.server.catalog_limit)
    }

    async fn lookup_title(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> Result<TitleInfo, MetadataError> {
        match self.tmdb.lookup(content_type, id).await {
            Ok(info) => Ok(info),
            Err(MetadataError::NotConfigured) => {
                debug!("Metadata lookup for {} skipped: no TMDB key", id);
                Err(MetadataError::NotConfigured)
            }
            Err(e) => {
                warn!("Metadata lookup for {} failed: {}", id, e);
                Err(e)
            }
        }
    }

    pub async fn meta(&self, content_type: ContentType, id: &str) -> CatalogMeta {
        if let Some((site, url)) = addon::parse_meta_id(id) {
            let info = TitleInfo {
                name: addon::name_from_url(&url),
                poster: None,
                description: Some(format!("From {}: {}", site, url)),
                genres: Vec::new(),
            };
            return CatalogMeta::from_title(id, content_type, info);
        }

        let info = self
            .lookup_title(content_type, id)
            .await
            .unwrap_or_else(|_| TitleInfo::placeholder());
        CatalogMeta::from_title(id, content_type, info)
    }

    /// Search text for an opaque id: its title, or the id itself.
    pub async fn resolve_query(&self, content_type: ContentType, id: &str) -> String {
        match self.lookup_title(content_type, id).await {
            Ok(info) => info.name,
            Err(_) => id.to_string(),
        }
    }

    pub async fn streams(
        &self,
        selection: &Selection,
        content_type: ContentType,
        id: &str,
    ) -> Vec<StreamEntry> {
        let relay = self.relay_for(selection);

        // Links minted by our own catalog are played directly
        if let Some((code, url)) = addon::parse_meta_id(id) {
            if !is_stream_candidate(&url) {
                debug!("Link {} from id {} is not a stream", url, id);
                return Vec::new();
            }
            return match self
                .active_sites(selection)
                .find(|s| s.id.eq_ignore_ascii_case(&code))
            {
                Some(site) => {
                    let result = ScrapeResult {
                        source_site: site.id.clone(),
                        raw_url: url,
                        title: None,
                        content_type_guess: Some(content_type),
                    };
                    vec![addon::build_stream(&result, site, relay.as_ref())]
                }
                None => {
                    debug!("Site {} from id {} is not active", code, id);
                    Vec::new()
                }
            };
        }

        let query = self.resolve_query(content_type, id).await;
        let mut streams = Vec::new();
        let mut seen = HashSet::new();

        for (site, results) in self
            .scrape_all(selection, content_type, Some(query.as_str()), relay.as_ref())
            .await
        {
            let before = streams.len();
            streams.extend(
                results
                    .iter()
                    .filter(|r| is_stream_candidate(&r.raw_url))
                    .map(|r| addon::build_stream(r, site, relay.as_ref()))
                    // Listing and search pages often repeat the same link
                    .filter(|entry| seen.insert(entry.url.clone())),
            );
            debug!(
                "Site {}: {} of {} link(s) are streams",
                site.id,
                streams.len() - before,
                results.len()
            );
        }

        info!("Streams for {} {}: {}", content_type, id, streams.len());
        streams
    }
}
