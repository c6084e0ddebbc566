// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::{ScrapeContext, ScrapeResult, SiteScraper};
use crate::config::{ContentType, SiteConfig};
use crate::filter::is_stream_candidate;
use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Site-specific knowledge: where to search and which elements hold results.
#[derive(Debug)]
pub struct SiteProfile {
    pub code: &'static str,
    /// `{base}` and `{query}` are substituted; the query is percent-encoded.
    pub search_template: &'static str,
    pub item_selector: &'static str,
    pub title_selector: &'static str,
}

impl SiteProfile {
    pub fn search_url(&self, base_url: &str, query: &str) -> String {
        self.search_template
            .replace("{base}", base_url.trim_end_matches('/'))
            .replace("{query}", &urlencoding::encode(query))
    }
}

pub static PROFILES: &[SiteProfile] = &[
    SiteProfile {
        code: "CB01",
        search_template: "{base}/?s={query}",
        item_selector: "div.film, div.card-content, article.post",
        title_selector: "h3, h2, .card-title",
    },
    SiteProfile {
        code: "GS",
        search_template: "{base}/?story={query}&do=search&subaction=search",
        item_selector: "div.mlnh-2, div.short, div.mlnew",
        title_selector: "h2, .mlnh-2 a, .short-title",
    },
    SiteProfile {
        code: "SW",
        search_template: "{base}/?s={query}",
        item_selector: "article.post, div.item",
        title_selector: "h2.entry-title, h2, h3",
    },
    SiteProfile {
        code: "AW",
        search_template: "{base}/search?keyword={query}",
        item_selector: "div.film-list div.item, div.item",
        title_selector: "a.name, .name, h3",
    },
    SiteProfile {
        code: "AS",
        search_template: "{base}/animelist?search={query}",
        item_selector: "div.item-archivio, ul.list-group li",
        title_selector: "h3, a.badge",
    },
    SiteProfile {
        code: "LIVE",
        search_template: "{base}/?s={query}",
        item_selector: "div.channel, li.channel, div.canale",
        title_selector: "h2, h3, .channel-name, span.name",
    },
    SiteProfile {
        code: "GENERIC",
        search_template: "{base}/search?q={query}",
        item_selector: "div[class*='item'], article, .search-result, li",
        title_selector: "h2, h3, .title",
    },
];

pub struct HtmlScraper {
    profile: &'static SiteProfile,
    items: Selector,
    title: Selector,
    link: Selector,
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("Invalid selector '{}': {:?}", s, e))
}

impl HtmlScraper {
    pub fn new(profile: &'static SiteProfile) -> Result<Self> {
        Ok(Self {
            profile,
            items: selector(profile.item_selector)?,
            title: selector(profile.title_selector)?,
            link: selector("a[href]")?,
        })
    }

    async fn scrape_page(
        &self,
        ctx: ScrapeContext<'_>,
        site: &SiteConfig,
        url: &str,
    ) -> Vec<ScrapeResult> {
        match ctx.fetcher.fetch(site, url, ctx.relay).await {
            Ok(html) => {
                let results = self.extract(&html, site);
                debug!("Site {}: {} result(s) from {}", site.id, results.len(), url);
                results
            }
            Err(e) => {
                warn!("Site {}: fetching {} failed: {}", site.id, url, e);
                Vec::new()
            }
        }
    }

    fn extract(&self, html: &str, site: &SiteConfig) -> Vec<ScrapeResult> {
        // Html is not Send, so parsing stays out of any await
        let document = Html::parse_document(html);
        document
            .select(&self.items)
            .filter_map(|item| self.extract_item(item, site))
            .collect()
    }

    fn extract_item(&self, item: ElementRef<'_>, site: &SiteConfig) -> Option<ScrapeResult> {
        let hrefs: Vec<&str> = item
            .select(&self.link)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|h| !h.is_empty() && !h.starts_with('#'))
            .collect();

        // Prefer a playable link over the first detail-page link
        let href = hrefs
            .iter()
            .find(|h| is_stream_candidate(h))
            .or_else(|| hrefs.first())?;

        let title = item
            .select(&self.title)
            .map(|el| normalize_text(&el.text().collect::<String>()))
            .find(|t| !t.is_empty());

        Some(ScrapeResult {
            source_site: site.id.clone(),
            raw_url: href.to_string(),
            title,
            content_type_guess: guess_content_type(href, site),
        })
    }
}

#[async_trait]
impl SiteScraper for HtmlScraper {
    fn code(&self) -> &str {
        self.profile.code
    }

    async fn scrape(
        &self,
        ctx: ScrapeContext<'_>,
        site: &SiteConfig,
        query: Option<&str>,
    ) -> Vec<ScrapeResult> {
        let mut results = self.scrape_page(ctx, site, &site.base_url).await;

        if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
            let search_url = self.profile.search_url(&site.base_url, query);
            results.extend(self.scrape_page(ctx, site, &search_url).await);
        }

        results
    }
}

/// Runs a profile's extraction over an HTML document without fetching.
pub fn extract_results(
    profile: &'static SiteProfile,
    html: &str,
    site: &SiteConfig,
) -> Result<Vec<ScrapeResult>> {
    Ok(HtmlScraper::new(profile)?.extract(html, site))
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn guess_content_type(href: &str, site: &SiteConfig) -> Option<ContentType> {
    let lower = href.to_ascii_lowercase();
    if lower.contains("/anime") {
        Some(ContentType::Anime)
    } else if lower.contains("/serie") || lower.contains("/tv/") {
        Some(ContentType::Series)
    } else if lower.contains("/film") || lower.contains("/movie") {
        Some(ContentType::Movie)
    } else if site.content_types.len() == 1 {
        site.content_types.iter().next().copied()
    } else {
        None
    }
}
