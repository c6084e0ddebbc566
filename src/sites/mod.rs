// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Site scrapers and the registry that maps a site code to one.

mod fetch;
mod profiles;

pub use fetch::{FetchError, PageFetcher};
pub use profiles::{HtmlScraper, PROFILES, SiteProfile, extract_results};

use crate::config::{ContentType, SiteConfig};
use crate::proxy::Relay;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Code of the scraper used for sites without a dedicated profile.
pub const GENERIC_CODE: &str = "GENERIC";

/// A link found on a site page, paired with the title found next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResult {
    pub source_site: String,
    pub raw_url: String,
    pub title: Option<String>,
    pub content_type_guess: Option<ContentType>,
}

/// Shared collaborators for one scrape call.
#[derive(Clone, Copy)]
pub struct ScrapeContext<'a> {
    pub fetcher: &'a PageFetcher,
    /// Relay used when a site fetches its pages through the relay.
    pub relay: Option<&'a Relay>,
}

#[async_trait]
pub trait SiteScraper: Send + Sync {
    fn code(&self) -> &str;

    /// Never fails: fetch and parse problems are logged and produce no results.
    async fn scrape(
        &self,
        ctx: ScrapeContext<'_>,
        site: &SiteConfig,
        query: Option<&str>,
    ) -> Vec<ScrapeResult>;
}

pub struct SiteRegistry {
    scrapers: HashMap<String, Arc<dyn SiteScraper>>,
    fallback: Arc<dyn SiteScraper>,
}

impl SiteRegistry {
    /// Registry holding every built-in profile.
    pub fn builtin() -> Result<Self> {
        let mut scrapers: HashMap<String, Arc<dyn SiteScraper>> = HashMap::new();
        let mut fallback = None;

        for profile in PROFILES {
            let scraper: Arc<dyn SiteScraper> = Arc::new(HtmlScraper::new(profile)?);
            if profile.code == GENERIC_CODE {
                fallback = Some(scraper.clone());
            }
            scrapers.insert(profile.code.to_string(), scraper);
        }

        let fallback =
            fallback.ok_or_else(|| anyhow::anyhow!("No generic site profile defined"))?;

        Ok(Self { scrapers, fallback })
    }

    pub fn register(&mut self, scraper: Arc<dyn SiteScraper>) {
        self.scrapers
            .insert(scraper.code().to_ascii_uppercase(), scraper);
    }

    pub fn contains(&self, code: &str) -> bool {
        self.scrapers.contains_key(&code.to_ascii_uppercase())
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.scrapers.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Scraper for a site code, or the generic one when the code is unknown.
    pub fn get(&self, code: &str) -> Arc<dyn SiteScraper> {
        match self.scrapers.get(&code.to_ascii_uppercase()) {
            Some(scraper) => scraper.clone(),
            None => {
                warn!("No scraper registered for site '{}', using generic", code);
                self.fallback.clone()
            }
        }
    }
}
