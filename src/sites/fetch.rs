// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::config::{ProxyMode, ProxySettings, ScrapingConfig, SiteConfig};
use crate::proxy::Relay;
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, REFERER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
}

/// Issues single-shot page requests with a browser-like header set.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    direct: Client,
    proxied: Option<Client>,
    accept_language: String,
}

impl PageFetcher {
    pub fn new(scraping: &ScrapingConfig, proxy: &ProxySettings) -> Result<Self> {
        let timeout = Duration::from_secs(scraping.timeout_secs);

        let direct = Client::builder()
            .timeout(timeout)
            .user_agent(&scraping.user_agent)
            .build()
            .with_context(|| "Failed to build HTTP client")?;

        let proxied = match proxy.http_proxy.as_deref().filter(|p| !p.is_empty()) {
            Some(proxy_url) => Some(
                Client::builder()
                    .timeout(timeout)
                    .user_agent(&scraping.user_agent)
                    .proxy(
                        reqwest::Proxy::all(proxy_url)
                            .with_context(|| format!("Invalid forward proxy: {}", proxy_url))?,
                    )
                    .build()
                    .with_context(|| "Failed to build proxied HTTP client")?,
            ),
            None => None,
        };

        Ok(Self {
            direct,
            proxied,
            accept_language: scraping.accept_language.clone(),
        })
    }

    fn client_for(&self, site: &SiteConfig) -> &Client {
        match (site.proxy_mode, &self.proxied) {
            (ProxyMode::GenericProxy, Some(client)) => client,
            (ProxyMode::GenericProxy, None) => {
                warn!(
                    "Site {} wants a forward proxy but none is configured, fetching directly",
                    site.id
                );
                &self.direct
            }
            _ => &self.direct,
        }
    }

    /// Fetches a page for `site`. Sites with `proxy_pages` go through the
    /// relay first and fall back to a direct fetch when the relay fails.
    pub async fn fetch(
        &self,
        site: &SiteConfig,
        url: &str,
        relay: Option<&Relay>,
    ) -> Result<String, FetchError> {
        if site.proxy_pages {
            match relay {
                Some(relay) => match self.fetch_via_relay(site, url, relay).await {
                    Ok(body) => return Ok(body),
                    Err(e) => warn!(
                        "Relay fetch of {} for site {} failed ({}), falling back to direct",
                        url, site.id, e
                    ),
                },
                None => warn!(
                    "Site {} wants pages through the relay but none is configured",
                    site.id
                ),
            }
        }

        debug!("Fetching {} for site {}", url, site.id);
        let response = self
            .client_for(site)
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .header(REFERER, &site.base_url)
            .send()
            .await?;

        Self::read_body(response).await
    }

    async fn fetch_via_relay(
        &self,
        site: &SiteConfig,
        url: &str,
        relay: &Relay,
    ) -> Result<String, FetchError> {
        let relay_url = relay.wrap(url, None);
        debug!("Fetching {} for site {} through relay", url, site.id);

        let mut request = self
            .direct
            .get(&relay_url)
            .header(ACCEPT_LANGUAGE, &self.accept_language);
        if let Some(password) = relay.password() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", password));
        }

        Self::read_body(request.send().await?).await
    }

    async fn read_body(response: reqwest::Response) -> Result<String, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.text().await?)
    }
}
