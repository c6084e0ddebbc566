// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::{CommandContext, OutputFormat};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use streamscout::filter::is_stream_candidate;
use streamscout::proxy::Relay;
use streamscout::{Aggregator, SiteRegistry};

/// Runs a single site scrape and prints what was found.
pub struct ScrapeCommand {
    pub site: String,
    pub query: Option<String>,
    pub format: OutputFormat,
}

impl ScrapeCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        let config = Arc::new(context.load_config()?);
        let site = config
            .site(&self.site)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Site '{}' is not configured", self.site))?;

        if !site.enabled {
            eprintln!("Note: site {} is disabled in the configuration", site.id);
        }

        let relay = Relay::from_settings(&config.proxy);
        let aggregator = Aggregator::new(config, Arc::new(SiteRegistry::builtin()?))?;

        eprintln!("Scraping {}...", site.id);
        let results = aggregator
            .scrape_site(&site, self.query.as_deref(), relay.as_ref())
            .await;

        match self.format {
            OutputFormat::Json => {
                let items: Vec<_> = results
                    .iter()
                    .map(|r| {
                        json!({
                            "site": r.source_site,
                            "url": r.raw_url,
                            "title": r.title,
                            "type": r.content_type_guess,
                            "stream": is_stream_candidate(&r.raw_url),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            }
            OutputFormat::Text => {
                if results.is_empty() {
                    println!("No results from {}", site.id);
                }
                for r in &results {
                    let marker = if is_stream_candidate(&r.raw_url) { "*" } else { " " };
                    println!(
                        "{} {} - {}",
                        marker,
                        r.title.as_deref().unwrap_or("(untitled)"),
                        r.raw_url
                    );
                }
            }
        }

        Ok(())
    }
}
