// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::CommandContext;
use anyhow::Result;
use streamscout::SiteRegistry;
use streamscout::proxy::Relay;

pub struct CheckConfigCommand;

impl CheckConfigCommand {
    pub fn execute(self, context: CommandContext) -> Result<()> {
        let config = context.load_config()?;
        let registry = SiteRegistry::builtin()?;

        println!("Configuration: {}", context.config_path.display());
        println!("Sites ({}):", config.sites.len());

        for site in &config.sites {
            let types: Vec<&str> = site.content_types.iter().map(|t| t.as_str()).collect();
            let scraper = if registry.contains(&site.id) {
                ""
            } else {
                " [generic scraper]"
            };
            println!(
                "  {} {} {} proxy={:?}{} types={}{}",
                if site.enabled { "+" } else { "-" },
                site.id,
                site.base_url,
                site.proxy_mode,
                if site.proxy_pages { " (pages via relay)" } else { "" },
                types.join(","),
                scraper,
            );
        }

        match Relay::from_settings(&config.proxy) {
            Some(relay) => println!("Relay: {}", relay.base_url()),
            None => println!("Relay: not configured"),
        }
        if let Some(proxy) = &config.proxy.http_proxy {
            println!("Forward proxy: {}", proxy);
        }
        println!("Built-in profiles: {}", registry.codes().join(", "));
        println!(
            "TMDB: {}",
            if config.tmdb.api_key.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );

        Ok(())
    }
}
