// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

pub mod addon;
pub mod config;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod pipeline;
pub mod proxy;
pub mod ratelimit;
pub mod server;
pub mod sites;
pub mod token;

pub use config::{Config, ConfigStore};
pub use pipeline::Aggregator;
pub use server::AppState;
pub use sites::SiteRegistry;
