// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! The `{config}` path segment of addon URLs.
//!
//! ```text
//! token   := segment ( '|' segment )*
//! segment := ''  |  code  |  'MFP[' url ',' password ']'
//! code    := [A-Za-z0-9_-]+
//! ```
//!
//! Inside `MFP[...]` the url runs to the first ',' and the password to the
//! closing ']', so neither may contain the delimiter that ends it.

use crate::proxy::Relay;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("configuration token is empty")]
    Empty,
    #[error("unterminated group starting at byte {0}")]
    UnterminatedGroup(usize),
    #[error("malformed group '{0}'")]
    BadGroup(String),
    #[error("invalid site code '{0}'")]
    BadCode(String),
}

/// Which sites and which relay a request should use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Upper-cased site codes. Empty selects every configured site.
    pub sites: Vec<String>,
    pub relay: Option<Relay>,
}

impl Selection {
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        let mut selection = Selection::default();
        let bytes = token.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            let rest = &token[pos..];

            if rest.starts_with("MFP[") {
                let close = rest
                    .find(']')
                    .ok_or(TokenError::UnterminatedGroup(pos))?;
                let inner = &rest[4..close];
                let (url, password) = inner
                    .split_once(',')
                    .ok_or_else(|| TokenError::BadGroup(rest[..=close].to_string()))?;
                let url = url.trim();
                if url.is_empty() || url::Url::parse(url).is_err() {
                    return Err(TokenError::BadGroup(rest[..=close].to_string()));
                }
                selection.relay = Some(Relay::new(url, Some(password.trim())));

                pos += close + 1;
                match bytes.get(pos) {
                    None => {}
                    Some(b'|') => pos += 1,
                    Some(_) => {
                        return Err(TokenError::BadGroup(rest[..=close].to_string()));
                    }
                }
                continue;
            }

            let end = rest.find('|').unwrap_or(rest.len());
            let code = &rest[..end];
            if !code.is_empty() {
                if !code
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(TokenError::BadCode(code.to_string()));
                }
                let code = code.to_ascii_uppercase();
                if !selection.sites.contains(&code) {
                    selection.sites.push(code);
                }
            }
            pos += end + 1;
        }

        Ok(selection)
    }

    pub fn includes(&self, site_id: &str) -> bool {
        self.sites.is_empty() || self.sites.iter().any(|s| s.eq_ignore_ascii_case(site_id))
    }

    /// Renders the selection back into a token, percent-encoded for a path.
    pub fn encode(&self) -> String {
        let mut segments: Vec<String> = self.sites.clone();
        if let Some(relay) = &self.relay {
            segments.push(format!(
                "MFP[{},{}]",
                relay.base_url(),
                relay.password().unwrap_or_default()
            ));
        }
        urlencoding::encode(&segments.join("|")).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_relay() {
        let selection =
            Selection::parse("cb01|SW|MFP[https://relay.test,secret]|").unwrap();
        assert_eq!(selection.sites, vec!["CB01", "SW"]);
        let relay = selection.relay.unwrap();
        assert_eq!(relay.base_url(), "https://relay.test");
        assert_eq!(relay.password(), Some("secret"));
    }

    #[test]
    fn relay_with_port_and_empty_password() {
        let selection = Selection::parse("MFP[http://10.0.0.2:8888/,]|AW").unwrap();
        assert_eq!(selection.sites, vec!["AW"]);
        let relay = selection.relay.unwrap();
        assert_eq!(relay.base_url(), "http://10.0.0.2:8888");
        assert_eq!(relay.password(), None);
    }

    #[test]
    fn empty_code_list_selects_everything() {
        let selection = Selection::parse("MFP[https://relay.test,pw]").unwrap();
        assert!(selection.includes("CB01"));
        assert!(selection.includes("anything"));

        let selection = Selection::parse("CB01").unwrap();
        assert!(selection.includes("cb01"));
        assert!(!selection.includes("SW"));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(Selection::parse("  "), Err(TokenError::Empty));
        assert_eq!(
            Selection::parse("CB01|MFP[https://relay.test,pw"),
            Err(TokenError::UnterminatedGroup(5))
        );
        assert!(matches!(
            Selection::parse("MFP[https://relay.test]"),
            Err(TokenError::BadGroup(_))
        ));
        assert!(matches!(
            Selection::parse("MFP[not a url,pw]"),
            Err(TokenError::BadGroup(_))
        ));
        assert!(matches!(
            Selection::parse("MFP[https://relay.test,pw]CB01"),
            Err(TokenError::BadGroup(_))
        ));
        assert_eq!(
            Selection::parse("CB01|S W"),
            Err(TokenError::BadCode("S W".to_string()))
        );
    }

    #[test]
    fn encode_parses_back() {
        let selection = Selection {
            sites: vec!["CB01".to_string(), "AW".to_string()],
            relay: Some(Relay::new("https://relay.test", Some("secret"))),
        };
        let encoded = selection.encode();
        assert!(!encoded.contains('|'));

        let decoded = urlencoding::decode(&encoded).unwrap();
        assert_eq!(Selection::parse(&decoded).unwrap(), selection);
    }
}
