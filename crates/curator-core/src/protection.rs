//! Known anti-automation defenses per retail domain.
//!
//! Classification is informational: it never blocks a fetch by itself. The
//! orchestrator only consults [`ProtectionClassifier::requires_confirmation`]
//! before a batch starts.

use std::collections::HashMap;
use url::Url;

use crate::error::CuratorError;
use crate::model::{DomainProtectionProfile, ProtectionLevel};

/// Below this observed success rate an `ultra-high` domain needs an operator.
pub const LOW_SUCCESS_THRESHOLD: f64 = 0.10;

const KNOWN_DOMAINS: &[(&str, ProtectionLevel, f64, &str)] = &[
    ("net-a-porter.com", ProtectionLevel::UltraHigh, 0.05, "Akamai Bot Manager; enter products manually"),
    ("mrporter.com", ProtectionLevel::UltraHigh, 0.05, "Akamai Bot Manager; enter products manually"),
    ("saksfifthavenue.com", ProtectionLevel::UltraHigh, 0.06, "PerimeterX; enter products manually"),
    ("ssense.com", ProtectionLevel::UltraHigh, 0.08, "Cloudflare challenge; enter products manually"),
    ("instagram.com", ProtectionLevel::UltraHigh, 0.02, "login wall; use brand site instead"),
    ("nordstrom.com", ProtectionLevel::UltraHigh, 0.15, "Akamai; expect frequent blocks"),
    ("farfetch.com", ProtectionLevel::High, 0.25, "DataDome; scrape in small batches"),
    ("neimanmarcus.com", ProtectionLevel::High, 0.20, "Akamai; scrape in small batches"),
    ("zara.com", ProtectionLevel::High, 0.30, "Akamai; scrape in small batches"),
    ("amazon.com", ProtectionLevel::High, 0.30, "captcha on bursts; scrape in small batches"),
    ("revolve.com", ProtectionLevel::High, 0.35, "PerimeterX; scrape in small batches"),
    ("walmart.com", ProtectionLevel::High, 0.25, "PerimeterX; scrape in small batches"),
    ("shopbop.com", ProtectionLevel::Low, 0.70, "occasional rate limiting"),
    ("target.com", ProtectionLevel::Low, 0.75, "occasional rate limiting"),
    ("hm.com", ProtectionLevel::Low, 0.80, "occasional rate limiting"),
];

pub struct ProtectionClassifier {
    table: HashMap<String, DomainProtectionProfile>,
    low_success_threshold: f64,
}

impl Default for ProtectionClassifier {
    fn default() -> Self {
        Self::new(Vec::new(), LOW_SUCCESS_THRESHOLD)
    }
}

impl ProtectionClassifier {
    /// Builds the classifier from the built-in table; `extra` entries win.
    pub fn new(extra: Vec<DomainProtectionProfile>, low_success_threshold: f64) -> Self {
        let mut table: HashMap<String, DomainProtectionProfile> = KNOWN_DOMAINS
            .iter()
            .map(|(domain, level, rate, note)| {
                (
                    domain.to_string(),
                    DomainProtectionProfile {
                        domain: domain.to_string(),
                        protection_level: *level,
                        observed_success_rate: Some(*rate),
                        recommendation: note.to_string(),
                    },
                )
            })
            .collect();

        for profile in extra {
            let key = profile.domain.trim().to_ascii_lowercase();
            table.insert(key, profile);
        }

        Self {
            table,
            low_success_threshold,
        }
    }

    pub fn classify(&self, domain: &str) -> DomainProtectionProfile {
        let domain = domain.trim().trim_start_matches("www.").to_ascii_lowercase();
        let registrable = registrable_domain(&domain);

        self.table
            .get(&domain)
            .or_else(|| self.table.get(&registrable))
            .cloned()
            .unwrap_or_else(|| DomainProtectionProfile {
                domain: registrable,
                protection_level: ProtectionLevel::None,
                observed_success_rate: None,
                recommendation: "no known defenses".to_string(),
            })
    }

    pub fn classify_url(&self, url: &str) -> Result<DomainProtectionProfile, CuratorError> {
        let host = host_of(url)?;
        Ok(self.classify(&host))
    }

    pub fn requires_confirmation(&self, profile: &DomainProtectionProfile) -> bool {
        profile.protection_level == ProtectionLevel::UltraHigh
            && profile
                .observed_success_rate
                .is_some_and(|rate| rate < self.low_success_threshold)
    }
}

/// Lower-cased host of `url`; bare domains are accepted.
pub fn host_of(url: &str) -> Result<String, CuratorError> {
    let trimmed = url.trim();
    let parsed = Url::parse(trimmed).or_else(|_| Url::parse(&format!("https://{trimmed}")));
    match parsed {
        Ok(u) => u
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| CuratorError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            }),
        Err(e) => Err(CuratorError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// eTLD+1 of a host, falling back to the host itself.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_start_matches("www.");
    psl::domain_str(host).unwrap_or(host).to_string()
}

pub fn domain_of(url: &str) -> Option<String> {
    host_of(url).ok().map(|host| registrable_domain(&host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_domain_defaults_to_none() {
        let classifier = ProtectionClassifier::default();
        let profile = classifier.classify("tove-studio.com");
        assert_eq!(profile.protection_level, ProtectionLevel::None);
        assert_eq!(profile.observed_success_rate, None);
        assert!(!classifier.requires_confirmation(&profile));
    }

    #[test]
    fn test_subdomain_resolves_to_registrable_entry() {
        let classifier = ProtectionClassifier::default();
        let profile = classifier.classify_url("https://www.net-a-porter.com/en-us/shop/product/1").unwrap();
        assert_eq!(profile.domain, "net-a-porter.com");
        assert!(classifier.requires_confirmation(&profile));
    }

    #[test]
    fn test_ultra_high_above_threshold_does_not_gate() {
        let classifier = ProtectionClassifier::default();
        let profile = classifier.classify("nordstrom.com");
        assert_eq!(profile.protection_level, ProtectionLevel::UltraHigh);
        assert!(!classifier.requires_confirmation(&profile));
    }

    #[test]
    fn test_high_with_low_rate_does_not_gate() {
        let classifier = ProtectionClassifier::new(
            vec![DomainProtectionProfile {
                domain: "brand-a.com".into(),
                protection_level: ProtectionLevel::High,
                observed_success_rate: Some(0.01),
                recommendation: String::new(),
            }],
            LOW_SUCCESS_THRESHOLD,
        );
        let profile = classifier.classify("shop.brand-a.com");
        assert_eq!(profile.protection_level, ProtectionLevel::High);
        assert!(!classifier.requires_confirmation(&profile));
    }

    #[test]
    fn test_registrable_domain_handles_multi_part_suffix() {
        assert_eq!(registrable_domain("shop.brand.co.uk"), "brand.co.uk");
        assert_eq!(domain_of("brand-a.com/products/x").as_deref(), Some("brand-a.com"));
        assert!(host_of("").is_err());
    }
}
