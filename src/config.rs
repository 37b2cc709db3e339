//! Enumeration configuration and scope arithmetic.
//!
//! The `Config` owns everything an enumeration needs to know up front: the
//! root domains that define scope, optional ASNs, user-provided names, the
//! passive/active mode switches, data-source selection, and the run UUID
//! attached to every graph write.

use std::collections::HashSet;

use psl::domain_str;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EnumError, Result};
use crate::requests::SUBDOMAIN_RE;

/// Selection predicate over the available data sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFilter {
    /// Source names the filter applies to.
    pub sources: Vec<String>,
    /// When true the listed sources are the only ones used; when false they
    /// are excluded.
    pub include: bool,
}

/// Main configuration for an enumeration run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root domains defining the vertical scope.
    domains: Vec<String>,

    /// Autonomous system numbers to investigate.
    pub asns: Vec<i32>,

    /// Names supplied by the user to seed the run.
    pub provided_names: Vec<String>,

    /// Skip DNS resolution, storage, and derivation stages.
    pub passive: bool,

    /// Enable active probing and larger reverse sweeps.
    pub active: bool,

    /// Subdomains that must never enter the stream.
    pub blacklist: Vec<String>,

    /// Data-source selection.
    pub source_filter: SourceFilter,

    /// Identifier attached to all graph writes of this run.
    pub uuid: Uuid,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            asns: Vec::new(),
            provided_names: Vec::new(),
            passive: false,
            active: false,
            blacklist: Vec::new(),
            source_filter: SourceFilter::default(),
            uuid: Uuid::new_v4(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root domain. Normalized to lowercase without surrounding
    /// dots; duplicates are ignored.
    pub fn add_domain(&mut self, domain: &str) {
        let d = domain.trim().trim_matches('.').to_lowercase();
        if !d.is_empty() && !self.domains.iter().any(|x| x == &d) {
            self.domains.push(d);
        }
    }

    /// The configured root domains.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Pre-flight validation. Failure here is terminal for the run.
    pub fn check_settings(&self) -> Result<()> {
        if self.passive && self.active {
            return Err(EnumError::configuration(
                "passive mode and active mode are mutually exclusive",
            ));
        }
        if self.domains.is_empty() {
            return Err(EnumError::configuration(
                "at least one root domain is required",
            ));
        }
        for d in &self.domains {
            if !SUBDOMAIN_RE.is_match(d) {
                return Err(EnumError::configuration(format!(
                    "'{d}' is not a valid root domain"
                )));
            }
            if domain_str(d).is_none() {
                return Err(EnumError::configuration(format!(
                    "'{d}' has no registrable public suffix"
                )));
            }
        }
        Ok(())
    }

    /// Which configured root domain does `name` fall under, if any.
    /// Longest suffix wins when roots nest.
    pub fn which_domain(&self, name: &str) -> Option<&str> {
        let n = name.trim_matches('.').to_lowercase();
        self.domains
            .iter()
            .filter(|d| n == **d || n.ends_with(&format!(".{d}")))
            .max_by_key(|d| d.len())
            .map(|d| d.as_str())
    }

    /// True when the name belongs to one of the configured root domains.
    pub fn is_domain_in_scope(&self, name: &str) -> bool {
        self.which_domain(name).is_some()
    }

    /// True when the name matches a blacklisted subdomain.
    pub fn blacklisted(&self, name: &str) -> bool {
        let n = name.trim_matches('.').to_lowercase();
        self.blacklist
            .iter()
            .any(|b| n == *b || n.ends_with(&format!(".{b}")))
    }

    /// Apply the source filter to a set of available source names,
    /// returning the selected subset in sorted order.
    pub fn selected_source_names<'a>(&self, available: &[&'a str]) -> Vec<&'a str> {
        let specified: HashSet<&str> = self.source_filter.sources.iter().map(|s| s.as_str()).collect();

        let mut selected: Vec<&str> = if !specified.is_empty() && self.source_filter.include {
            available
                .iter()
                .copied()
                .filter(|s| specified.contains(s))
                .collect()
        } else {
            available
                .iter()
                .copied()
                .filter(|s| !specified.contains(s))
                .collect()
        };
        selected.sort_unstable();
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(domains: &[&str]) -> Config {
        let mut c = Config::new();
        for d in domains {
            c.add_domain(d);
        }
        c
    }

    #[test]
    fn scope_matching() {
        let c = cfg(&["example.com", "sub.example.com"]);
        assert_eq!(c.which_domain("a.example.com"), Some("example.com"));
        // Longest suffix wins for nested roots.
        assert_eq!(c.which_domain("x.sub.example.com"), Some("sub.example.com"));
        assert_eq!(c.which_domain("example.com"), Some("example.com"));
        assert_eq!(c.which_domain("example.org"), None);
        assert!(!c.is_domain_in_scope("notexample.com"));
    }

    #[test]
    fn domain_normalization() {
        let c = cfg(&[" Example.COM. ", "example.com"]);
        assert_eq!(c.domains(), &["example.com".to_string()]);
    }

    #[test]
    fn settings_validation() {
        let mut c = cfg(&["example.com"]);
        assert!(c.check_settings().is_ok());

        c.passive = true;
        c.active = true;
        assert!(c.check_settings().is_err());

        let empty = Config::new();
        assert!(empty.check_settings().is_err());

        let bad = cfg(&["no-suffix-here"]);
        assert!(bad.check_settings().is_err());
    }

    #[test]
    fn blacklist_matching() {
        let mut c = cfg(&["example.com"]);
        c.blacklist = vec!["dev.example.com".to_string()];
        assert!(c.blacklisted("dev.example.com"));
        assert!(c.blacklisted("x.dev.example.com"));
        assert!(!c.blacklisted("prod.example.com"));
    }

    #[test]
    fn source_selection_include_and_exclude() {
        let avail = ["Cert", "Archive", "Scrape"];

        let mut c = cfg(&["example.com"]);
        c.source_filter = SourceFilter {
            sources: vec!["Cert".to_string()],
            include: true,
        };
        assert_eq!(c.selected_source_names(&avail), vec!["Cert"]);

        c.source_filter.include = false;
        assert_eq!(c.selected_source_names(&avail), vec!["Archive", "Scrape"]);

        c.source_filter.sources.clear();
        assert_eq!(
            c.selected_source_names(&avail),
            vec!["Archive", "Cert", "Scrape"]
        );
    }
}
