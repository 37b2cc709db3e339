//! Request types flowing between data sources, the broker, and the pipeline.
//!
//! Three request kinds exist: discovered names (`NameRequest`), discovered
//! or synthesized addresses (`AddrRequest`), and autonomous-system lookups
//! (`AsnRequest`). Every request carries provenance: a `Tag` classifying
//! how it was discovered and the free-form name of the discovering source.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches a syntactically sound FQDN, anchored over the whole input.
pub static SUBDOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9_](?:[a-zA-Z0-9_-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z][a-zA-Z0-9-]{0,61}$")
        .expect("subdomain regex")
});

/// Provenance tag attached to every discovered name or address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    None,
    Alt,
    Guess,
    Archive,
    Api,
    Axfr,
    Brute,
    Cert,
    Dns,
    External,
    Scrape,
}

impl Tag {
    /// Trusted tags may supersede an earlier untrusted sighting of the
    /// same name.
    pub fn is_trusted(self) -> bool {
        matches!(self, Tag::Archive | Tag::Axfr | Tag::Cert | Tag::Dns)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tag::None => "none",
            Tag::Alt => "alt",
            Tag::Guess => "guess",
            Tag::Archive => "archive",
            Tag::Api => "api",
            Tag::Axfr => "axfr",
            Tag::Brute => "brute",
            Tag::Cert => "cert",
            Tag::Dns => "dns",
            Tag::External => "ext",
            Tag::Scrape => "scrape",
        };
        f.write_str(s)
    }
}

/// A DNS resource record attached to a resolved name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub rr_type: u16,
    pub name: String,
    pub data: String,
}

/// A discovered fully-qualified domain name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
    /// Effective root domain the name belongs to.
    pub domain: String,
    pub records: Vec<Record>,
    pub tag: Tag,
    pub source: String,
}

impl NameRequest {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        tag: Tag,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            records: Vec::new(),
            tag,
            source: source.into(),
        }
    }

    /// Non-empty name and root domain.
    pub fn valid(&self) -> bool {
        !self.name.is_empty() && !self.domain.is_empty()
    }

    /// Normalize the name and domain: lowercase, strip wildcard labels and
    /// surrounding dots.
    pub fn sanitize(&mut self) {
        self.name = sanitize_name(&self.name);
        self.domain = self.domain.trim().trim_matches('.').to_lowercase();
    }
}

/// A discovered or synthesized IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrRequest {
    pub address: String,
    pub in_scope: bool,
    /// Root domain of the request that led to this address.
    pub domain: String,
    pub tag: Tag,
    pub source: String,
}

impl AddrRequest {
    pub fn new(
        address: impl Into<String>,
        domain: impl Into<String>,
        tag: Tag,
        source: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            in_scope: false,
            domain: domain.into(),
            tag,
            source: source.into(),
        }
    }

    /// The address must parse as an IP.
    pub fn valid(&self) -> bool {
        !self.address.is_empty() && self.address.parse::<IpAddr>().is_ok()
    }
}

/// A request to investigate an autonomous system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnRequest {
    pub asn: i32,
}

impl AsnRequest {
    pub fn valid(&self) -> bool {
        self.asn > 0
    }
}

/// The tagged value handed between the broker, data sources, and the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Name(NameRequest),
    Addr(AddrRequest),
    Asn(AsnRequest),
}

impl Request {
    pub fn valid(&self) -> bool {
        match self {
            Request::Name(r) => r.valid(),
            Request::Addr(r) => r.valid(),
            Request::Asn(r) => r.valid(),
        }
    }
}

/// Lowercase a discovered name and strip wildcard labels plus stray dots.
pub fn sanitize_name(name: &str) -> String {
    let mut n = name.trim();
    while let Some(rest) = n.strip_prefix("*.") {
        n = rest;
    }
    n.trim_matches('.').to_lowercase()
}
