use clap::Parser;

/// Command-line interface definition.
/// Provides the knobs for a single enumeration run.
///
/// Verbosity levels:
/// 0 - errors only
/// 1 - progress (default)
/// 2 - debug
/// 3 - trace
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Enumerate subdomains and addresses for a set of root domains"
)]
pub struct Cli {
    /// Root domains defining the scope (repeatable).
    #[arg(short = 'd', long = "domain", required = true, value_name = "DOMAIN")]
    pub domains: Vec<String>,

    /// Autonomous system numbers to investigate (repeatable).
    #[arg(long = "asn", value_name = "ASN")]
    pub asns: Vec<i32>,

    /// Additional names to seed the run with (repeatable).
    #[arg(long = "name", value_name = "FQDN")]
    pub names: Vec<String>,

    /// Passive mode: no DNS resolution, findings go straight to the graph.
    #[arg(long)]
    pub passive: bool,

    /// Active mode: extra probing and wider reverse sweeps.
    #[arg(long, conflicts_with = "passive")]
    pub active: bool,

    /// Subdomains to exclude from the run (repeatable).
    #[arg(long = "blacklist", value_name = "FQDN")]
    pub blacklist: Vec<String>,

    /// Only use these data sources (repeatable).
    #[arg(long = "include-source", value_name = "NAME", conflicts_with = "exclude_sources")]
    pub include_sources: Vec<String>,

    /// Use every data source except these (repeatable).
    #[arg(long = "exclude-source", value_name = "NAME")]
    pub exclude_sources: Vec<String>,

    /// Resolver queries per second.
    #[arg(long, default_value_t = 1000)]
    pub qps: usize,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value_t = 1)]
    pub verbose: u8,
}

impl Cli {
    /// Parse CLI arguments from process args.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Log filter directive for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "subsleuth=error",
            1 => "subsleuth=info",
            2 => "subsleuth=debug",
            _ => "subsleuth=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::try_parse_from(["subsleuth", "-d", "example.com"]).unwrap();
        assert_eq!(cli.domains, vec!["example.com".to_string()]);
        assert!(!cli.passive);
        assert_eq!(cli.qps, 1000);
    }

    #[test]
    fn passive_and_active_conflict() {
        assert!(Cli::try_parse_from(["subsleuth", "-d", "example.com", "--passive", "--active"])
            .is_err());
    }

    #[test]
    fn requires_a_domain() {
        assert!(Cli::try_parse_from(["subsleuth"]).is_err());
    }
}
