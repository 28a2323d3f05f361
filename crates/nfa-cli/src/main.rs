mod interpreter;
mod report;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use nfa_core::{AnalyzerConfig, ConfigLoader, ParseResult, Query, QueryParams};
use nfa_eval::RuleEvaluator;
use nfa_parser::Format;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nfa")]
#[command(version, about = "Analyze nftables rulesets and evaluate traffic queries", long_about = None)]
struct Cli {
    /// Config file (default: ./nfa.yaml, then /etc/nfa/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging and evaluation trace
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Input {
    /// Ruleset from `nft list ruleset` or `nft -j list ruleset`
    file: PathBuf,
    /// Input format; detected from the file extension when omitted
    #[arg(short, long)]
    format: Option<Format>,
    /// Print JSON instead of a report
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Free-text query, e.g. "from 192.168.1.10 to 10.0.0.5 port 80 tcp"
    query: Option<String>,
    #[arg(long)]
    src: Option<String>,
    #[arg(long)]
    dst: Option<String>,
    #[arg(long)]
    sport: Option<i64>,
    #[arg(long)]
    dport: Option<i64>,
    /// tcp, udp, icmp or any
    #[arg(long)]
    proto: Option<String>,
    /// in, out or forward
    #[arg(long)]
    direction: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tables, chains and sets with summary statistics
    Parse {
        #[command(flatten)]
        input: Input,
    },
    /// List parsed rules
    ListRules {
        #[command(flatten)]
        input: Input,
        /// Only rules in this chain
        #[arg(short, long)]
        chain: Option<String>,
    },
    /// Evaluate a traffic query against a ruleset
    Query {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        args: QueryArgs,
    },
    /// Find rules shadowed by an earlier rule
    CheckRedundant {
        #[command(flatten)]
        input: Input,
    },
    /// Show the free-text query syntax
    QueryHelp,
}

impl QueryArgs {
    /// Free text first, then explicit flags on top.
    fn into_query(self) -> Result<Query> {
        let mut params = match &self.query {
            Some(text) => interpreter::extract(text)?,
            None => QueryParams::default(),
        };

        if self.src.is_some() {
            params.src_ip = self.src;
        }
        if self.dst.is_some() {
            params.dst_ip = self.dst;
        }
        if self.sport.is_some() {
            params.src_port = self.sport;
        }
        if self.dport.is_some() {
            params.dst_port = self.dport;
        }
        if self.proto.is_some() {
            params.protocol = self.proto;
        }
        if self.direction.is_some() {
            params.direction = self.direction;
        }

        Query::try_from(params).context("Invalid query")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let show_trace = cli.verbose || config.evaluation.show_trace;

    match cli.command {
        Commands::Parse { input } => handle_parse(&input, &config)?,
        Commands::ListRules { input, chain } => handle_list_rules(&input, chain.as_deref(), &config)?,
        Commands::Query { input, args } => handle_query(&input, args, show_trace, &config)?,
        Commands::CheckRedundant { input } => handle_check_redundant(&input, &config)?,
        Commands::QueryHelp => println!("{}", interpreter::help_text()),
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AnalyzerConfig> {
    let loader = ConfigLoader::new();
    match path {
        Some(path) => loader
            .load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(loader.load_default()),
    }
}

/// `--format`, then `default_format` from config, then the file extension.
fn resolve_format(input: &Input, config: &AnalyzerConfig) -> Result<Option<Format>> {
    if input.format.is_some() {
        return Ok(input.format);
    }
    config
        .default_format
        .as_deref()
        .map(str::parse::<Format>)
        .transpose()
        .context("Invalid default_format in config")
}

fn load_ruleset(input: &Input, config: &AnalyzerConfig) -> Result<ParseResult> {
    let format = resolve_format(input, config)?;
    let result = nfa_parser::parse_file(&input.file, format)
        .with_context(|| format!("Failed to parse {}", input.file.display()))?;

    if result.is_empty() {
        bail!("No valid rules found in {}", input.file.display());
    }

    tracing::info!(
        "Loaded {} rules from {} ({} skipped)",
        result.rule_count(),
        input.file.display(),
        result.warnings.len()
    );
    Ok(result)
}

fn handle_parse(input: &Input, config: &AnalyzerConfig) -> Result<()> {
    let result = load_ruleset(input, config)?;

    if input.json {
        return report::print_parse_json(&result);
    }

    report::print_hierarchy(&result);
    report::print_summary(&result.summary());
    report::print_warnings(&result.warnings);
    Ok(())
}

fn handle_list_rules(input: &Input, chain: Option<&str>, config: &AnalyzerConfig) -> Result<()> {
    let result = load_ruleset(input, config)?;
    let mut rules = result.get_all_rules();

    let title = match chain {
        Some(chain) => {
            rules.retain(|r| r.chain().eq_ignore_ascii_case(chain));
            format!("Rules in chain {}", chain)
        }
        None => "All rules".to_string(),
    };

    if input.json {
        return report::print_json(&rules);
    }

    report::print_rules(&rules, &title);
    report::print_warnings(&result.warnings);
    Ok(())
}

fn handle_query(input: &Input, args: QueryArgs, show_trace: bool, config: &AnalyzerConfig) -> Result<()> {
    let query = args.into_query()?;
    let result = load_ruleset(input, config)?;

    let evaluator = RuleEvaluator::from_parse_result(&result);
    let evaluation = evaluator.evaluate(&query);

    if input.json {
        return report::print_json(&evaluation);
    }

    println!("📂 Loaded {} rules from {}", evaluator.rules().len(), input.file.display());
    println!("🔎 Query: {}", query);
    report::print_evaluation(&evaluation, show_trace);
    Ok(())
}

fn handle_check_redundant(input: &Input, config: &AnalyzerConfig) -> Result<()> {
    let result = load_ruleset(input, config)?;
    let evaluator = RuleEvaluator::from_parse_result(&result);

    let total = evaluator.rules().len();
    let limit = config.redundancy.max_rules;
    if total > limit {
        bail!(
            "Ruleset has {} rules; redundancy analysis is limited to {} (redundancy.max_rules)",
            total,
            limit
        );
    }

    let pairs = evaluator.find_redundant_rules();

    if input.json {
        return report::print_json(&pairs);
    }

    println!("🔍 Analyzed {} rules for redundancy\n", total);
    report::print_redundant(&pairs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use nfa_core::{Direction, QueryProtocol};

    fn query_args(argv: &[&str]) -> QueryArgs {
        let cli = Cli::try_parse_from(argv.iter().copied()).unwrap();
        match cli.command {
            Commands::Query { args, .. } => args,
            _ => panic!("expected query subcommand"),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_free_text() {
        let query = query_args(&["nfa", "query", "rules.nft", "from 10.0.0.1 port 80 tcp", "--dport", "443"])
            .into_query()
            .unwrap();
        assert_eq!(query.src_ip(), Some("10.0.0.1"));
        assert_eq!(query.dst_port(), Some(443));
        assert_eq!(query.protocol(), Some(QueryProtocol::Tcp));
    }

    #[test]
    fn test_flags_only() {
        let query = query_args(&[
            "nfa", "query", "rules.nft", "--dst", "10.0.0.5", "--proto", "udp", "--direction", "out",
        ])
        .into_query()
        .unwrap();
        assert_eq!(query.dst_ip(), Some("10.0.0.5"));
        assert_eq!(query.protocol(), Some(QueryProtocol::Udp));
        assert_eq!(query.direction(), Direction::Out);
    }

    #[test]
    fn test_invalid_query_flags() {
        assert!(query_args(&["nfa", "query", "rules.nft", "--dport", "70000"]).into_query().is_err());
        assert!(query_args(&["nfa", "query", "rules.nft", "--proto", "sctp"]).into_query().is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["nfa", "parse", "rules.json", "-v", "--config", "nfa.yaml", "--json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("nfa.yaml")));
        assert!(matches!(cli.command, Commands::Parse { ref input } if input.json));
    }

    #[test]
    fn test_format_resolution() {
        let input = Input {
            file: PathBuf::from("rules.json"),
            format: None,
            json: false,
        };
        let mut config = AnalyzerConfig::default();
        assert_eq!(resolve_format(&input, &config).unwrap(), None);

        config.default_format = Some("text".to_string());
        assert_eq!(resolve_format(&input, &config).unwrap(), Some(Format::Text));

        let explicit = Input {
            format: Some(Format::Json),
            ..input
        };
        assert_eq!(resolve_format(&explicit, &config).unwrap(), Some(Format::Json));

        config.default_format = Some("yaml".to_string());
        assert!(resolve_format(&Input { format: None, ..explicit }, &config).is_err());
    }

    #[test]
    fn test_empty_ruleset_is_an_error() {
        let path = std::env::temp_dir().join(format!("nfa-cli-{}-empty.nft", std::process::id()));
        std::fs::write(&path, "# nothing here\n").unwrap();

        let input = Input {
            file: path.clone(),
            format: None,
            json: false,
        };
        let err = load_ruleset(&input, &AnalyzerConfig::default()).unwrap_err();
        assert!(err.to_string().starts_with("No valid rules found"));

        std::fs::remove_file(path).ok();
    }
}
