use anyhow::{Context, Result};
use author_resolver::config::{find_config_file, load_config, save_config, ResolverConfig, CONFIG_FILE_NAME};
use author_resolver::models::{CandidatePair, RunReport};
use author_resolver::resolve::{Canonical, ResolutionPlan, Resolver};
use author_resolver::store::InMemoryStore;
use author_resolver::ui::{self, Status};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use comfy_table::{Attribute, Cell, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Author Resolver - merge duplicate author records into canonical master authors
#[derive(Parser, Debug)]
#[command(name = "author-resolver")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(about = "Merge duplicate author records from bibliographic sources into master authors", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
}

impl OutputFormat {
    fn resolve(self) -> OutputFormat {
        match self {
            OutputFormat::Auto if ui::is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve all unresolved records in a snapshot
    #[command(alias = "r")]
    Resolve {
        /// JSON snapshot with records, authorships and masters
        #[arg(long, short)]
        snapshot: PathBuf,

        /// Save the resolved state back to the snapshot
        #[arg(long)]
        write: bool,

        /// Write every scored candidate pair to this file
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// Show the clusters a resolve would commit, without writing
    #[command(alias = "p")]
    Plan {
        /// JSON snapshot with records, authorships and masters
        #[arg(long, short)]
        snapshot: PathBuf,
    },

    /// Show the similarity vector for one pair of records
    Score {
        /// JSON snapshot with records, authorships and masters
        #[arg(long, short)]
        snapshot: PathBuf,

        /// First record id
        a: String,

        /// Second record id
        b: String,
    },

    /// Write the default configuration file
    InitConfig {
        /// Destination (default: ./author-resolver.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing(cli: &Cli, config: &ResolverConfig) {
    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("author_resolver={}", level)),
    );

    let json = config.logging.format.as_deref() == Some("json");
    let plain_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .init();
}

fn load_resolver_config(cli: &Cli) -> Result<(ResolverConfig, Option<PathBuf>)> {
    let path = cli.config.clone().or_else(find_config_file);
    match path {
        Some(path) => {
            let config = load_config(&path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            Ok((config, Some(path)))
        }
        None => Ok((ResolverConfig::default(), None)),
    }
}

fn open_snapshot(path: &Path) -> Result<Arc<InMemoryStore>> {
    let store = InMemoryStore::load_snapshot(path)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, config_path) = load_resolver_config(&cli)?;
    init_tracing(&cli, &config);

    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    let format = cli.output.resolve();

    match cli.command {
        Commands::Resolve {
            snapshot,
            write,
            audit,
        } => {
            if audit.is_some() {
                config.runtime.record_audit = true;
            }
            let store = open_snapshot(&snapshot)?;
            let resolver = Resolver::new(config, store.clone())?;
            let mut report = resolver.run().await?;

            if let Some(audit_path) = audit {
                let pairs = report.audit.take().unwrap_or_default();
                std::fs::write(&audit_path, serde_json::to_string_pretty(&pairs)?)
                    .with_context(|| format!("writing audit to {}", audit_path.display()))?;
                tracing::info!("Wrote {} candidate pairs to {}", pairs.len(), audit_path.display());
            }

            if write {
                store
                    .save_snapshot(&snapshot)
                    .with_context(|| format!("saving snapshot {}", snapshot.display()))?;
                tracing::info!("Saved resolved snapshot to {}", snapshot.display());
            }

            output_report(&report, format, cli.quiet)?;
            if report.has_failures() {
                std::process::exit(2);
            }
        }

        Commands::Plan { snapshot } => {
            let store = open_snapshot(&snapshot)?;
            let resolver = Resolver::new(config, store)?;
            let plan = resolver.plan().await?;
            output_plan(&plan, format)?;
        }

        Commands::Score { snapshot, a, b } => {
            let store = open_snapshot(&snapshot)?;
            let resolver = Resolver::new(config, store)?;
            let pair = resolver.score_pair(&a, &b).await?;
            output_pair(&pair, format)?;
        }

        Commands::InitConfig { path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                );
            }
            save_config(&ResolverConfig::default(), &path)?;
            if !cli.quiet {
                ui::print_status(
                    Status::Success,
                    &format!("Wrote default configuration to {}", path.display()),
                );
            }
        }

        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "author-resolver", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn output_report(report: &RunReport, format: OutputFormat, quiet: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        _ => {
            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.set_header(vec!["Metric", "Value"]);

            let rows = [
                ("Records considered", report.records_considered),
                ("Records without a name", report.records_without_name),
                ("Records without a block key", report.records_unblocked),
                ("Records deferred (skipped blocks)", report.records_deferred),
                ("Blocks formed", report.blocks_formed),
                ("Blocks skipped", report.blocks_skipped.len()),
                ("Pairs scored", report.pairs_scored),
                ("Pairs accepted", report.pairs_accepted),
                ("Clusters formed", report.clusters_formed),
                ("Masters created", report.masters_created),
                ("Masters merged into existing", report.masters_merged),
                ("Records linked", report.records_linked),
                ("Identifier conflicts", report.identifier_conflicts.len()),
                ("Clusters held for review", report.held_for_review.len()),
                ("Cluster failures", report.failures.len()),
            ];
            for (label, value) in rows {
                table.add_row(vec![Cell::new(label), Cell::new(ui::format_number(value))]);
            }
            println!("{table}");

            if !quiet {
                ui::print_report_notes(report);
            }
        }
    }
    Ok(())
}

fn output_plan(plan: &ResolutionPlan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let clusters: Vec<serde_json::Value> = plan
                .canonical
                .iter()
                .map(|decision| match decision {
                    Canonical::Commit { plan, conflict } => serde_json::json!({
                        "action": "commit",
                        "plan": plan,
                        "conflict": conflict,
                    }),
                    Canonical::Hold(conflict) => serde_json::json!({
                        "action": "hold",
                        "conflict": conflict,
                    }),
                })
                .collect();
            let out = serde_json::json!({ "clusters": clusters, "report": plan.report });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.set_header(vec!["Lead", "Members", "Canonical name", "Identifier", "Action"]);

            for (cluster, decision) in plan.clusters.iter().zip(&plan.canonical) {
                let (name, identifier, action) = match decision {
                    Canonical::Commit { plan, conflict } => (
                        plan.canonical_name.clone(),
                        plan.external_identifier.clone().unwrap_or_default(),
                        if conflict.is_some() { "commit (conflict)" } else { "commit" },
                    ),
                    Canonical::Hold(conflict) => {
                        (String::new(), conflict.identifiers.join(", "), "hold")
                    }
                };
                table.add_row(vec![
                    Cell::new(cluster.lead()).add_attribute(Attribute::Bold),
                    Cell::new(ui::truncate_with_ellipsis(&cluster.members.join(", "), 40)),
                    Cell::new(name),
                    Cell::new(identifier),
                    Cell::new(action),
                ]);
            }
            println!("{table}");
            ui::print_status(
                Status::Info,
                &format!(
                    "{} clusters from {} records, {} pairs accepted of {} scored",
                    ui::format_number(plan.report.clusters_formed),
                    ui::format_number(plan.report.records_considered),
                    ui::format_number(plan.report.pairs_accepted),
                    ui::format_number(plan.report.pairs_scored)
                ),
            );
        }
    }
    Ok(())
}

fn output_pair(pair: &CandidatePair, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(pair)?);
        }
        _ => {
            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.set_header(vec!["Signal", "Similarity", "Confidence", "Weight"]);
            for signal in &pair.vector.signals {
                table.add_row(vec![
                    Cell::new(signal.kind.to_string()),
                    Cell::new(ui::format_score(signal.similarity)),
                    Cell::new(ui::format_score(signal.confidence)),
                    Cell::new(ui::format_score(signal.weight)),
                ]);
            }
            println!("{table}");

            let status = if pair.decision.is_match() {
                Status::Success
            } else {
                Status::Pending
            };
            ui::print_status(
                status,
                &format!(
                    "{} vs {}: score {} ({})",
                    pair.pair.a,
                    pair.pair.b,
                    ui::format_score(pair.score),
                    if pair.decision.is_match() { "match" } else { "no match" }
                ),
            );
        }
    }
    Ok(())
}
