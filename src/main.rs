//! CLI entry point for the paper search engine.
//!
//! Provides commands for encoding the corpus, searching it, browsing topics,
//! and syncing embedding artifacts with a remote store.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use paperlens::display::{
    THEME, search_results_table, status_table, topics_table, update_summary_table, with_spinner,
};
use paperlens::io::ExitCode;
use paperlens::{
    Corpus, DirRemoteStore, EngineError, InMemoryCorpus, PaperEngine, PaperId, SearchHit,
    Settings, SyncReport,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Create custom help text with consistent styling
fn create_custom_help() -> String {
    use owo_colors::OwoColorize;
    use paperlens::display::theme::Theme;

    let mut help = String::new();

    // Quick Start section
    if Theme::should_disable_colors() {
        help.push_str("Quick Start:\n");
    } else {
        help.push_str(&format!("{}\n", "Quick Start:".cyan().bold()));
    }
    help.push_str("  $ paperlens init                        # Initialize in current directory\n");
    help.push_str("  $ paperlens update                      # Encode new and changed papers\n");
    help.push_str("  $ paperlens search \"viral transmission\" # Search the corpus\n");
    help.push_str("  $ paperlens recluster                   # Rebuild the topic partition\n\n");

    // About section
    help.push_str("Embed an academic paper corpus and query it by meaning, title, author, or DOI.\n\n");

    // Usage
    if Theme::should_disable_colors() {
        help.push_str("Usage:");
    } else {
        help.push_str(&format!("{}", "Usage:".cyan().bold()));
    }
    help.push_str(" paperlens [OPTIONS] <COMMAND>\n\n");

    // Commands
    if Theme::should_disable_colors() {
        help.push_str("Commands:\n");
    } else {
        help.push_str(&format!("{}\n", "Commands:".cyan().bold()));
    }
    help.push_str("  init       Set up the .paperlens workspace\n");
    help.push_str("  update     Encode new and changed papers\n");
    help.push_str("  search     Search by meaning, title, author, or DOI\n");
    help.push_str("  similar    Find papers similar to a given paper\n");
    help.push_str("  recluster  Rebuild the topic partition from scratch\n");
    help.push_str("  assign     Place newly embedded papers into existing topics\n");
    help.push_str("  topics     List topics with names and keywords\n");
    help.push_str("  status     Show engine, encoder, and artifact state\n");
    help.push_str("  config     Display active settings\n");
    help.push_str("  push       Upload artifacts to a remote store\n");
    help.push_str("  pull       Download newer artifacts from a remote store\n");
    help.push_str("  help       Print this message or the help of the given subcommand(s)\n\n");

    help.push_str("See 'paperlens help <command>' for more information on a specific command.\n\n");

    // Options
    if Theme::should_disable_colors() {
        help.push_str("Options:\n");
    } else {
        help.push_str(&format!("{}\n", "Options:".cyan().bold()));
    }
    help.push_str("  -c, --config <CONFIG>  Path to custom settings.toml file\n");
    help.push_str("      --corpus <CORPUS>  Corpus snapshot to load [default: corpus.json]\n");
    help.push_str("  -v, --verbose...       Increase log verbosity (-v info, -vv debug, -vvv trace)\n");
    help.push_str("  -h, --help             Print help\n");
    help.push_str("  -V, --version          Print version\n\n");

    // Learn More
    if Theme::should_disable_colors() {
        help.push_str("Learn More:\n");
    } else {
        help.push_str(&format!("{}\n", "Learn More:".cyan().bold()));
    }
    help.push_str("  GitHub: https://github.com/jhertel/paperlens");

    help
}

/// Paper search engine
#[derive(Parser)]
#[command(
    name = "paperlens",
    version = env!("CARGO_PKG_VERSION"),
    about = "Paper search engine",
    long_about = "Embed an academic paper corpus and query it by meaning, title, author, or DOI.",
    next_line_help = true,
    styles = clap_cargo_style(),
    override_help = create_custom_help()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Corpus snapshot to load (JSON)
    #[arg(long, global = true, default_value = "corpus.json")]
    corpus: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize workspace
    #[command(about = "Set up .paperlens directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Encode new and changed papers
    #[command(
        about = "Bring the embedding artifact in line with the corpus",
        after_help = "Examples:\n  paperlens update\n  paperlens update --force    # re-encode every paper"
    )]
    Update {
        /// Re-encode every paper even when unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Search the corpus
    #[command(
        about = "Search by meaning, title, author, or DOI",
        after_help = "Examples:\n  paperlens search \"antiviral drug screening\"\n  paperlens search \"Drosten\"\n  paperlens search 10.1101/2020.03.02.972935"
    )]
    Search {
        /// Query text
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Find similar papers
    #[command(
        about = "List papers most similar to a given paper",
        after_help = "Examples:\n  paperlens similar 42\n  paperlens similar 42 --top 5"
    )]
    Similar {
        /// Paper ID
        paper_id: u32,

        /// Number of similar papers to return
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Rebuild the topic partition
    #[command(
        about = "Cluster the corpus into topics from scratch",
        after_help = "Examples:\n  paperlens recluster             # configured cluster count\n  paperlens recluster -k 30\n  paperlens recluster --coarse    # coarse cluster count"
    )]
    Recluster {
        /// Number of clusters (defaults to topics.cluster_count)
        #[arg(short = 'k', long)]
        clusters: Option<usize>,

        /// Use the coarse cluster count instead
        #[arg(long, conflicts_with = "clusters")]
        coarse: bool,
    },

    /// Assign new papers to topics
    #[command(about = "Place newly embedded papers into existing topics")]
    Assign,

    /// List topics
    #[command(about = "List topics with their names and keywords")]
    Topics,

    /// Show engine status
    #[command(about = "Show encoder readiness, paper counts, and artifact state")]
    Status,

    /// Show current configuration settings
    #[command(about = "Display active settings from .paperlens/settings.toml")]
    Config,

    /// Upload artifacts to a remote store
    #[command(
        about = "Upload artifacts that are newer than the remote's copies",
        after_help = "Examples:\n  paperlens push /mnt/shared/paperlens\n  paperlens push    # use remote.path from settings.toml"
    )]
    Push {
        /// Remote store directory (defaults to remote.path)
        remote: Option<PathBuf>,
    },

    /// Download artifacts from a remote store
    #[command(
        about = "Download artifacts that are newer than the local copies",
        after_help = "Examples:\n  paperlens pull /mnt/shared/paperlens\n  paperlens pull    # use remote.path from settings.toml"
    )]
    Pull {
        /// Remote store directory (defaults to remote.path)
        remote: Option<PathBuf>,
    },
}

/// Route tracing output to stderr, honoring `PL_LOG` over the `-v` flags.
fn setup_logging(verbose: u8) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_env("PL_LOG").unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();
}

/// Print an error and any recovery suggestions, returning its exit code.
fn report_error(e: &EngineError) -> ExitCode {
    eprintln!("{}", THEME.error_with_icon(&e.to_string()));

    let suggestions = e.recovery_suggestions();
    if !suggestions.is_empty() {
        eprintln!("\nSuggestions:");
        for suggestion in suggestions {
            eprintln!("  • {suggestion}");
        }
    }

    ExitCode::from_error(e)
}

/// Render hits as a table, resolving titles and DOIs from the corpus.
fn print_hits(corpus: &InMemoryCorpus, hits: &[SearchHit]) {
    let rows: Vec<(PaperId, f32, String, String)> = hits
        .iter()
        .map(|hit| {
            let (title, doi) = corpus
                .paper(hit.paper_id)
                .map(|paper| (paper.title, paper.doi))
                .unwrap_or_else(|| ("<not in corpus>".to_string(), String::new()));
            (hit.paper_id, hit.score, title, doi)
        })
        .collect();
    println!("{}", search_results_table(&rows));
}

/// Resolve the remote store directory from the CLI argument or `remote.path`.
fn remote_store(
    engine: &PaperEngine,
    cli_path: Option<PathBuf>,
) -> Result<DirRemoteStore, ExitCode> {
    match cli_path.or_else(|| engine.settings().remote.path.clone()) {
        Some(path) => Ok(DirRemoteStore::new(engine.settings().resolve_path(&path))),
        None => {
            eprintln!("Error: no remote store configured");
            eprintln!("Pass a directory argument or set remote.path in settings.toml");
            Err(ExitCode::RemoteError)
        }
    }
}

fn print_sync_report(verb: &str, report: &SyncReport) {
    if report.is_noop() {
        println!(
            "{}",
            THEME.muted("Nothing to transfer, local and remote are in sync")
        );
    } else {
        let kinds: Vec<String> = report
            .transferred
            .iter()
            .map(|kind| kind.to_string())
            .collect();
        println!(
            "{}",
            THEME.success_with_icon(&format!("{verb} {}", kinds.join(", ")))
        );
    }
    for kind in &report.skipped {
        println!(
            "  {}",
            THEME.apply(&THEME.info, format!("{kind}: already current"))
        );
    }
    for kind in &report.missing {
        println!("  {}", THEME.muted(&format!("{kind}: no artifact on the source side")));
    }
}

/// Entry point.
///
/// Handles config initialization and command dispatch. Auto-initializes
/// config for the update command. Exits with a semantic exit code.
fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    // For update, auto-initialize if needed
    if matches!(cli.command, Commands::Update { .. }) {
        if Settings::check_init().is_err() {
            eprintln!("Initializing workspace configuration...");
            match Settings::init_config_file(false) {
                Ok(path) => {
                    eprintln!("Created configuration file at: {}", path.display());
                }
                Err(e) => {
                    eprintln!("Warning: Could not create config file: {e}");
                    eprintln!("Using default configuration.");
                }
            }
        }
    } else if !matches!(cli.command, Commands::Init { .. }) {
        // For other commands, just warn
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).unwrap_or_else(|e| {
            eprintln!(
                "Configuration error loading from {}: {}",
                config_path.display(),
                e
            );
            process::exit(ExitCode::ConfigError as i32);
        })
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })
    };

    match &cli.command {
        Commands::Init { force } => {
            let config_path = PathBuf::from(".paperlens/settings.toml");

            if config_path.exists() && !force {
                eprintln!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                eprintln!("Use --force to overwrite");
                process::exit(ExitCode::ConfigError as i32);
            }

            match Settings::init_config_file(*force) {
                Ok(path) => {
                    println!("Created configuration file at: {}", path.display());
                    println!("Edit this file to customize your settings.");
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(ExitCode::ConfigError as i32);
                }
            }
            return;
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            match toml::to_string_pretty(&config) {
                Ok(toml_str) => println!("{toml_str}"),
                Err(e) => eprintln!("Error displaying config: {e}"),
            }
            return;
        }

        _ => {}
    }

    // Everything below needs the corpus and a running engine
    let corpus_path = config.resolve_path(&cli.corpus);
    let corpus = match InMemoryCorpus::load_json(&corpus_path) {
        Ok(corpus) => Arc::new(corpus),
        Err(e) => {
            eprintln!("Error loading corpus from {}: {e}", corpus_path.display());
            process::exit(ExitCode::from_error(&e) as i32);
        }
    };

    let engine = match PaperEngine::open(config, corpus.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            process::exit(report_error(&e) as i32);
        }
    };

    let exit_code = match cli.command {
        Commands::Init { .. } | Commands::Config => {
            // Already handled above
            unreachable!()
        }

        Commands::Update { force } => {
            match with_spinner("Encoding papers...", || engine.update(force)) {
                Ok(stats) => {
                    println!("{}", update_summary_table(&stats));
                    for (id, reason) in &stats.failures {
                        eprintln!("  paper {id}: {reason}");
                    }
                    if stats.failed > 0 {
                        println!(
                            "{}",
                            THEME.warning_with_icon(&format!(
                                "{} of {} papers failed to encode",
                                stats.failed, stats.total_papers
                            ))
                        );
                    } else {
                        println!(
                            "{}",
                            THEME.success_with_icon(&format!(
                                "Artifact is current ({} papers)",
                                stats.total_papers
                            ))
                        );
                    }
                    ExitCode::Success
                }
                Err(e) => report_error(&e),
            }
        }

        Commands::Search { query, limit } => match engine.search(&query) {
            Ok(hits) => {
                let hits: Vec<SearchHit> = hits.into_iter().take(limit).collect();
                if hits.is_empty() {
                    println!("{}", THEME.muted(&format!("No papers matched '{query}'")));
                } else {
                    print_hits(&corpus, &hits);
                }
                ExitCode::from_search_results(&hits)
            }
            Err(e) => report_error(&e),
        },

        Commands::Similar { paper_id, top } => match PaperId::new(paper_id) {
            Some(id) => match engine.similar(id, top) {
                Ok(hits) => {
                    if hits.is_empty() {
                        println!(
                            "{}",
                            THEME.muted(&format!("No similar papers found for paper {id}"))
                        );
                    } else {
                        print_hits(&corpus, &hits);
                    }
                    ExitCode::from_search_results(&hits)
                }
                Err(e) => report_error(&e),
            },
            None => {
                eprintln!("Error: paper IDs start at 1");
                ExitCode::GeneralError
            }
        },

        Commands::Recluster { clusters, coarse } => {
            let k = if coarse {
                Some(engine.settings().topics.coarse_cluster_count)
            } else {
                clusters
            };
            match with_spinner("Clustering papers...", || engine.recluster(k)) {
                Ok(stats) => {
                    println!(
                        "{}",
                        THEME.success_with_icon(&format!(
                            "Clustered {} papers into {} topics in {} iterations",
                            stats.papers, stats.topics, stats.iterations
                        ))
                    );
                    if stats.carried_names > 0 {
                        println!("  {} topic names carried over", stats.carried_names);
                    }
                    ExitCode::Success
                }
                Err(e) => report_error(&e),
            }
        }

        Commands::Assign => match engine.assign_new() {
            Ok(stats) => {
                println!(
                    "{}",
                    THEME.success_with_icon(&format!(
                        "Assigned {} papers to existing topics ({} left unassigned)",
                        stats.assigned, stats.unassigned
                    ))
                );
                ExitCode::Success
            }
            Err(e) => report_error(&e),
        },

        Commands::Topics => {
            let topics = engine.topics();
            if topics.is_empty() {
                println!(
                    "{}",
                    THEME.muted("No topics yet. Run 'paperlens recluster' first.")
                );
            } else {
                println!("{}", topics_table(&topics));
            }
            ExitCode::from_search_results(&topics)
        }

        Commands::Status => match engine.status() {
            Ok(status) => {
                println!("{}", status_table(&status));
                ExitCode::Success
            }
            Err(e) => report_error(&e),
        },

        Commands::Push { remote } => match remote_store(&engine, remote) {
            Ok(store) => match with_spinner("Uploading artifacts...", || engine.push(&store)) {
                Ok(report) => {
                    print_sync_report("Pushed", &report);
                    ExitCode::Success
                }
                Err(e) => report_error(&e),
            },
            Err(code) => code,
        },

        Commands::Pull { remote } => match remote_store(&engine, remote) {
            Ok(store) => match with_spinner("Downloading artifacts...", || engine.pull(&store)) {
                Ok(report) => {
                    print_sync_report("Pulled", &report);
                    ExitCode::Success
                }
                Err(e) => report_error(&e),
            },
            Err(code) => code,
        },
    };

    process::exit(exit_code as i32);
}
