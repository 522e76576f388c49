use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "stepwire", version, about = "Build and replay links that carry page interactions")]
struct Args {
    /// Debug-level logging (logs go to stderr)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs)]
struct PageArgs {
    /// Local HTML file to load as the page
    #[arg(long, conflicts_with = "url")]
    html: Option<PathBuf>,

    /// Page URL to fetch over HTTP
    #[arg(long)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a link (or bare query string) into its steps
    Plan {
        link: String,
        #[arg(long)]
        json: bool,
    },
    /// Build a link from a base URL and raw key=value steps, in order
    Encode {
        #[arg(long)]
        base: String,
        /// Steps as key=value (`wait=500ms`, `pressEnter=true`, `q=text`,
        /// `css:.go=click`)
        #[arg(required = true)]
        steps: Vec<String>,
    },
    /// Synthesize a stable locator for an element of a page
    Capture {
        #[command(flatten)]
        page: PageArgs,
        /// CSS selector picking the element; the first match is used
        #[arg(long)]
        pick: String,
        /// Base URL; with --value or --click, prints a ready-made link
        #[arg(long)]
        base: Option<String>,
        /// Value to inject into the captured element
        #[arg(long, conflicts_with = "click")]
        value: Option<String>,
        /// Click the captured element instead of injecting
        #[arg(long)]
        click: bool,
        #[arg(long)]
        json: bool,
    },
    /// Replay a link against a page and report every step
    Replay {
        #[command(flatten)]
        page: PageArgs,
        link: String,
        /// Refuse to replay unless the page URL is on the allowlist
        #[arg(long)]
        gated: bool,
        #[arg(long)]
        json: bool,
    },
    /// List the options of a select element
    Options {
        #[command(flatten)]
        page: PageArgs,
        /// Locator of the select (bare id or css:-prefixed selector)
        locator: String,
        #[arg(long)]
        json: bool,
    },
    /// Manage the replay allowlist
    Allow {
        #[command(subcommand)]
        action: AllowAction,
        /// Allowlist file (default: ~/.stepwire/allowlist.yaml)
        #[arg(long, global = true)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AllowAction {
    /// Add a base URL prefix
    Add { url: String },
    /// Remove an entry
    Remove { url: String },
    /// Show all entries
    List,
    /// Exit 0 if the URL is permitted, 1 otherwise
    Check { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "stepwire=debug,stepwire_engine=debug,stepwire_page=debug,stepwire_core=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Plan { link, json } => commands::plan(&link, json),
        Command::Encode { base, steps } => commands::encode(&base, &steps),
        Command::Capture {
            page,
            pick,
            base,
            value,
            click,
            json,
        } => commands::capture(page, &pick, base.as_deref(), value, click, json).await,
        Command::Replay {
            page,
            link,
            gated,
            json,
        } => commands::replay(page, &link, gated, json).await,
        Command::Options { page, locator, json } => commands::options(page, &locator, json).await,
        Command::Allow { action, file } => commands::allow(action, file).await,
    }
}
