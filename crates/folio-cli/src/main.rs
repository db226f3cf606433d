//! Folio CLI - reading mode for serialized fiction sites
//!
//! Extracts chapters, classifies pages, and pages through a book from the
//! terminal.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use folio_core::host::connect;
use folio_core::{
    classify, extract, CatalogCache, ChapterList, DocumentHost, DocumentSnapshot, EngineConfig,
    ExtractionResult, QueryProgram, ReadingSession, SessionEvent, SessionHandle,
};
use std::io::{self, Read};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about = "Reading mode for serialized fiction sites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip JavaScript rendering (HTTP only)
    #[arg(long, global = true)]
    no_js: bool,

    /// Wrap body text at this column
    #[arg(short, long, global = true, default_value_t = 80)]
    width: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the chapter at a URL
    Extract {
        url: String,

        /// Output format: plain, json
        #[arg(short, long, default_value = "plain")]
        format: OutputFormat,
    },

    /// Classify the page at a URL as chapter, catalog, or indeterminate
    Classify {
        url: String,

        /// Output format: plain, json
        #[arg(short, long, default_value = "plain")]
        format: OutputFormat,
    },

    /// Read a book interactively, starting at a URL
    Read { url: String },

    /// Extract and classify HTML from stdin
    Render {
        /// Base URL for resolving relative links
        #[arg(short, long)]
        base_url: Option<String>,

        /// Output format: plain, json
        #[arg(short, long, default_value = "plain")]
        format: OutputFormat,
    },

    /// Inspect or clear the cached chapter list
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Print the cached chapter list
    Show {
        #[arg(short, long, default_value = "plain")]
        format: OutputFormat,
    },
    /// Forget the cached chapter list
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Set a value and save it
    Set { key: String, value: String },
}

#[derive(Clone, Copy, Debug, Default)]
enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" | "txt" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(tracing_subscriber::EnvFilter::new("debug"))
            .init();
    }

    let mut config = EngineConfig::load()?;
    if cli.no_js {
        config.browser.javascript = false;
    }

    match cli.command {
        Commands::Extract { url, format } => run_extract(&config, &url, format, cli.width).await,
        Commands::Classify { url, format } => run_classify(&config, &url, format).await,
        Commands::Read { url } => run_read(config, &url, cli.width).await,
        Commands::Render { base_url, format } => run_render(&config, base_url, format, cli.width),
        Commands::Catalog { action } => run_catalog(action),
        Commands::Config { action } => run_config(config, action),
    }
}

/// Load a URL once and take its snapshot
async fn snapshot_of(config: &EngineConfig, url: &str) -> Result<DocumentSnapshot> {
    let host = connect(&config.browser).await?;
    let doc = host.open(url).await?;
    let result = host.run_query(&doc, &QueryProgram::snapshot()).await;
    host.release(doc).await;
    Ok(result?)
}

async fn run_extract(config: &EngineConfig, url: &str, format: OutputFormat, width: usize) -> Result<()> {
    let snapshot = snapshot_of(config, url).await?;
    let extraction = extract(&snapshot, &config.extract);
    print_extraction(&extraction, format, width)
}

async fn run_classify(config: &EngineConfig, url: &str, format: OutputFormat) -> Result<()> {
    let snapshot = snapshot_of(config, url).await?;
    let extraction = extract(&snapshot, &config.extract);
    let result = classify(&extraction, url, &config.classify);

    match format {
        OutputFormat::Plain => {
            println!("{} (confidence {:.2})", result.page_kind, result.confidence);
            for signal in &result.signals {
                println!("  {}", signal);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "url": url,
                "title": extraction.title,
                "classification": result,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn run_render(
    config: &EngineConfig,
    base_url: Option<String>,
    format: OutputFormat,
    width: usize,
) -> Result<()> {
    let mut html = String::new();
    io::stdin().read_to_string(&mut html)?;

    let url = base_url.unwrap_or_else(|| "about:blank".to_string());
    let snapshot = DocumentSnapshot::from_html(&html, &url);
    let extraction = extract(&snapshot, &config.extract);
    let result = classify(&extraction, &url, &config.classify);

    match format {
        OutputFormat::Plain => {
            println!("[{} {:.2}]", result.page_kind, result.confidence);
            print_extraction(&extraction, format, width)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "extraction": extraction,
                "classification": result,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
    }
}

async fn run_read(config: EngineConfig, url: &str, width: usize) -> Result<()> {
    let host = connect(&config.browser).await?;
    let cache = Arc::new(CatalogCache::persistent());
    let (session, mut events) = ReadingSession::new(host, cache, config);
    let session = session.spawn();

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event, width);
        }
    });

    if let Err(e) = session.enter(url).await {
        eprintln!("{}", e);
    }
    eprintln!("n: next  p: previous  c: catalog  g <url|number>: go to  q: quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = line
            .split_once(' ')
            .map(|(c, a)| (c, a.trim()))
            .unwrap_or((line, ""));

        let outcome = match command {
            "n" | "next" => session.load_next().await,
            "p" | "prev" => session.load_prev().await,
            "c" | "catalog" => session.load_catalog().await.map(|_| ()),
            "g" | "go" if !arg.is_empty() => go_to(&session, arg).await,
            "q" | "quit" => break,
            "" => continue,
            _ => {
                eprintln!("Unknown command: {}", line);
                continue;
            }
        };
        // Failures were already reported as session events
        if let Err(e) = outcome {
            debug!("Command {:?} failed: {}", line, e);
        }
    }

    session.exit().await?;
    drop(session);
    printer.await?;
    Ok(())
}

/// `g 12` jumps to the twelfth chapter of the list, `g <url>` to any page
async fn go_to(session: &SessionHandle, target: &str) -> folio_core::Result<()> {
    if let Ok(number) = target.parse::<usize>() {
        let entry = session
            .chapter_list()
            .await?
            .and_then(|list| list.get(number.saturating_sub(1)).cloned());
        if let Some(entry) = entry {
            return session.load_chapter(&entry.url).await;
        }
    }
    session.load_chapter(target).await
}

fn run_catalog(action: CatalogAction) -> Result<()> {
    let cache = CatalogCache::persistent();
    match action {
        CatalogAction::Show { format } => match cache.get_or_load() {
            Some(list) => match format {
                OutputFormat::Plain => print_chapter_list(&list),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&*list)?),
            },
            None => println!("No cached catalog"),
        },
        CatalogAction::Clear => {
            cache.clear()?;
            println!("Catalog cleared");
        }
    }
    Ok(())
}

fn run_config(mut config: EngineConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            match EngineConfig::config_path() {
                Some(path) => println!("Saved {} = {} to {}", key, value, path.display()),
                None => bail!("No configuration directory available"),
            }
        }
    }
    Ok(())
}

fn print_extraction(extraction: &ExtractionResult, format: OutputFormat, width: usize) -> Result<()> {
    match format {
        OutputFormat::Plain => {
            println!("{}\n", extraction.title);
            print_body(&extraction.body_text, width);
            if !extraction.chapter_links.is_empty() {
                println!("\n{} chapter links", extraction.chapter_links.len());
            }
            for (label, link) in [
                ("prev", &extraction.prev_url),
                ("next", &extraction.next_url),
                ("catalog", &extraction.catalog_url),
            ] {
                if let Some(link) = link {
                    println!("{}: {}", label, link);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(extraction)?);
        }
    }
    Ok(())
}

fn print_event(event: &SessionEvent, width: usize) {
    match event {
        SessionEvent::StateChanged { active } => {
            eprintln!("[reading mode {}]", if *active { "on" } else { "off" });
        }
        SessionEvent::ChapterLoaded {
            title,
            body,
            has_next,
            has_prev,
            ..
        } => {
            println!("\n== {} ==\n", title);
            print_body(body, width);
            let mut nav = Vec::new();
            if *has_prev {
                nav.push("p: previous");
            }
            if *has_next {
                nav.push("n: next");
            }
            if !nav.is_empty() {
                eprintln!("\n[{}]", nav.join("  "));
            }
        }
        SessionEvent::ChapterLoadFailed { reason } => eprintln!("Load failed: {}", reason),
        SessionEvent::CatalogLoaded(list) | SessionEvent::CatalogPageDetected(list) => {
            print_chapter_list(list);
        }
        SessionEvent::CatalogLoadFailed { reason } => eprintln!("Catalog unavailable: {}", reason),
        SessionEvent::FallbackDisplayed { title, text } => {
            eprintln!("[no chapter found, showing page text]");
            println!("\n== {} ==\n", title);
            print_body(text, width);
        }
    }
}

fn print_body(body: &str, width: usize) {
    for paragraph in body.lines() {
        println!("{}\n", textwrap::fill(paragraph, width));
    }
}

fn print_chapter_list(list: &ChapterList) {
    println!("{} chapters from {}", list.len(), list.base_url);
    for entry in &list.entries {
        println!("{:>5}. {}", entry.index + 1, entry.title);
    }
}
