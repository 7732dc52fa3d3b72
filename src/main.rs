//! Card Scanner - read a trading card's printed identifier and look it up
//!
//! Loads a card photo, crops the identifier strip, binarizes it, runs OCR
//! and searches the card database with what was recognized.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use card_scanner::capture;
use card_scanner::config::{self, AppConfig};
use card_scanner::crop::{CropRect, FlowKind, Preset};
use card_scanner::lookup::{CardRecord, CardSearch, LookupClient};
use card_scanner::parser;
use card_scanner::session::{ScanError, ScanSession, SearchOutcome, SearchQuery};
use card_scanner::vision;

/// Card Scanner - identify trading cards from photos
#[derive(Parser, Debug)]
#[command(name = "card-scanner", version)]
#[command(about = "Recognize a card's set code and number from a photo and look the card up")]
struct Args {
    /// Configuration file (defaults to the per-user config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a card image and search for it
    Scan(ScanArgs),
    /// Search the card database directly
    Search {
        /// Identifier such as "DRI 104/182"
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        code: Option<String>,
        /// Card name prefix
        #[arg(long)]
        name: Option<String>,
    },
    /// Show what the parser finds in a piece of text
    Parse {
        /// Text as an OCR engine would return it
        text: String,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct ScanArgs {
    /// Card photo (PNG, JPEG, ...)
    image: PathBuf,

    /// Crop preset to start from
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Explicit crop rectangle in image pixels
    #[arg(long, value_name = "X,Y,W,H")]
    rect: Option<CropRect>,

    /// Capture flow (overrides the configuration)
    #[arg(long, value_enum)]
    flow: Option<FlowKind>,

    /// Search with this text instead of what was recognized
    #[arg(long)]
    text: Option<String>,

    /// Stop after recognition
    #[arg(long)]
    no_search: bool,

    /// Write the binarized crop to this PNG
    #[arg(long, value_name = "PNG")]
    save_normalized: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,card_scanner={level}")));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = config::load_or_default(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run(args.command, args.config, config))
}

async fn run(command: Command, config_path: Option<PathBuf>, config: AppConfig) -> Result<()> {
    match command {
        Command::Scan(scan_args) => scan(&config, scan_args).await,
        Command::Search { code, name } => search(&config, code, name).await,
        Command::Parse { text } => {
            parse(&text);
            Ok(())
        }
        Command::InitConfig { force } => init_config(config_path, force),
    }
}

async fn scan(config: &AppConfig, args: ScanArgs) -> Result<()> {
    let flow = args.flow.unwrap_or(config.general.flow);
    let mut session = ScanSession::new(flow.profile(), config.recognition.options());

    let image = capture::load_file(&args.image, config.capture.max_upload_width)?;
    let mut crop = session.load_image(image);
    if let Some(preset) = args.preset {
        crop = session.choose_preset(preset).map_err(with_guidance)?;
    }
    if let Some(rect) = args.rect {
        crop = session.set_crop(rect).map_err(with_guidance)?;
    }
    println!("Crop: {}", crop);

    if let Some(path) = &args.save_normalized {
        session
            .normalized_crop()
            .map_err(with_guidance)?
            .into_rgba_image()?
            .save(path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Normalized crop written to {:?}", path);
    }

    let engine = vision::create_recognizer(&config.recognition)
        .map_err(|e| with_guidance(ScanError::Recognition(e)))?;

    // Ctrl-C cancels a running recognition
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = session
        .run_recognition(engine, cancel, |p| debug!("{}: {}%", p.stage, p.percent()))
        .await;
    watcher.abort();
    let outcome = result.map_err(with_guidance)?;

    println!("Recognized: {}", outcome.cleaned);
    match &outcome.identifier {
        Some(id) => println!("Identifier: {}", id),
        None => println!("Identifier: not found"),
    }

    if let Some(text) = &args.text {
        session.set_override(text);
    }
    if args.no_search {
        return Ok(());
    }
    if !session.can_search() {
        println!("Nothing searchable was recognized; retry with --text to search manually.");
        return Ok(());
    }

    let client = LookupClient::new(&config.lookup)?;
    let outcome = session.run_search(&client).await.map_err(with_guidance)?;
    print_outcome(&outcome);
    Ok(())
}

async fn search(config: &AppConfig, code: Option<String>, name: Option<String>) -> Result<()> {
    let client = LookupClient::new(&config.lookup)?;

    let (query, cards) = match (code, name) {
        (Some(code), _) => {
            let Some(id) = parser::extract(&code) else {
                bail!("'{}' does not look like a set code and number (e.g. \"DRI 104/182\")", code);
            };
            let cards = client.search_by_code(&id.set_code, &id.number).await?;
            (SearchQuery::Code(id), cards)
        }
        (None, Some(name)) => {
            let name = name.trim().to_string();
            if name.is_empty() {
                bail!("Name must not be empty");
            }
            let cards = client.search_by_name(&name).await?;
            (SearchQuery::Name(name), cards)
        }
        (None, None) => bail!("Pass --code or --name"),
    };

    let outcome = if cards.is_empty() {
        SearchOutcome::NoMatch { query }
    } else {
        SearchOutcome::Matches { query, cards }
    };
    print_outcome(&outcome);
    Ok(())
}

fn parse(text: &str) {
    let cleaned = parser::clean(text);
    println!("Cleaned: {}", cleaned);
    match parser::extract(&cleaned) {
        Some(id) => println!("Identifier: {} (set {}, number {}, of {})", id, id.set_code, id.number, id.denom),
        None if parser::is_searchable_text(&cleaned) => println!("Identifier: not found; name search possible"),
        None => println!("Identifier: not found"),
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => config::default_config_path()?,
    };
    if path.exists() && !force {
        bail!("{:?} already exists; pass --force to overwrite", path);
    }

    config::save_config(&AppConfig::default(), &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn describe(query: &SearchQuery) -> String {
    match query {
        SearchQuery::Code(id) => format!("code {}", id),
        SearchQuery::Name(name) => format!("name \"{}\"", name),
    }
}

fn print_outcome(outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::Matches { query, cards } => {
            println!("{} match(es) for {}:", cards.len(), describe(query));
            for card in cards {
                print_card(card);
            }
        }
        SearchOutcome::NoMatch { query } => println!("No match found for {}.", describe(query)),
        SearchOutcome::NeedsInput => println!("Enter a set code and number or a name to search."),
    }
}

fn print_card(card: &CardRecord) {
    println!(
        "  {} | {} | #{} | {}",
        card.name,
        card.set_name().unwrap_or("-"),
        card.number.as_deref().unwrap_or("-"),
        card.rarity.as_deref().unwrap_or("-"),
    );
    if let Some(url) = card.image_url() {
        println!("    {}", url);
    }
}

fn with_guidance(e: ScanError) -> anyhow::Error {
    let hint = e.guidance();
    anyhow::Error::new(e).context(hint)
}
