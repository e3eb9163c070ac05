use anyhow::{bail, Result};
use bookrank::config::{IngestConfig, ProviderConfig, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_CONTENT_BASE_URL, DEFAULT_FETCH_TIMEOUT_SECS};
use bookrank::error::FetchError;
use bookrank::ingest::{IngestReport, Ingestor};
use bookrank::provider::{ContentProvider, GutenbergClient};
use bookrank::store::IndexStore;
use bookrank::BookId;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and maintain the book term index", long_about = None)]
struct Cli {
    /// Index directory
    #[arg(long, default_value = "./index", global = true)]
    index: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch books and upsert their terms
    Ingest(IngestArgs),
    /// List the terms referencing a book
    Terms {
        #[arg(long)]
        book: BookId,
    },
    /// Remove every posting of a book
    Remove {
        #[arg(long)]
        book: BookId,
    },
    /// Print term and book counts
    Stats,
}

#[derive(Args)]
struct IngestArgs {
    /// First book id of the range (inclusive)
    #[arg(long)]
    from: Option<BookId>,
    /// Last book id of the range (exclusive)
    #[arg(long)]
    to: Option<BookId>,
    /// Explicit book ids, comma separated
    #[arg(long, value_delimiter = ',')]
    ids: Vec<BookId>,
    /// Read `<id>.txt` / `pg<id>.txt` files from this directory instead of the network
    #[arg(long)]
    dir: Option<String>,
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Postings buffered before each flush
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    timeout_secs: u64,
    #[arg(long, default_value = DEFAULT_CONTENT_BASE_URL)]
    content_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let store = IndexStore::open(&cli.index)?;

    match cli.command {
        Commands::Ingest(args) => {
            let report = ingest(&store, args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Terms { book } => {
            let terms = store.terms_for_book(book)?;
            println!("{}", serde_json::to_string_pretty(&terms)?);
        }
        Commands::Remove { book } => {
            let removed = store.remove_book(book)?;
            tracing::info!(book_id = book, terms = removed, "book removed");
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
    }
    store.close()?;
    Ok(())
}

async fn ingest(store: &IndexStore, args: IngestArgs) -> Result<IngestReport> {
    let config = IngestConfig {
        concurrency: args.concurrency,
        batch_size: args.batch_size,
        fetch_timeout: Duration::from_secs(args.timeout_secs),
    };
    let mut ids = args.ids;
    if let (Some(from), Some(to)) = (args.from, args.to) {
        ids.extend(from..to);
    }

    if let Some(dir) = args.dir {
        let provider = DirectoryProvider::scan(&dir)?;
        if ids.is_empty() {
            ids = provider.ids();
        }
        tracing::info!(dir = %dir, books = ids.len(), "ingesting from directory");
        return Ok(Ingestor::new(store.clone(), Arc::new(provider), config).ingest(ids).await?);
    }

    if ids.is_empty() {
        bail!("nothing to ingest: pass --ids, --from/--to or --dir");
    }
    let provider = GutenbergClient::new(&ProviderConfig {
        content_base_url: args.content_url,
        timeout: config.fetch_timeout,
        ..ProviderConfig::default()
    })?;
    Ok(Ingestor::new(store.clone(), Arc::new(provider), config).ingest(ids).await?)
}

/// Plain-text books on disk, named `<id>.txt` or `pg<id>.txt`.
struct DirectoryProvider {
    files: BTreeMap<BookId, PathBuf>,
}

impl DirectoryProvider {
    fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            bail!("{} is not a directory", root.display());
        }
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if !p.is_file() || p.extension().and_then(|s| s.to_str()) != Some("txt") {
                continue;
            }
            let Some(stem) = p.file_stem().and_then(|s| s.to_str()) else { continue };
            if let Ok(id) = stem.trim_start_matches("pg").parse::<BookId>() {
                files.insert(id, p.to_path_buf());
            }
        }
        Ok(Self { files })
    }

    fn ids(&self) -> Vec<BookId> {
        self.files.keys().copied().collect()
    }
}

impl ContentProvider for DirectoryProvider {
    async fn fetch_content(&self, book_id: BookId) -> std::result::Result<String, FetchError> {
        let path = self.files.get(&book_id).ok_or(FetchError::NotFound(book_id))?;
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::Failed { book_id, reason: format!("{}: {e}", path.display()) })
    }
}
