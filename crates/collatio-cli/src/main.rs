//! Collatio CLI
//!
//! Command-line interface for:
//! - Importing batches of external records into a corpus snapshot
//! - Rendering witnesses with their collated readings
//! - Looking up sentences and searching paragraphs
//! - Marking readings attested by a single member
//! - Listing texts and region histograms

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::Level;

use collatio_collate::{
    grouping_witnesses, list_texts, mark_unique_readings, render_with_readings, search_paragraphs,
    sentence_histogram, sentences_across, work_region_readings, RegexSentenceLocator,
};
use collatio_ingest::{delete_all, import_batch, Batch};
use collatio_markup::RegionKind;
use collatio_storage::{Corpus, CorpusConfig, CorpusStore, LocalId, Store, StoreError};

#[derive(Parser)]
#[command(name = "collatio")]
#[command(author, version, about = "Collatio: critical-edition corpus and collation")]
struct Cli {
    /// Corpus configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot file, overriding `store_path` from the configuration.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a batch of external records (JSON with a `results` array).
    ///
    /// Records are upserted by external id; entities missing from the batch
    /// are deleted afterwards.
    Import {
        /// Batch file
        file: PathBuf,
    },

    /// Delete every entity of the corpus.
    Delete,

    /// Print a witness's markup with collated readings after each region.
    Render {
        /// Witness slug or local id
        witness: String,
        /// Content kind (defaults to the configured one)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Print sentence N of one or more witnesses (comma-separated).
    Sentence {
        /// Witness slugs or local ids, comma-separated
        witnesses: String,
        n: u32,
        #[arg(long)]
        kind: Option<String>,
    },

    /// Print the paragraphs of a witness containing a word starting with QUERY.
    Search {
        witness: String,
        query: String,
        #[arg(long)]
        kind: Option<String>,
    },

    /// Set `data-copies="1"` on readings attested by a single member.
    MarkUnique,

    /// List witnesses as JSON, optionally restricted to one group.
    Texts {
        /// Group slug or local id
        #[arg(long)]
        group: Option<String>,
    },

    /// Regions per sentence of a witness.
    Histogram {
        witness: String,
        #[arg(long, default_value = "version")]
        region_kind: RegionKind,
        #[arg(long)]
        kind: Option<String>,
    },

    /// Work-region readings of manuscripts against a reference witness (JSON).
    Variants {
        /// Manuscript slugs or local ids, comma-separated
        manuscripts: String,
        /// Siglum of the reference witness
        #[arg(long, default_value = "HM1")]
        reference: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = match &cli.config {
        Some(path) => CorpusConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CorpusConfig::default(),
    };
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    let store = CorpusStore::open(&config.store_path)
        .with_context(|| format!("failed to open corpus {}", config.store_path.display()))?;

    match cli.command {
        Commands::Import { file } => cmd_import(&store, &config, &file),
        Commands::Delete => cmd_delete(&store),
        Commands::Render { witness, kind } => cmd_render(&store, &config, &witness, kind),
        Commands::Sentence {
            witnesses,
            n,
            kind,
        } => cmd_sentence(&store, &config, &witnesses, n, kind),
        Commands::Search {
            witness,
            query,
            kind,
        } => cmd_search(&store, &config, &witness, &query, kind),
        Commands::MarkUnique => cmd_mark_unique(&store, &config),
        Commands::Texts { group } => cmd_texts(&store, &config, group.as_deref()),
        Commands::Histogram {
            witness,
            region_kind,
            kind,
        } => cmd_histogram(&store, &config, &witness, region_kind, kind),
        Commands::Variants {
            manuscripts,
            reference,
        } => cmd_variants(&store, &config, &manuscripts, &reference),
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Looks a witness up by slug, falling back to a local id.
fn resolve_witness(corpus: &Corpus, key: &str) -> Result<LocalId> {
    if let Some(witness) = corpus.witness_by_slug(key) {
        return Ok(witness.id);
    }
    key.parse::<LocalId>()
        .ok()
        .and_then(|id| corpus.witness(id))
        .map(|w| w.id)
        .ok_or_else(|| anyhow!("no witness '{key}'"))
}

fn resolve_list(corpus: &Corpus, keys: &str) -> Result<Vec<LocalId>> {
    keys.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| resolve_witness(corpus, key))
        .collect()
}

fn content_kind<'a>(config: &'a CorpusConfig, kind: &'a Option<String>) -> &'a str {
    kind.as_deref().unwrap_or(&config.default_content_kind)
}

/// Markup of `witness`'s content of `kind`.
fn witness_markup(
    corpus: &Corpus,
    config: &CorpusConfig,
    witness: &str,
    kind: &Option<String>,
) -> Result<String> {
    let id = resolve_witness(corpus, witness)?;
    let kind = content_kind(config, kind);
    corpus
        .content_for(id, kind)
        .map(|content| content.content.clone())
        .ok_or_else(|| anyhow!("witness '{witness}' has no {kind} content"))
}

fn cmd_import(store: &CorpusStore, config: &CorpusConfig, file: &PathBuf) -> Result<()> {
    println!("{} {}", "Importing".green().bold(), file.display());

    let batch = Batch::load(file).with_context(|| format!("failed to read {}", file.display()))?;
    let summary = import_batch(store, &batch, config)?;

    println!(
        "  {} created={} updated={} deleted={} skipped={}",
        "→".cyan(),
        summary.created,
        summary.updated,
        summary.deleted,
        summary.skipped
    );
    for (entity, count) in &summary.deleted_by_kind {
        println!("    {} {entity}: {count}", "deleted".red());
    }
    for warning in &summary.warnings {
        println!("  {} {warning}", "warning".yellow().bold());
    }
    println!("  {} {}", "→".cyan(), config.store_path.display());
    Ok(())
}

fn cmd_delete(store: &CorpusStore) -> Result<()> {
    let removed = delete_all(store)?;
    println!("{} {removed} entities", "Deleted".red().bold());
    Ok(())
}

fn cmd_render(
    store: &CorpusStore,
    config: &CorpusConfig,
    witness: &str,
    kind: Option<String>,
) -> Result<()> {
    let markup = store.read(|corpus| -> Result<String> {
        let id = resolve_witness(corpus, witness)?;
        let kind = content_kind(config, &kind);
        let content = corpus
            .content_for(id, kind)
            .ok_or_else(|| anyhow!("witness '{witness}' has no {kind} content"))?;
        Ok(render_with_readings(corpus, config, content))
    })?;
    println!("{markup}");
    Ok(())
}

fn cmd_sentence(
    store: &CorpusStore,
    config: &CorpusConfig,
    witnesses: &str,
    n: u32,
    kind: Option<String>,
) -> Result<()> {
    let hits = store.read(|corpus| -> Result<_> {
        let ids = resolve_list(corpus, witnesses)?;
        Ok(sentences_across(
            corpus,
            &RegexSentenceLocator,
            &ids,
            content_kind(config, &kind),
            n,
        ))
    })?;

    for hit in hits {
        let label = if hit.group_siglum.is_empty() {
            hit.siglum.clone()
        } else {
            format!("{} / {}", hit.group_siglum, hit.siglum)
        };
        println!("{}", label.bold());
        if hit.fragment.is_empty() {
            println!("  {}", "(no such sentence)".dimmed());
        } else {
            println!("{}", hit.fragment);
        }
    }
    Ok(())
}

fn cmd_search(
    store: &CorpusStore,
    config: &CorpusConfig,
    witness: &str,
    query: &str,
    kind: Option<String>,
) -> Result<()> {
    let markup = store.read(|corpus| witness_markup(corpus, config, witness, &kind))?;
    let paragraphs = search_paragraphs(&markup, query);
    if paragraphs.is_empty() {
        println!("{} '{query}'", "No match for".yellow());
        return Ok(());
    }
    for paragraph in paragraphs {
        println!("{paragraph}");
    }
    Ok(())
}

fn cmd_mark_unique(store: &CorpusStore, config: &CorpusConfig) -> Result<()> {
    println!("{}", "Marking unique readings".green().bold());
    let report = store.transaction(|corpus| -> Result<_, StoreError> {
        let groups = grouping_witnesses(corpus);
        mark_unique_readings(corpus, config, &groups)
    })?;

    println!(
        "  {} marked={} updated={}",
        "→".cyan(),
        report.marked,
        report.updated_contents.len()
    );
    for stale in &report.stale {
        println!(
            "  {} region '{}' of witness {} (group {}) is missing",
            "stale".yellow().bold(),
            stale.region_id,
            stale.member,
            stale.group
        );
    }
    Ok(())
}

fn cmd_texts(store: &CorpusStore, config: &CorpusConfig, group: Option<&str>) -> Result<()> {
    let texts = store.read(|corpus| list_texts(corpus, config, group));
    println!("{}", serde_json::to_string_pretty(&texts)?);
    Ok(())
}

fn cmd_histogram(
    store: &CorpusStore,
    config: &CorpusConfig,
    witness: &str,
    region_kind: RegionKind,
    kind: Option<String>,
) -> Result<()> {
    let markup = store.read(|corpus| witness_markup(corpus, config, witness, &kind))?;
    for bar in sentence_histogram(&markup, region_kind) {
        println!(
            "{:>5} {} {}",
            bar.sentence,
            "#".repeat(bar.regions).cyan(),
            bar.regions
        );
    }
    Ok(())
}

fn cmd_variants(
    store: &CorpusStore,
    config: &CorpusConfig,
    manuscripts: &str,
    reference: &str,
) -> Result<()> {
    let rows = store.read(|corpus| -> Result<_> {
        let ids = resolve_list(corpus, manuscripts)?;
        Ok(work_region_readings(corpus, config, reference, &ids))
    })?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
