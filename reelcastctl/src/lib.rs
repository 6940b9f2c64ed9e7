use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use reelcast_core::playlist::PlaylistError;
use reelcast_core::{
    load_config, render_master_playlist_for, AcquisitionError, CreateItemRequest, ItemId,
    ItemRecord, JobOutcome, Pipeline, PipelineError, ReelcastConfig, RestoreReport,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] reelcast_core::ConfigError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("retrieval engine error: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error("item {id} failed: {reason}")]
    JobFailed { id: ItemId, reason: String },
    #[error("item {0} was cancelled")]
    Interrupted(ItemId),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Fetch, transcode and publish HLS renditions", long_about = None)]
pub struct Cli {
    /// Path to reelcast.toml
    #[arg(long, default_value = "configs/reelcast.toml")]
    pub config: PathBuf,
    /// Overrides paths.intake_dir
    #[arg(long)]
    pub intake_dir: Option<PathBuf>,
    /// Overrides paths.publication_dir
    #[arg(long)]
    pub publication_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lists items recovered from the intake and publication directories
    Scan,
    /// Downloads a locator and publishes it once transcoded
    Fetch(FetchArgs),
    /// Re-encodes an item that was already downloaded
    Convert(ConvertArgs),
    /// Prints the master playlist for a set of renditions
    Master(MasterArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Display name of the item
    #[arg(long)]
    pub name: String,
    /// Magnet link or other locator understood by the retrieval engine
    #[arg(long)]
    pub locator: String,
    /// Rendition to produce; repeat for several (defaults from config)
    #[arg(long = "rendition")]
    pub renditions: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Item id as printed by `scan`
    pub id: String,
}

#[derive(Args, Debug)]
pub struct MasterArgs {
    #[arg(long = "rendition", required = true)]
    pub renditions: Vec<String>,
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Master(args) = &cli.command {
        let playlist = master_playlist(&args.renditions)?;
        return render(&playlist, cli.format);
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Scan => {
            let listing = context.scan()?;
            render(&listing, cli.format)?;
        }
        Commands::Fetch(args) => {
            let record = context.fetch(args).await?;
            render(&record, cli.format)?;
        }
        Commands::Convert(args) => {
            let record = context.convert(&ItemId::from(args.id.as_str())).await?;
            render(&record, cli.format)?;
        }
        Commands::Master(_) => {}
    }
    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ReelcastConfig,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = load_config(&cli.config)?;
        if let Some(dir) = &cli.intake_dir {
            config.paths.intake_dir = dir.clone();
        }
        if let Some(dir) = &cli.publication_dir {
            config.paths.publication_dir = dir.clone();
        }
        Ok(Self { config })
    }

    fn pipeline(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::from_config(&self.config)?;
        pipeline.restore();
        Ok(pipeline)
    }

    fn scan(&self) -> Result<ItemList> {
        let pipeline = Pipeline::from_config(&self.config)?;
        let restored = pipeline.restore();
        let mut rows = pipeline.list();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(ItemList { restored, rows })
    }

    async fn fetch(&self, args: &FetchArgs) -> Result<ItemRecord> {
        let pipeline = self.pipeline()?;
        let (record, job) = pipeline.create_item(CreateItemRequest {
            name: args.name.clone(),
            source_locator: args.locator.clone(),
            renditions: args.renditions.clone(),
        })?;
        info!(item_id = %record.id, "waiting for download and transcode");

        let mut job = job.wait_all();
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        let mut last_seen = None;
        let outcome = loop {
            tokio::select! {
                outcome = &mut job => break outcome,
                _ = ticker.tick() => {
                    let Ok(observed) = pipeline.progress(&record.id) else {
                        continue;
                    };
                    if last_seen != Some(observed) {
                        info!(item_id = %record.id, status = %observed.0, progress = observed.1, "progress");
                        last_seen = Some(observed);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!(item_id = %record.id, "interrupted, releasing transfer");
                    pipeline.delete_item(&record.id).await?;
                    return Err(AppError::Interrupted(record.id));
                }
            }
        };
        finish(&pipeline, &record.id, outcome)
    }

    async fn convert(&self, id: &ItemId) -> Result<ItemRecord> {
        let pipeline = self.pipeline()?;
        let job = pipeline.trigger_convert(id)?;
        let outcome = job.wait_all().await;
        finish(&pipeline, id, outcome)
    }
}

fn finish(pipeline: &Pipeline, id: &ItemId, outcome: JobOutcome) -> Result<ItemRecord> {
    match outcome {
        JobOutcome::Completed => pipeline
            .get(id)
            .ok_or_else(|| AppError::Interrupted(id.clone())),
        JobOutcome::Cancelled => Err(AppError::Interrupted(id.clone())),
        JobOutcome::Failed(reason) | JobOutcome::Panicked(reason) => Err(AppError::JobFailed {
            id: id.clone(),
            reason,
        }),
        JobOutcome::HandedOff(handle) => Err(AppError::JobFailed {
            id: id.clone(),
            reason: format!("{} phase still running", handle.phase()),
        }),
    }
}

fn master_playlist(renditions: &[String]) -> Result<MasterPlaylist> {
    let playlist = render_master_playlist_for(renditions)?;
    Ok(MasterPlaylist {
        renditions: renditions.to_vec(),
        playlist,
    })
}

#[derive(Debug, Serialize)]
pub struct ItemList {
    pub restored: RestoreReport,
    pub rows: Vec<ItemRecord>,
}

impl DisplayFallback for ItemList {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Restored {} published, {} downloaded ({} already published)",
            self.restored.published, self.restored.intake, self.restored.duplicates
        )];
        if self.rows.is_empty() {
            lines.push("No items found".to_string());
        }
        lines.extend(self.rows.iter().map(DisplayFallback::display));
        lines.join("\n")
    }
}

impl DisplayFallback for ItemRecord {
    fn display(&self) -> String {
        let produced = if self.produced_renditions.is_empty() {
            "-".to_string()
        } else {
            self.produced_renditions
                .iter()
                .map(|rendition| rendition.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "{id} | {name} | status={status} progress={progress}% | renditions={produced} | manifest={manifest}",
            id = self.id,
            name = self.name,
            status = self.status,
            progress = self.progress,
            manifest = self.stream_manifest_path.as_deref().unwrap_or("-"),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct MasterPlaylist {
    pub renditions: Vec<String>,
    pub playlist: String,
}

impl DisplayFallback for MasterPlaylist {
    fn display(&self) -> String {
        self.playlist.trim_end().to_string()
    }
}
