use clap::{Parser, Subcommand};
use lead_harvester::common::types::HarvestJob;
use lead_harvester::config::AppConfig;
use lead_harvester::params::{parse_delimited_list, JobParams};
use lead_harvester::pipeline::{run_job, JobContext};
use lead_harvester::recorder::SqliteRunRecorder;
use lead_harvester::sources::{
    hunter::HunterJob, instagram::InstagramJob, maps::MapsJob, tiktok::TiktokJob, yelp::YelpJob,
    youtube::YoutubeJob,
};
use lead_harvester::storage::FsObjectStore;
use lead_harvester::{logging, HarvestError};
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "lead_harvester")]
#[command(about = "Resumable harvest-and-enrich jobs for lead-generation data sources")]
#[command(version = "0.1.0")]
struct Cli {
    /// Label recorded with the run for the operator console
    #[arg(long, global = true, default_value = "")]
    label: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Business-directory crawl by city and keyword list
    Maps {
        /// Target city, e.g. "Miami, FL"
        #[arg(long)]
        city: Option<String>,
        /// Pipe- or comma-delimited keyword list (defaults to the built-in set)
        #[arg(long)]
        keywords: Option<String>,
        /// Resume from the saved city cursor instead of --city
        #[arg(long)]
        use_progress: bool,
        /// Max places per keyword query
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Review-site crawl by city and keyword list
    Yelp {
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
        #[arg(long)]
        use_progress: bool,
    },
    /// Contact enrichment of a previously harvested dataset
    Hunter {
        /// Object-store key of the input dataset, e.g. exports/yelp_master.json
        #[arg(long)]
        input: String,
        /// Max emails requested per domain
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Hashtag-to-channel influencer harvest with scoring
    Youtube {
        /// Pipe-delimited category list (defaults to all)
        #[arg(long)]
        categories: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Hashtag influencer harvest with scoring
    Tiktok {
        #[arg(long)]
        categories: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Reel harvest with batched profile enrichment
    Instagram {
        #[arg(long)]
        categories: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn build_params(cli: &Cli) -> JobParams {
    let mut params = JobParams {
        label: cli.label.clone(),
        ..Default::default()
    };
    match &cli.command {
        Commands::Maps { city, keywords, use_progress, limit } => {
            params.city = city.clone();
            params.keywords = keywords.as_deref().and_then(parse_delimited_list);
            params.use_progress = *use_progress;
            params.limit = *limit;
        }
        Commands::Yelp { city, keywords, use_progress } => {
            params.city = city.clone();
            params.keywords = keywords.as_deref().and_then(parse_delimited_list);
            params.use_progress = *use_progress;
        }
        Commands::Hunter { input, limit } => {
            params.input_ref = Some(input.clone());
            params.limit = *limit;
        }
        Commands::Youtube { categories, limit }
        | Commands::Tiktok { categories, limit }
        | Commands::Instagram { categories, limit } => {
            params.categories = categories.as_deref().and_then(parse_delimited_list);
            params.limit = *limit;
        }
    }
    params
}

fn job_for(command: &Commands) -> Box<dyn HarvestJob> {
    match command {
        Commands::Maps { .. } => Box::new(MapsJob),
        Commands::Yelp { .. } => Box::new(YelpJob),
        Commands::Hunter { .. } => Box::new(HunterJob),
        Commands::Youtube { .. } => Box::new(YoutubeJob),
        Commands::Tiktok { .. } => Box::new(TiktokJob),
        Commands::Instagram { .. } => Box::new(InstagramJob),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let store = Arc::new(FsObjectStore::new(&config.data_root));
    let recorder = Arc::new(SqliteRunRecorder::open_at_root(&config.data_root)?);

    let params = build_params(&cli);
    let job = job_for(&cli.command);
    let ctx = JobContext {
        config,
        store,
        recorder,
        params,
    };

    println!("🔄 Running {} harvest...", job.source_name());
    match run_job(job.as_ref(), &ctx).await {
        Ok(summary) => {
            println!("\n📊 Run results for {}:", summary.source);
            println!("   New rows:   {}", summary.new_rows);
            println!("   Total rows: {}", summary.total_rows);
            println!("   Persisted:  {}", summary.persisted);
            println!("   Detail:     {}", summary.meta);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            match &e {
                HarvestError::Config(msg) | HarvestError::MissingInput(msg) => {
                    eprintln!("⚠️  {msg}");
                }
                other => eprintln!("⚠️  {other}"),
            }
            std::process::exit(1);
        }
    }
}
