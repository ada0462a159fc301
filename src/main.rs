use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};

use bandmath::{
    components::{DatasetSource, GeoEngine, LocalImage, PixelCorners, SubsetResolver},
    config::{DEFAULT_DRIVER, DEFAULT_QUERY_CRS},
    Algorithm, CancellationFlag, Indexes, JobConfig, ProcessingPipeline, ReadMode, Result,
    RunConfig, RunStatus, SourceConfig, Subset,
};

#[derive(Parser, Debug)]
#[command(name = "bandmath")]
#[command(about = "Derive single band rasters from bands of georeferenced images")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply an algorithm to bands of an image
    Run(RunArgs),
    /// Print x_UL,y_UL,x_BR,y_BR pixel corners of an image covered by a polygon
    Region {
        /// Image path
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Polygon as WKT
        wkt: String,
        /// Reference system of the polygon
        #[arg(long, default_value = DEFAULT_QUERY_CRS)]
        wkt_crs: String,
    },
    /// List available algorithms
    Algorithms,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceKind {
    /// Image on local storage
    Local,
    /// Planet Labs scene
    Pl,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Where the image comes from
    source: SourceKind,

    /// Image path, or Planet Labs scene id
    scene: String,

    /// Algorithm name, see `bandmath algorithms`
    #[arg(value_parser = parse_algorithm)]
    algorithm: Algorithm,

    /// Band numbers separated by commas, e.g. 4,3
    bands: String,

    /// Only process the part of the image covered by this WKT polygon
    #[arg(long, conflicts_with = "subset")]
    wkt: Option<String>,

    /// Reference system of the WKT polygon
    #[arg(long, default_value = DEFAULT_QUERY_CRS)]
    wkt_crs: String,

    /// Only process the pixels inside x_UL,y_UL,x_BR,y_BR
    #[arg(short, long, value_parser = parse_corners)]
    subset: Option<PixelCorners>,

    /// Identifier appended to the output name
    #[arg(long, default_value_t = 0)]
    worker_id: u32,

    /// Directory the output image is written to
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Gdal driver of the output image
    #[arg(long, default_value = DEFAULT_DRIVER)]
    driver: String,

    /// Planet Labs product type
    #[arg(long, default_value = "analytic")]
    product_type: String,

    /// Planet Labs API key
    #[arg(long, env = "PL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Read bands on this many threads instead of sequentially
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// Rows read per batch when reading on threads
    #[arg(long, default_value_t = 64)]
    batch_rows: usize,
}

fn parse_algorithm(name: &str) -> std::result::Result<Algorithm, String> {
    name.parse().map_err(|err: bandmath::BandMathError| err.to_string())
}

fn parse_corners(corners: &str) -> std::result::Result<PixelCorners, String> {
    corners
        .parse()
        .map_err(|err: bandmath::BandMathError| err.to_string())
}

impl RunArgs {
    fn into_config(self) -> Result<RunConfig> {
        let bands: Indexes = self.bands.parse()?;
        let source = match self.source {
            SourceKind::Local => SourceConfig::Local {
                path: PathBuf::from(self.scene),
            },
            SourceKind::Pl => SourceConfig::PlanetScene {
                scene: self.scene,
                product_type: self.product_type,
                api_key: self.api_key,
            },
        };
        let subset = match (self.wkt, self.subset) {
            (Some(wkt), _) => Some(Subset::Region {
                wkt,
                crs: self.wkt_crs,
            }),
            (None, Some(corners)) => Some(Subset::Pixels(corners)),
            (None, None) => None,
        };
        let read_mode = match self.threads {
            Some(threads) => ReadMode::Parallel {
                threads,
                batch_rows: self.batch_rows,
            },
            None => ReadMode::Sequential,
        };
        let mut job = JobConfig::new(self.algorithm, bands)
            .with_worker_id(self.worker_id)
            .with_output_dir(self.output_dir)
            .with_read_mode(read_mode);
        job.subset = subset;
        job.driver = self.driver;
        Ok(RunConfig { source, job })
    }
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let config = args.into_config()?;
    let cancellation = CancellationFlag::new();
    let handler_flag = cancellation.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.cancel()) {
        warn!("Ctrl-C will not cancel the run: {err}");
    }
    let outcome = ProcessingPipeline::execute(config, cancellation)?;
    match outcome.status {
        RunStatus::Completed => {
            info!("took {:?}", outcome.elapsed);
            println!("{}", outcome.path.display());
            Ok(ExitCode::SUCCESS)
        }
        RunStatus::Cancelled => {
            warn!(
                "cancelled, {} of {} rows written to {}",
                outcome.rows_written,
                outcome.window.height,
                outcome.path.display()
            );
            Ok(ExitCode::from(130))
        }
    }
}

fn region(file: PathBuf, wkt: &str, wkt_crs: &str) -> Result<ExitCode> {
    let resolver = SubsetResolver::<GeoEngine>::default();
    resolver.check_query(wkt, wkt_crs)?;
    let dataset = LocalImage::new(file).open()?;
    let corners = resolver.resolve_corners(&dataset.metadata()?, wkt, wkt_crs)?;
    println!("{corners}");
    Ok(ExitCode::SUCCESS)
}

fn algorithms() -> ExitCode {
    for algorithm in Algorithm::ALL {
        let descriptor = algorithm.descriptor();
        println!(
            "{:<10} {}. Arguments: {}",
            descriptor.name, descriptor.description, descriptor.arguments
        );
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Region { file, wkt, wkt_crs } => region(file, &wkt, &wkt_crs),
        Command::Algorithms => Ok(algorithms()),
    };
    result.unwrap_or_else(|err| {
        error!("{err}");
        ExitCode::FAILURE
    })
}
