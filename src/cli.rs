use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, error::ErrorKind};

use crate::config::{IndexingConfig, InputWindowConfig};
use crate::feature_sets::{FeatureRecordSource, TextFeatureSetReader};
use crate::index_map::{DefaultIndexMapBuilder, OffHeapIndexMapWriter};
use crate::input_paths::InputPathResolver;
use crate::transport::fs::LocalFileSystem;

#[derive(Debug, Parser)]
#[command(
    name = "feature_indexing",
    disable_help_subcommand = true,
    about = "Build off-heap feature index stores and resolve dated input paths"
)]
/// CLI for the `feature_indexing` binary.
///
/// Common usage:
/// - Build stores: `feature_indexing build-store --config shards.json --feature-sets /features --output /stores/index`
/// - List inputs: `feature_indexing resolve-paths --base-dir /data/train --date-range 2020-01-01:2020-01-31`
struct FeatureIndexingCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a partitioned off-heap index store for every configured shard.
    BuildStore(BuildStoreArgs),
    /// Print the existing input paths for a date window, one per line.
    ResolvePaths(ResolvePathsArgs),
}

#[derive(Debug, Args)]
struct BuildStoreArgs {
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON indexing config with featureShards (and optionally offHeapIndexMapNumPartitions)"
    )]
    config: PathBuf,
    #[arg(
        long = "feature-sets",
        value_name = "DIR",
        help = "Root holding one name<TAB>term listing directory per section"
    )]
    feature_sets: PathBuf,
    #[arg(long, value_name = "DIR", help = "Directory the store is written to")]
    output: PathBuf,
    #[arg(
        long,
        value_parser = parse_positive_usize,
        help = "Partition count per shard (overrides the config)"
    )]
    partitions: Option<usize>,
}

#[derive(Debug, Args)]
struct ResolvePathsArgs {
    #[arg(
        long = "base-dir",
        value_name = "PATH",
        required = true,
        help = "Base input directory, repeat as needed in priority order"
    )]
    base_dirs: Vec<String>,
    #[arg(
        long = "date-range",
        value_name = "START:END",
        help = "Explicit inclusive range (YYYY-MM-DD:YYYY-MM-DD or YYYYMMDD-YYYYMMDD)"
    )]
    date_range: Option<String>,
    #[arg(
        long = "days-ago",
        value_name = "START:END",
        help = "Range relative to today, e.g. 7:1 for the week ending yesterday"
    )]
    days_ago: Option<String>,
    #[arg(
        long = "date-path-format",
        value_name = "FORMAT",
        help = "strftime layout of the dated sub-path (default %Y-%m-%d)"
    )]
    date_path_format: Option<String>,
    #[arg(long = "error-on-missing", help = "Fail when a dated directory is missing")]
    error_on_missing: bool,
}

/// Run the `feature_indexing` binary with the given arguments (program name excluded).
pub fn run_feature_indexing<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<FeatureIndexingCli, _>(
        std::iter::once("feature_indexing".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    match cli.command {
        Command::BuildStore(args) => build_store(args),
        Command::ResolvePaths(args) => resolve_paths(args),
    }
}

fn build_store(args: BuildStoreArgs) -> Result<(), Box<dyn Error>> {
    let config = IndexingConfig::from_json_file(&args.config)?;
    config.validate()?;
    let num_partitions = args.partitions.unwrap_or_else(|| config.num_partitions());

    let reader = TextFeatureSetReader::new(&args.feature_sets);
    let feature_sets = reader
        .read_sections(&config.all_section_keys())
        .map_err(|err| err.with_shard_context(|section| config.shards_for_section(section)))?;
    let builder = DefaultIndexMapBuilder::new(&feature_sets);
    let writer = OffHeapIndexMapWriter::new(&args.output, num_partitions);

    println!(
        "Writing {} shard(s) with {} partition(s) each to {}",
        config.feature_shards.len(),
        num_partitions,
        args.output.display()
    );
    for (shard_id, shard) in &config.feature_shards {
        let keys = builder.shard_keys(shard_id, shard)?;
        let summary = writer.write_shard(shard_id, keys)?;
        println!(
            "  {shard_id}: {} features (per partition: {:?})",
            summary.total(),
            summary.partition_counts
        );
    }
    println!(
        "Set offHeapIndexMapDir={} and offHeapIndexMapNumPartitions={} to use this store.",
        args.output.display(),
        num_partitions
    );
    Ok(())
}

fn resolve_paths(args: ResolvePathsArgs) -> Result<(), Box<dyn Error>> {
    let mut window = InputWindowConfig::default().with_error_on_missing(args.error_on_missing);
    window.date_range = args.date_range;
    window.days_ago = args.days_ago;
    if let Some(format) = args.date_path_format {
        window = window.with_date_path_format(format);
    }
    let paths = InputPathResolver::new(window).resolve(&args.base_dirs, &LocalFileSystem)?;
    for path in paths {
        println!("{path}");
    }
    Ok(())
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw.parse::<usize>().map_err(|_| {
        format!(
            "Could not parse --partitions value '{}' as a positive integer",
            raw
        )
    })?;
    if parsed == 0 {
        return Err("--partitions must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
