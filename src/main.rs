use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vpb::{
    BenchConfig, BenchError, OutputFormat, Report, Repository,
    ResolveNonExistingWithManyVanityPath, cli, runner,
};

fn main() -> Result<(), BenchError> {
    let args = cli::Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = BenchConfig::read(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    let output = config.output_format()?;

    tracing::info!(
        "Population: {} nodes x {} children, {} iterations",
        config.node_count,
        config.child_node_count,
        config.iterations
    );

    let repository = Repository::new();
    let mut benchmark = ResolveNonExistingWithManyVanityPath::with_vanity_resolver(
        &repository,
        config.fixture_config(),
    );
    let report = runner::run(&mut benchmark, config.run_options())
        .inspect_err(|e| tracing::error!("Benchmark failed: {e}"))?;

    print_report(&report, output)
}

fn print_report(report: &Report, output: OutputFormat) -> Result<(), BenchError> {
    match output {
        OutputFormat::Text => {
            println!("{}", Report::header());
            println!("{}", report.to_text());
        }
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}
