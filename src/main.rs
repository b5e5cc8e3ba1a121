use cachesim::metrics::{self, Analyzer, Test};

use clap::Parser;
use color_eyre::eyre;
use console::style;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "{bin} {version}

{about}

USAGE: {usage}

{all-args}
";

#[derive(Parser, Debug)]
#[clap(
    help_template = HELP_TEMPLATE,
    version = option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
    about = "trace-driven multi-level cache hierarchy simulator",
)]
struct Options {
    /// Test configuration files (JSON).
    #[clap(value_name = "CONFIG", required = true)]
    configs: Vec<PathBuf>,

    /// Run all configurations and tabulate the results side by side.
    #[clap(long = "compare")]
    compare: bool,

    /// Write the comparison as CSV.
    #[clap(long = "csv", value_name = "PATH")]
    csv: Option<PathBuf>,

    /// More verbose logging.
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let options = Options::parse();

    let default_level = if options.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // more than one config implies a comparison run
    let compare = options.compare || options.configs.len() > 1;

    let mut analyzer = Analyzer::default();
    let mut failures = 0usize;
    for path in &options.configs {
        match Test::from_file(path) {
            Ok(test) => analyzer.add_test(test),
            Err(err) => {
                if !compare {
                    return Err(err.into());
                }
                log::error!("skipping {}: {err}", path.display());
                failures += 1;
            }
        }
    }

    let (results, run_failures) = analyzer.run_tests();
    failures += run_failures;

    if !results.is_empty() {
        if compare {
            println!("{}", style("Results Comparison").bold());
        }
        println!("{}", metrics::render_table(&results));

        if let Some(csv_path) = &options.csv {
            let file = File::create(csv_path)?;
            metrics::write_csv(&results, BufWriter::new(file))?;
            log::info!("results saved to {}", csv_path.display());
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
