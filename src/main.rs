/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

use anyhow::Context;
use clap::Parser;
use log::{info, warn, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;

use grabscope::discovery::{self, Survey};
use grabscope::{output, Bus, Config, Registry};

/// Save a screenshot from a connected oscilloscope
#[derive(Parser, Debug)]
#[command(name = "grabscope", version, about, long_about = None)]
struct Args {
    /// Only consider instruments whose address contains this text
    #[arg(short, long)]
    name: Option<String>,

    /// Output file, defaults to capture_<timestamp>.<ext>
    #[arg(short, long)]
    filename: Option<String>,

    /// Open the image once it is saved
    #[arg(long)]
    auto_view: bool,

    /// Log progress
    #[arg(short, long)]
    verbose: bool,

    /// Log every transport operation
    #[arg(long)]
    trace: bool,

    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// List supported drivers and reachable instruments, capture nothing
    #[arg(long)]
    list: bool,

    /// Write the effective settings to the configuration file and exit
    #[arg(long)]
    save_config: bool,
}

impl Args {
    /// Command line flags take precedence over the file
    fn apply(&self, mut config: Config) -> Config {
        if let Some(name) = &self.name {
            config.instrument_name = Some(name.clone());
        }
        if let Some(filename) = &self.filename {
            config.output_filename = Some(filename.clone());
        }
        config.auto_view |= self.auto_view;
        config.trace_mode |= self.trace;
        config
    }
}

fn init_logging(verbose: bool, trace: bool) {
    let level = if trace {
        LevelFilter::Trace
    } else if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn print_survey(registry: &Registry, survey: &Survey) {
    println!("Supported drivers:");
    for driver in registry.iter() {
        println!("  {} ({})", driver.id(), driver.format());
    }

    println!("Instruments:");
    for c in &survey.candidates {
        let driver = c.driver.map(|d| d.id()).unwrap_or("unsupported");
        println!("  {}\n    {} [{}]", c.address, c.identity, driver);
    }
    for (address, reason) in &survey.unreachable {
        println!("  {}\n    unreachable: {}", address, reason);
    }
}

fn run(args: &Args, config: &Config) -> anyhow::Result<()> {
    if args.save_config {
        let path = args
            .config
            .clone()
            .or_else(Config::default_path)
            .context("no configuration directory on this platform")?;
        config.save(&path)?;
        println!("Settings saved to {}", path.display());
        return Ok(());
    }

    let bus = Bus::from_config(config);
    let registry = Registry::builtin();
    let hint = config.name_hint();

    if args.list {
        let survey = discovery::survey(&bus, &registry, hint, config.timeout())?;
        print_survey(&registry, &survey);
        return Ok(());
    }

    let grab = grabscope::grab(&bus, &registry, hint, config.timeout())?;

    let path = output::output_path(
        config.output_filename.as_deref(),
        config.output_directory.as_deref(),
        grab.result.format,
        chrono::Local::now().naive_local(),
    );
    output::save(&grab.result, &path)
        .with_context(|| format!("could not write {}", path.display()))?;
    println!("Screen captured from {} and saved as {}", grab.address, path.display());

    if config.auto_view {
        info!("opening {}", path.display());
        if let Err(e) = output::view(&path) {
            warn!("{}", e);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load_or_default(args.config.as_deref()) {
        Ok(config) => args.apply(config),
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    init_logging(args.verbose, config.trace_mode);

    match run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e
                .downcast_ref::<grabscope::Error>()
                .map(grabscope::Error::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
