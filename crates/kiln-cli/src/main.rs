use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use miette::{Context, IntoDiagnostic};

use kiln_spirv::{FwidthExpansion, Options};

/// kiln: SPIR-V to kiln IR translator
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input SPIR-V binary (either byte order)
    input: PathBuf,

    /// Output path for the IR dump (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How OpFwidth is expanded
    #[arg(long, value_enum, default_value_t = Fwidth::Legacy)]
    fwidth: Fwidth,

    /// Run the IR validator on the translated module
    #[arg(long)]
    validate: bool,

    /// Translate without producing output
    #[arg(long)]
    dry_run: bool,

    /// Log translation details to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Fwidth {
    /// |ddx(p)| + |ddx(p)|
    Legacy,
    /// |ddx(p)| + |ddy(p)|
    Derivatives,
}

impl From<Fwidth> for FwidthExpansion {
    fn from(value: Fwidth) -> Self {
        match value {
            Fwidth::Legacy => Self::Legacy,
            Fwidth::Derivatives => Self::Derivatives,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` filters (default `warn`), with `--verbose` raising everything to `debug`.
fn logger(verbose: bool, filters: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(filters.unwrap_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    logger(cli.verbose, std::env::var("RUST_LOG").ok().as_deref()).init();

    let bytes = std::fs::read(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    let options = Options {
        fwidth: cli.fwidth.into(),
    };
    let module = kiln_spirv::parse_bytes_with_options(&bytes, &options)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err_with(|| format!("failed to translate {}", cli.input.display()))?;
    log::info!(
        "translated {} function(s), {} variable(s)",
        module.functions.len(),
        module.variables.len()
    );

    if cli.validate {
        kiln_ir::validate(&module)
            .map_err(|e| miette::miette!("{e}"))
            .wrap_err("IR validation failed")?;
    }

    if cli.dry_run {
        return Ok(());
    }

    let text = kiln_ir::dump_module(&module);
    match &cli.output {
        Some(path) => std::fs::write(path, text)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => print!("{text}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;

    use super::*;

    #[test]
    fn rust_log_sets_the_level() {
        assert_eq!(logger(false, Some("debug")).build().filter(), LevelFilter::Debug);
        assert_eq!(
            logger(false, Some("kiln_spirv=trace")).build().filter(),
            LevelFilter::Trace
        );
    }

    #[test]
    fn default_level_is_warn() {
        assert_eq!(logger(false, None).build().filter(), LevelFilter::Warn);
    }

    #[test]
    fn verbose_raises_to_debug() {
        assert_eq!(logger(true, None).build().filter(), LevelFilter::Debug);
        assert_eq!(logger(true, Some("error")).build().filter(), LevelFilter::Debug);
    }

    #[test]
    fn fwidth_flag_parses() {
        let cli = Cli::try_parse_from(["kiln", "in.spv", "--fwidth", "derivatives"]).unwrap();
        assert!(matches!(
            FwidthExpansion::from(cli.fwidth),
            FwidthExpansion::Derivatives
        ));
    }
}
