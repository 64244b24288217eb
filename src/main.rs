use std::path::PathBuf;
use std::process::ExitCode;
use clap::Parser;
use trace_merge::merge::{DEFAULT_OUTPUT, MAX_FILES};
use trace_merge::{FileOrder, MergeOptions, TracePattern};

/// Merge trace*.trace files into a single JSON array
#[derive(Debug, clap::Parser)]
struct Cli {
    /// File the merged trace is written to
    #[clap(default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Directory searched for trace files
    #[clap(short, long, default_value = ".")]
    directory: PathBuf,

    /// File name pattern of the trace files
    #[clap(short, long, default_value_t = TracePattern::default())]
    pattern: TracePattern,

    /// Maximum number of trace files to merge
    #[clap(short, long, default_value_t = MAX_FILES)]
    max_files: usize,

    /// Merge files sorted by name instead of directory listing order
    #[clap(long)]
    sort_files: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[clap(short, long, conflicts_with = "verbose")]
    quiet: bool
}

impl Cli {
    fn log_spec(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn,trace_merge=info",
            (false, 1) => "warn,trace_merge=debug",
            (false, _) => "warn,trace_merge=trace"
        }
    }

    fn into_options(self) -> MergeOptions {
        MergeOptions {
            output: self.output,
            directory: self.directory,
            pattern: self.pattern,
            max_files: self.max_files,
            order: if self.sort_files { FileOrder::Name } else { FileOrder::Listing }
        }
    }
}

fn setup_logging(spec: &str) -> anyhow::Result<flexi_logger::LoggerHandle> {
    let spec = flexi_logger::LogSpecification::parse(spec)?;
    let handle = flexi_logger::Logger::with(spec)
        .log_to_stderr()
        .format(flexi_logger::colored_detailed_format)
        .set_palette("b1;3;2;4;6".to_string())
        .start()?;
    Ok(handle)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = match setup_logging(cli.log_spec()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Could not set up logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let options = cli.into_options();
    log::debug!("Output file: {}", options.output.display());
    log::debug!("Trace directory: {}", options.directory.display());
    log::debug!("Trace pattern: {}", options.pattern);
    log::debug!("Maximum files: {}", options.max_files);
    log::debug!("File order: {:?}", options.order);

    match trace_merge::merge(&options) {
        Ok(report) => {
            log::info!(
                "Merged {} events from {} trace files into {}",
                report.total_events, report.files_merged, report.output.display()
            );
            if let Ok(summary) = serde_json::to_string(&report) {
                log::trace!("Merge report: {}", summary);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            log::error!("{:#}", anyhow::Error::new(e));
            ExitCode::from(code)
        }
    }
}
