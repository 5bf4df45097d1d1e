use clap::Parser;
use std::path::PathBuf;

use scviz_explore::{app::ExplorerApp, ExplorerConfig};

#[derive(Parser)]
#[command(name = "scviz-explore")]
#[command(about = "Interactive single-cell embedding explorer", version)]
struct Cli {
    /// Dataset JSON to open at start-up
    dataset: Option<PathBuf>,

    /// Path to JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Seed for synthesized expression values
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> eframe::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let mut config = ExplorerConfig::load_or_default(cli.config.as_deref());
    if let Some(seed) = cli.seed {
        config.synthetic_seed = seed;
    }

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("scviz-explore")
            .with_inner_size([1280.0, 820.0]),
        ..Default::default()
    };

    eframe::run_native(
        "scviz-explore",
        native_options,
        Box::new(move |_cc| Ok(Box::new(ExplorerApp::new(config, cli.dataset)))),
    )
}
