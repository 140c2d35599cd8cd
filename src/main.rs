mod app;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Dataset JSON with nodes and edges.
    #[arg(long)]
    graph: PathBuf,
    /// Optional JSON config; missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the tree id stored in the dataset.
    #[arg(long)]
    tree_id: Option<String>,
    #[arg(long, default_value = "local")]
    user_id: String,
    /// Where node positions are kept between sessions. Disabled when unset.
    #[arg(long)]
    positions_dir: Option<PathBuf>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("treeforce=info")),
        )
        .init();

    let args = Args::parse();
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "treeforce",
        options,
        Box::new(move |cc| Ok(Box::new(app::TreeforceApp::new(cc, args.clone())))),
    )
}
