mod game;
mod input;
mod network;
mod view;

use clap::Parser;
use log::info;
use view::MacroquadView;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name to register with
    #[arg(short, long)]
    name: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: f32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Steer with the mouse, press P to pause");

    let view = MacroquadView::new(args.width, args.height);
    let mut client =
        network::Client::new(&args.server, args.name, args.width, args.height, view).await?;

    client.run().await?;

    Ok(())
}
