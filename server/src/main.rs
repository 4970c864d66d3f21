mod activity;
mod network;
mod session;
mod world;

use clap::Parser;
use log::info;
use network::{Server, ServerEvent};
use std::time::Duration;
use world::World;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Broadcast tick rate (snapshots per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Arena width in world units
    #[arg(long, default_value_t = shared::ARENA_WIDTH)]
    width: f32,

    /// Arena height in world units
    #[arg(long, default_value_t = shared::ARENA_HEIGHT)]
    height: f32,

    /// Number of live food items kept in the arena
    #[arg(short, long, default_value_t = shared::FOOD_COUNT)]
    food_count: usize,

    /// Seconds of silence before a session is evicted
    #[arg(long, default_value = "120")]
    inactivity_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);

    info!(
        "Starting arena server: {}x{} arena, {} food, {} Hz",
        args.width, args.height, args.food_count, args.tick_rate
    );

    let world = World::new(args.width, args.height, args.food_count);
    let mut server = Server::new(
        &address,
        tick_duration,
        world,
        Duration::from_secs(args.inactivity_timeout),
    )
    .await?;

    // Ctrl+C turns into a deterministic shutdown event on the owner loop
    let shutdown = server.event_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(ServerEvent::Shutdown);
        }
    });

    server.run().await
}
