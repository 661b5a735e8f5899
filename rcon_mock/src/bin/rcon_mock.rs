use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use ops_core::BlockId;
use rcon_mock::{MockConfig, MockServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mock RCON server with a simulated block world")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:25575")]
    bind: SocketAddr,
    #[arg(long, env = "RCON_PASSWORD", default_value = "secret")]
    password: String,
    /// Day clock speed while doDaylightCycle is true.
    #[arg(long, default_value_t = 20.0)]
    ticks_per_second: f64,
    #[arg(long, default_value_t = 32_768)]
    max_fill_blocks: u64,
    /// Extra delay added to every response, in milliseconds.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
    /// Layer at and below which the world reads as grass.
    #[arg(long)]
    ground_y: Option<i32>,
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let server = MockServer::bind(
        args.bind,
        MockConfig {
            password: args.password,
            ticks_per_second: args.ticks_per_second,
            max_fill_blocks: args.max_fill_blocks,
            latency: Duration::from_millis(args.latency_ms),
        },
    )?;
    if let Some(surface) = args.ground_y {
        server.world().set_ground(surface, BlockId::new("grass_block"));
    }
    info!(addr = %server.addr(), "mock RCON server ready");

    loop {
        std::thread::sleep(Duration::from_secs(60));
        let world = server.world();
        info!(
            commands = world.commands_received(),
            fills = world.fill_count(),
            time = world.time_of_day(),
            "mock.status"
        );
    }
}
