mod config;
mod game;
mod packets;
mod world;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use config::ServerConfig;
use game::GameServer;
use mcpe_raknet::TransportServer;
use world::World;

#[derive(Parser)]
#[command(name = "mcpe-server")]
#[command(about = "MCPE alpha server over RakNet")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = mcpe_raknet::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 1, help = "Tick interval in ms")]
    tick_ms: u64,

    #[arg(long, default_value_t = 10, help = "Seconds of silence before a session is dropped")]
    timeout_secs: u64,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(short, long, default_value = "MCPE Server")]
    name: String,

    #[arg(long, default_value_t = 0)]
    seed: i32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = ServerConfig {
        bind: args.bind,
        port: args.port,
        world_seed: args.seed,
        ..Default::default()
    };
    config.transport.tick_interval = Duration::from_millis(args.tick_ms);
    config.transport.session_timeout = Duration::from_secs(args.timeout_secs);
    config.transport.max_sessions = args.max_clients;
    config.transport.server_name = args.name;
    config.validate()?;

    let world = World::new(config.world_seed, config.spawn, config.world_time);
    let mut server = TransportServer::bind(
        config.bind_addr(),
        config.transport.clone(),
        GameServer::new(world),
    )?;

    log::info!(
        "Server \"{}\" started on {}",
        server.config().server_name,
        server.local_addr()
    );
    server.run();
    log::info!(
        "Server shutting down with {} player(s) online",
        server.handler().world().player_count()
    );

    Ok(())
}
