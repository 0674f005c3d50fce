mod debug;
mod net;
mod tui;

use clap::Parser;

#[derive(Parser)]
#[command(name = "gloop-client")]
#[command(about = "Gloop game client")]
struct Args {
    #[arg(short, long, default_value = "player")]
    name: String,

    #[arg(short, long)]
    server: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    if let Some(server) = args.server {
        run_direct(args.name, server)?;
    } else {
        tui::run(args.name)?;
    }

    Ok(())
}

fn run_direct(name: String, server: String) -> anyhow::Result<()> {
    use std::net::ToSocketAddrs;

    let addr = server
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve {server}"))?;

    tui::run_connected(name, addr)
}
