mod config;
mod events;
mod server;
mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use config::ServerConfig;
use events::ServerEvent;
use gloop::PacketLossSimulation;
use server::GameServer;

#[derive(Parser)]
#[command(name = "gloop-server")]
#[command(about = "Authoritative game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = gloop::constants::NETWORK_PORT)]
    port: u16,

    #[arg(long, default_value_t = gloop::constants::SERVER_GAME_REFRESH_RATE)]
    tick_rate: f64,

    #[arg(long, default_value_t = gloop::constants::PLAYER_LIMIT)]
    player_limit: usize,

    #[arg(long, default_value_t = 0)]
    bot_count: usize,

    #[arg(long, default_value_t = 200)]
    target_orb_count: usize,

    #[arg(long, default_value_t = gloop::constants::BASE_WIDTH)]
    map_width: f32,

    #[arg(long, default_value_t = gloop::constants::BASE_HEIGHT)]
    map_height: f32,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable artificial packet loss/latency simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,

    #[arg(
        long,
        default_value_t = 0.0,
        help = "Seconds of each 10-second window during which all traffic is dropped, simulating a lag spike"
    )]
    lag_spike_duration: f64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let global_packet_loss = if args.simulate_packet_loss {
        Some(PacketLossSimulation {
            enabled: true,
            loss_percent: args.loss_percent,
            min_latency_ms: args.min_latency,
            max_latency_ms: args.max_latency,
            jitter_ms: args.jitter,
            lag_spike_duration: args.lag_spike_duration,
        })
    } else {
        None
    };

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        player_limit: args.player_limit,
        bot_count: args.bot_count,
        target_orb_count: args.target_orb_count,
        map_width: args.map_width,
        map_height: args.map_height,
        global_packet_loss,
    };

    let mut server = GameServer::new(&bind_addr, config)?;

    if args.headless {
        log::info!("Server started on {}", server.local_addr());
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            match event {
                ServerEvent::ClientConnected { player_id, addr, name } => {
                    log::info!("player {} ({}) connected from {}", player_id, name, addr);
                }
                ServerEvent::ClientDisconnected { player_id, reason } => {
                    log::info!("player {} {}", player_id, reason.as_str());
                }
                ServerEvent::ConnectionDenied { addr, reason } => {
                    log::warn!("connection denied to {}: {}", addr, reason);
                }
                ServerEvent::Error { message } => {
                    log::warn!("{}", message);
                }
            }
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::SeqCst);
                        }
                        KeyCode::Char('k') | KeyCode::Char('K') => {
                            if let Some(first) = server.client_infos().first() {
                                server.kick_client(first.player_id);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let stats = server.stats();
        terminal.draw(|frame| {
            tui::render(frame, &stats);
        })?;
    }

    log::info!("shutting down...");
    server.shutdown_connections();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
