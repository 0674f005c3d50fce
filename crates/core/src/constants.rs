//! Tunables shared by the server simulation and the client reconciliation engine.
//!
//! Values mirror a reference implementation closely enough that the two sides
//! agree on feel (acceleration, view size, timeout windows) without either one
//! reading the other's source.

/// Default playfield dimensions in map units.
pub const BASE_WIDTH: f32 = 2560.0;
pub const BASE_HEIGHT: f32 = 1440.0;

/// Exponent relating radius to view scale: `scale = (radius / START_RADIUS).powf(VIEW_GROWTH_RATE)`.
pub const VIEW_GROWTH_RATE: f32 = 0.30;

pub const MAX_NAME_LENGTH: usize = 12;
pub const BORDER_SIZE: f32 = 10.0;

pub const BASE_VELOCITY: f32 = 500.0;
pub const VELOCITY_SLOW_FACTOR: f32 = 0.4;

pub const MIN_ORB_RADIUS: f32 = 18.0;
pub const MAX_ORB_RADIUS: f32 = 20.0;
pub const EAT_VALUE_OFFSET: f32 = 10.0;

/// Spatial grid cell size.
pub const MAP_CELL_WIDTH: f32 = 600.0;
pub const MAP_CELL_HEIGHT: f32 = 600.0;

pub const START_RADIUS: f32 = 50.0;
pub const MAX_RADIUS: f32 = 1200.0;

pub const BOT_NAMES: &[&str] = &[
    "Google", "Apple", "Facebook", "Amazon", "Microsoft", "Twitter", "Netflix", "Uber",
];

/// Chance, per tick, that an idle bot re-randomizes its heading.
pub const BOT_INPUT_RANDOMIZE_CHANCE: u32 = 15;
/// Chance, on eating an orb, that a bot additionally re-randomizes its heading.
pub const BOT_FEED_RANDOMIZE_CHANCE: u32 = 3;

pub const SERVER_GAME_REFRESH_RATE: f64 = 50.0;

/// Overlap fraction subtracted from the eater's radius before a collision counts.
pub const COLLISION_MARGIN: f32 = 0.6;
/// View rectangle is inflated by this factor over the raw scale so entities don't pop in at the edge.
pub const FOV_MARGIN: f32 = 1.1;

/// Proportional gain of the client's gravity correction.
pub const GRAVITY_FACTOR: f32 = 2.0;

pub const STATS_PROBE_INTERVAL: f64 = 0.3;

pub const CONNECTION_ATTEMPT_INTERVAL: f64 = 1.0 / 5.0;
pub const CONNECTION_ATTEMPTS: u32 = 10;

pub const NOT_RESPONDING_TIME: f64 = 1.0;

pub const LAG_SPIKE_INTERVAL: u64 = 10;

pub const ACK_TIMEOUT: f64 = 1.0;
/// Window after which a connection with no acknowledged traffic is declared dead.
pub const TIMEOUT_LIMIT: f64 = 5.0;
/// Window after which a merely-laggy (but not yet timed out) player's inputs are frozen.
pub const PLAYER_INTERRUPT_LIMIT: f64 = 1.0;

pub const SERVER_SYNC_INTERVAL: f64 = 1.0 / 20.0;
pub const CLIENT_SYNC_INTERVAL: f64 = 1.0 / 60.0;
pub const ACK_INTERVAL: f64 = 1.0 / 10.0;

pub const PLAYER_LIMIT: usize = 100;

pub const PLAYER_DISCONNECTED_MESSAGE: &str = "Player Disconnected.";
pub const NOT_CONNECTED_MESSAGE: &str = "Server Connection Interrupted.";
pub const SERVER_FULL_MESSAGE: &str = "Server is full. Try again later.";

pub const NETWORK_PORT: u16 = 5562;

/// Bounded-queue capacity used throughout the transport and reconciliation layers.
pub const QUEUE_CAPACITY: usize = 4096;

/// Color palette indices assigned to players and orbs.
pub const PALETTE_SIZE: u8 = 12;
