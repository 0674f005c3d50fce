pub mod codec;
pub mod constants;
pub mod entity;
pub mod error;
pub mod grid;
pub mod net;
pub mod session;
pub mod sim;

pub use codec::{Cursor, MessageCode, PacketHeader, HEADER_LEN, MAX_PACKET_SIZE};
pub use entity::{Inputs, Orb, Player, Tracker};
pub use error::{GloopError, Result};
pub use grid::SpatialGrid;
pub use net::{
    sequence_greater_than, NetworkEndpoint, NetworkStats, PacketLossSimulation, ReceiveTracker,
    ReliableInbox, ReliableOutbox,
};
pub use session::{ClientSession, OutgoingMessage, PastPlayerSample, SessionEnd};
pub use sim::{DeathNotice, OrbViewDiff, PlayerSession, ServerWorld, WorldConfig};
