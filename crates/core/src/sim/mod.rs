mod view;
mod world;

pub use view::{OrbViewDiff, PlayerSession};
pub use world::{DeathNotice, ServerWorld, WorldConfig};
