//! Cola de reproducción y máquina de estados del reproductor por guild.

pub mod player;
pub mod queue;

pub use player::{Player, PlayerEvent, PlayerOptions, PlayerState};
pub use queue::{QueuePage, QueueSnapshot, RepeatMode, TrackQueue};
