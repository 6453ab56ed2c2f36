//! Melodía — capa de orquestación entre una aplicación de chat y un nodo
//! externo de entrega de audio.
//!
//! La biblioteca no decodifica ni transmite audio: clasifica URLs y
//! términos de búsqueda, resuelve pistas contra el nodo con reintentos y
//! motores de respaldo, cachea resoluciones con TTL y mantiene por guild
//! una cola y una máquina de estados de reproducción que reacciona a los
//! eventos del nodo.
//!
//! El punto de entrada es [`MusicManager`]: registre nodos que implementen
//! [`AudioNode`], cree reproductores por guild y despache los eventos del
//! nodo de vuelta con [`MusicManager::handle_node_event`].

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod node;
pub mod plugin;
pub mod search;
pub mod sources;
pub mod track;

pub use audio::{
    Player, PlayerEvent, PlayerOptions, PlayerState, QueuePage, QueueSnapshot, RepeatMode,
    TrackQueue,
};
pub use cache::ResolutionCache;
pub use config::Config;
pub use error::{NodeError, PlayerError, SearchErrorKind, SearchException, Severity};
pub use manager::{HealthReport, HealthStatus, MusicManager};
pub use node::{
    AudioNode, LoadResult, LoadType, NodeEvent, NodePool, PlaylistData, TrackEndReason,
    VoiceSender,
};
pub use plugin::{Plugin, PluginRegistry};
pub use search::{
    PlaylistInfo, ResultKind, SearchOptions, SearchOrchestrator, SearchResult, SearchStats,
};
pub use sources::{classify, Classification, ContentType, Platform};
pub use track::{GuildId, RawTrack, RawTrackInfo, Track};
