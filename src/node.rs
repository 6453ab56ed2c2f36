//! Interfaces hacia los colaboradores externos: el nodo de resolución de
//! audio, el pool de nodos y el transporte de voz del host.
//!
//! Este core no implementa el protocolo de cable del nodo ni el cifrado del
//! socket de voz; solo agrega búsquedas y reenvía payloads opacos.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::NodeError;
use crate::track::{GuildId, RawTrack};

/// Clasificación upstream de una respuesta de resolución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    Track,
    Playlist,
    Search,
    Empty,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistData {
    pub name: String,
    #[serde(default)]
    pub selected_track: Option<usize>,
}

/// Resultado crudo de `resolve` contra el nodo upstream.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub load_type: LoadType,
    pub tracks: Vec<RawTrack>,
    pub playlist: Option<PlaylistData>,
    pub error_message: Option<String>,
}

impl LoadResult {
    pub fn empty() -> Self {
        Self {
            load_type: LoadType::Empty,
            tracks: Vec::new(),
            playlist: None,
            error_message: None,
        }
    }
}

/// Nodo de entrega de audio externo (colaborador opaco).
///
/// `penalty` es la métrica de carga que usa el pool para elegir el nodo
/// ideal: menor penalidad, menos cargado.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioNode: Send + Sync {
    /// Resuelve una query calificada (`"<motor>:<texto>"` o URL desnuda).
    async fn resolve(&self, qualified_query: &str) -> Result<LoadResult, NodeError>;

    async fn join(&self, guild_id: GuildId, channel_id: u64, deaf: bool)
        -> Result<(), NodeError>;
    async fn play(&self, guild_id: GuildId, encoded: &str) -> Result<(), NodeError>;
    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError>;
    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError>;
    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> Result<(), NodeError>;
    async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError>;

    fn penalty(&self) -> u32;
    fn connected(&self) -> bool;
    fn name(&self) -> String;
}

/// Transporte de voz provisto por la aplicación host.
///
/// El payload es opaco para este core: se reenvía tal cual al gateway.
pub trait VoiceSender: Send + Sync {
    fn send(&self, guild_id: GuildId, payload: &serde_json::Value);
}

/// Pool de nodos con selección del nodo ideal por menor carga.
pub struct NodePool {
    nodes: RwLock<Vec<Arc<dyn AudioNode>>>,
}

impl NodePool {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
        }
    }

    pub fn add_node(&self, node: Arc<dyn AudioNode>) {
        debug!("🎛️ Nodo agregado al pool: {}", node.name());
        self.nodes.write().push(node);
    }

    /// Nodo conectado con menor penalidad, o `None` si no hay ninguno.
    pub fn ideal_node(&self) -> Option<Arc<dyn AudioNode>> {
        self.nodes
            .read()
            .iter()
            .filter(|node| node.connected())
            .min_by_key(|node| node.penalty())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Saludable si al menos un nodo está conectado.
    pub fn is_healthy(&self) -> bool {
        self.nodes.read().iter().any(|node| node.connected())
    }
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new()
    }
}

/// Razón con la que el nodo reporta el fin de una pista.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    /// Reemplazada por un skip manual: no avanza la cola
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    pub fn should_advance(&self) -> bool {
        !matches!(self, Self::Replaced)
    }
}

/// Eventos de ciclo de vida emitidos por el nodo, despachados por el manager
/// al reproductor del guild correspondiente.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    TrackStart {
        guild_id: GuildId,
        encoded: String,
    },
    TrackEnd {
        guild_id: GuildId,
        reason: TrackEndReason,
    },
    TrackException {
        guild_id: GuildId,
        message: String,
    },
    TrackStuck {
        guild_id: GuildId,
        threshold_ms: u64,
    },
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
    },
    PlayerUpdate {
        guild_id: GuildId,
        position_ms: u64,
        connected: bool,
    },
    /// El canal de voz cambió fuera de banda
    PlayerMoved {
        guild_id: GuildId,
        channel_id: Option<u64>,
    },
    Resumed {
        guild_id: GuildId,
    },
}

impl NodeEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::WebSocketClosed { guild_id, .. }
            | Self::PlayerUpdate { guild_id, .. }
            | Self::PlayerMoved { guild_id, .. }
            | Self::Resumed { guild_id } => *guild_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mock_node(name: &str, penalty: u32, connected: bool) -> Arc<dyn AudioNode> {
        let mut node = MockAudioNode::new();
        let name = name.to_string();
        node.expect_name().returning(move || name.clone());
        node.expect_penalty().return_const(penalty);
        node.expect_connected().return_const(connected);
        Arc::new(node)
    }

    #[test]
    fn ideal_node_picks_least_loaded_connected() {
        let pool = NodePool::new();
        pool.add_node(mock_node("cargado", 90, true));
        pool.add_node(mock_node("libre", 5, true));
        pool.add_node(mock_node("caido", 0, false));

        let ideal = pool.ideal_node().expect("debería haber nodo");
        assert_eq!(ideal.name(), "libre");
    }

    #[test]
    fn pool_without_connected_nodes_is_unhealthy() {
        let pool = NodePool::new();
        assert!(pool.ideal_node().is_none());
        assert!(!pool.is_healthy());

        pool.add_node(mock_node("caido", 0, false));
        assert!(pool.ideal_node().is_none());
        assert!(!pool.is_healthy());
    }

    #[test]
    fn replaced_does_not_advance_queue() {
        assert!(TrackEndReason::Finished.should_advance());
        assert!(TrackEndReason::LoadFailed.should_advance());
        assert!(!TrackEndReason::Replaced.should_advance());
    }

    #[test]
    fn node_event_exposes_guild() {
        let event = NodeEvent::TrackEnd {
            guild_id: GuildId(7),
            reason: TrackEndReason::Finished,
        };
        assert_eq!(event.guild_id(), GuildId(7));
    }
}
