//! Contexto orquestador de alto nivel.
//!
//! Todo el estado mutable compartido (registro de reproductores por guild,
//! caché de resoluciones, contadores de búsqueda) vive en esta estructura
//! con construcción y teardown explícitos; no hay singletons de proceso, así
//! que los tests pueden levantar varias instancias independientes.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::player::{Player, PlayerOptions};
use crate::cache::ResolutionCache;
use crate::config::Config;
use crate::error::PlayerError;
use crate::node::{AudioNode, NodeEvent, NodePool, VoiceSender};
use crate::plugin::{Plugin, PluginRegistry};
use crate::search::{SearchOptions, SearchOrchestrator, SearchResult, SearchStats};
use crate::sources::Platform;
use crate::track::GuildId;

/// Estado global del reporte de salud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Reporte de salud por componente más el estado agregado.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub node_pool: bool,
    pub search: bool,
    pub cache: bool,
    pub plugins: bool,
}

/// Punto de entrada del sistema: posee el pool de nodos, el caché, el
/// orquestador de búsqueda, el registro de plugins y un reproductor por
/// guild.
pub struct MusicManager {
    config: Config,
    pool: Arc<NodePool>,
    cache: Arc<ResolutionCache<SearchResult>>,
    searcher: SearchOrchestrator,
    plugins: Mutex<PluginRegistry>,
    players: DashMap<GuildId, Arc<Player>>,
    sender: Arc<dyn VoiceSender>,
}

impl MusicManager {
    pub fn new(config: Config, sender: Arc<dyn VoiceSender>) -> Self {
        let pool = Arc::new(NodePool::new());
        let cache = Arc::new(ResolutionCache::new());
        if config.cache_enabled {
            cache.start_sweeper(config.cache_sweep_interval());
        }
        let searcher = SearchOrchestrator::new(
            Arc::clone(&pool),
            Arc::clone(&cache),
            config.default_engine.clone(),
            config.cache_ttl(),
            config.backoff_base(),
        );
        info!("🎵 Manager inicializado\n{}", config.summary());
        Self {
            config,
            pool,
            cache,
            searcher,
            plugins: Mutex::new(PluginRegistry::new()),
            players: DashMap::new(),
            sender,
        }
    }

    pub fn add_node(&self, node: Arc<dyn AudioNode>) {
        self.pool.add_node(node);
    }

    pub fn node_pool(&self) -> &NodePool {
        &self.pool
    }

    /// Resuelve una query contra el pipeline de búsqueda completo.
    pub async fn search(&self, query: &str, mut options: SearchOptions) -> SearchResult {
        if !self.config.cache_enabled {
            options.cache_results = false;
        }
        if options.timeout_ms == SearchOptions::default().timeout_ms {
            options.timeout_ms = self.config.search_timeout_ms;
        }
        self.searcher.search(query, options).await
    }

    /// Búsqueda con el motor y los fallbacks propios de una plataforma.
    pub async fn search_platform(
        &self,
        platform: Platform,
        query: &str,
        options: SearchOptions,
    ) -> SearchResult {
        self.searcher.search_platform(platform, query, options).await
    }

    pub fn search_stats(&self) -> SearchStats {
        self.searcher.stats()
    }

    /// Obtiene o crea el reproductor del guild, atado al nodo ideal actual.
    pub fn create_player(&self, guild_id: GuildId) -> Result<Arc<Player>, PlayerError> {
        if let Some(player) = self.players.get(&guild_id) {
            return Ok(Arc::clone(&player));
        }
        let node = self
            .pool
            .ideal_node()
            .ok_or(PlayerError::Node(crate::error::NodeError::NoAvailableNodes))?;
        let options = PlayerOptions {
            max_queue_size: self.config.max_queue_size,
            max_history: self.config.max_history,
            default_volume: self.config.default_volume,
            reconnect_attempts: self.config.reconnect_attempts,
            reconnect_delay: self.config.reconnect_delay(),
        };
        let player = Arc::new(Player::new(guild_id, node, options));
        self.players.insert(guild_id, Arc::clone(&player));
        info!("🎧 Reproductor creado para guild {}", guild_id);
        Ok(player)
    }

    pub fn get_player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|p| Arc::clone(&p))
    }

    /// Destrucción explícita e idempotente del reproductor de un guild.
    pub async fn destroy_player(&self, guild_id: GuildId) {
        if let Some((_, player)) = self.players.remove(&guild_id) {
            player.destroy().await;
        } else {
            debug!("♻️ destroy_player sobre guild {} sin reproductor", guild_id);
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Despacha un evento de ciclo de vida del nodo al reproductor del
    /// guild correspondiente; eventos de guilds sin reproductor se ignoran.
    pub async fn handle_node_event(&self, event: NodeEvent) {
        let guild_id = event.guild_id();
        if let Some(player) = self.get_player(guild_id) {
            player.handle_node_event(event).await;
        } else {
            debug!("📨 Evento para guild {} sin reproductor, ignorado", guild_id);
        }
    }

    /// Reenvía un payload de voz opaco a través del transporte del host.
    pub fn send_voice_update(&self, guild_id: GuildId, payload: &serde_json::Value) {
        self.sender.send(guild_id, payload);
    }

    pub fn register_plugin<F>(
        &self,
        name: impl Into<String>,
        priority: i32,
        dependencies: Vec<String>,
        factory: F,
    ) where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.plugins
            .lock()
            .register(name, priority, dependencies, factory);
    }

    pub fn activate_plugins(&self) -> usize {
        self.plugins.lock().activate()
    }

    /// Estado de salud agregado por regla de mayoría simple sobre los
    /// cuatro componentes.
    pub fn health_report(&self) -> HealthReport {
        let node_pool = self.pool.is_healthy();
        let search = self.searcher.is_healthy();
        let cache = self.cache.is_healthy();
        let plugins = self.plugins.lock().is_healthy();

        let healthy = [node_pool, search, cache, plugins]
            .iter()
            .filter(|ok| **ok)
            .count();
        let overall = match healthy {
            4 => HealthStatus::Healthy,
            3 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        };
        HealthReport {
            overall,
            node_pool,
            search,
            cache,
            plugins,
        }
    }

    /// Teardown explícito: destruye reproductores, detiene el barrido del
    /// caché y descarga plugins.
    pub async fn shutdown(&self) {
        info!("⚠️ Apagando manager...");
        let guilds: Vec<GuildId> = self.players.iter().map(|p| *p.key()).collect();
        for guild_id in guilds {
            self.destroy_player(guild_id).await;
        }
        self.cache.stop_sweeper();
        self.plugins.lock().deactivate_all();
        info!("💤 Manager apagado");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{LoadResult, MockAudioNode, TrackEndReason};
    use parking_lot::RwLock;
    use pretty_assertions::assert_eq;

    // Subscriber de test: visible con --nocapture, inofensivo si ya hay uno
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("melodia=debug")),
            )
            .with_test_writer()
            .try_init();
    }

    struct NullSender;

    impl VoiceSender for NullSender {
        fn send(&self, _guild_id: GuildId, _payload: &serde_json::Value) {}
    }

    struct RecordingSender {
        sent: RwLock<Vec<(GuildId, serde_json::Value)>>,
    }

    impl VoiceSender for RecordingSender {
        fn send(&self, guild_id: GuildId, payload: &serde_json::Value) {
            self.sent.write().push((guild_id, payload.clone()));
        }
    }

    fn manager_with_node() -> MusicManager {
        init_tracing();
        let manager = MusicManager::new(Config::default(), Arc::new(NullSender));
        let mut node = MockAudioNode::new();
        node.expect_connected().return_const(true);
        node.expect_penalty().return_const(0u32);
        node.expect_name().returning(|| "test".to_string());
        node.expect_resolve().returning(|_| Ok(LoadResult::empty()));
        node.expect_join().returning(|_, _, _| Ok(()));
        node.expect_play().returning(|_, _| Ok(()));
        node.expect_stop().returning(|_| Ok(()));
        node.expect_destroy().returning(|_| Ok(()));
        manager.add_node(Arc::new(node));
        manager
    }

    #[tokio::test]
    async fn create_player_is_one_per_guild() {
        let manager = manager_with_node();
        let first = manager.create_player(GuildId(1)).unwrap();
        let second = manager.create_player(GuildId(1)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.player_count(), 1);

        manager.create_player(GuildId(2)).unwrap();
        assert_eq!(manager.player_count(), 2);
    }

    #[tokio::test]
    async fn create_player_without_nodes_fails() {
        let manager = MusicManager::new(Config::default(), Arc::new(NullSender));
        assert!(manager.create_player(GuildId(1)).is_err());
    }

    #[tokio::test]
    async fn destroy_player_is_idempotent() {
        let manager = manager_with_node();
        manager.create_player(GuildId(1)).unwrap();

        manager.destroy_player(GuildId(1)).await;
        manager.destroy_player(GuildId(1)).await;
        assert_eq!(manager.player_count(), 0);
        assert!(manager.get_player(GuildId(1)).is_none());
    }

    #[tokio::test]
    async fn node_events_route_to_the_right_player() {
        let manager = manager_with_node();
        let player = manager.create_player(GuildId(1)).unwrap();
        player.connect(42, true).await.unwrap();
        player
            .enqueue(crate::track::Track::new("enc", "cancion"))
            .unwrap();
        player.play(None).await.unwrap();

        manager
            .handle_node_event(NodeEvent::TrackStart {
                guild_id: GuildId(1),
                encoded: "enc".into(),
            })
            .await;
        assert!(player.is_playing());

        // evento para guild desconocido: ignorado sin pánico
        manager
            .handle_node_event(NodeEvent::TrackEnd {
                guild_id: GuildId(99),
                reason: TrackEndReason::Finished,
            })
            .await;
    }

    #[tokio::test]
    async fn voice_updates_pass_through_opaque() {
        let sender = Arc::new(RecordingSender {
            sent: RwLock::new(Vec::new()),
        });
        let manager = MusicManager::new(Config::default(), Arc::clone(&sender) as Arc<dyn VoiceSender>);

        let payload = serde_json::json!({"op": 4, "d": {"channel_id": "42"}});
        manager.send_voice_update(GuildId(7), &payload);

        let sent = sender.sent.read();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, GuildId(7));
        assert_eq!(sent[0].1, payload);
    }

    #[tokio::test]
    async fn health_degrades_with_one_component_down() {
        // sin nodos: node_pool no saludable, el resto sí
        let manager = MusicManager::new(Config::default(), Arc::new(NullSender));
        let report = manager.health_report();
        assert!(!report.node_pool);
        assert_eq!(report.overall, HealthStatus::Degraded);

        let manager = manager_with_node();
        let report = manager.health_report();
        assert_eq!(report.overall, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn shutdown_destroys_everything() {
        let manager = manager_with_node();
        manager.create_player(GuildId(1)).unwrap();
        manager.create_player(GuildId(2)).unwrap();

        manager.shutdown().await;
        assert_eq!(manager.player_count(), 0);
    }
}
