use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::queue::{QueueSnapshot, RepeatMode, TrackQueue};
use crate::error::{NodeError, PlayerError};
use crate::node::{AudioNode, NodeEvent, TrackEndReason};
use crate::track::{GuildId, Track};

/// Estado del ciclo de vida del reproductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Sin pista actual
    Idle,
    /// Join de voz en vuelo
    Connecting,
    Playing,
    Paused,
    /// Terminal, vía destroy()
    Destroyed,
}

/// Eventos observables que el reproductor re-emite hacia el host.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStart(Track),
    TrackEnd {
        track: Track,
        reason: TrackEndReason,
    },
    TrackException {
        track: Option<Track>,
        message: String,
    },
    TrackStuck {
        track: Option<Track>,
        threshold_ms: u64,
    },
    QueueEnd,
    PlayerMoved {
        channel_id: Option<u64>,
    },
    ReconnectFailed,
    Destroyed,
}

/// Parámetros de construcción del reproductor, derivados de la configuración.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub max_queue_size: usize,
    pub max_history: usize,
    pub default_volume: u8,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_history: 50,
            default_volume: 50,
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Reproductor de un guild: posee exactamente una cola y reacciona a los
/// eventos del nodo para avanzarla.
///
/// Las operaciones que requieren conexión devuelven
/// [`PlayerError::NotConnected`] sobre un reproductor desconectado; nada se
/// reintenta en silencio.
pub struct Player {
    guild_id: GuildId,
    node: Arc<dyn AudioNode>,
    queue: RwLock<TrackQueue>,
    state: Arc<RwLock<PlayerState>>,
    current: RwLock<Option<Track>>,
    channel_id: RwLock<Option<u64>>,
    position_ms: Arc<AtomicU64>,
    volume: AtomicU8,
    destroyed: AtomicBool,
    position_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<PlayerEvent>,
    options: PlayerOptions,
}

impl Player {
    pub fn new(guild_id: GuildId, node: Arc<dyn AudioNode>, options: PlayerOptions) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            guild_id,
            node,
            queue: RwLock::new(TrackQueue::new(options.max_queue_size, options.max_history)),
            state: Arc::new(RwLock::new(PlayerState::Idle)),
            current: RwLock::new(None),
            channel_id: RwLock::new(None),
            position_ms: Arc::new(AtomicU64::new(0)),
            volume: AtomicU8::new(options.default_volume.min(100)),
            destroyed: AtomicBool::new(false),
            position_task: Mutex::new(None),
            events,
            options,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> PlayerState {
        *self.state.read()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlayerState::Paused
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Posición de reproducción en ms, monotónica mientras suena.
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::Relaxed)
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn current_track(&self) -> Option<Track> {
        self.current.read().clone()
    }

    pub fn channel_id(&self) -> Option<u64> {
        *self.channel_id.read()
    }

    /// Suscripción a los eventos del reproductor.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Acceso a la cola bajo un único lock; cada llamada individual es
    /// atómica. Operaciones compuestas que cruzan un await no lo son: ese
    /// es el límite documentado del modelo de concurrencia.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut TrackQueue) -> R) -> R {
        f(&mut self.queue.write())
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.read().snapshot()
    }

    /// Encola una pista. Devuelve error si la cola está llena.
    pub fn enqueue(&self, track: Track) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        if self.queue.write().add(track) {
            Ok(())
        } else {
            Err(PlayerError::QueueFull(self.options.max_queue_size))
        }
    }

    pub fn enqueue_many(&self, tracks: Vec<Track>) -> Result<usize, PlayerError> {
        self.ensure_alive()?;
        Ok(self.queue.write().add_many(tracks))
    }

    /// Conecta al canal de voz indicado.
    pub async fn connect(&self, channel_id: u64, deaf: bool) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        *self.state.write() = PlayerState::Connecting;
        if let Err(e) = self.node.join(self.guild_id, channel_id, deaf).await {
            // un join fallido no deja el estado colgado en Connecting
            *self.state.write() = PlayerState::Idle;
            return Err(e.into());
        }
        *self.channel_id.write() = Some(channel_id);
        info!("🔊 [{}] Conectado al canal {}", self.guild_id, channel_id);
        Ok(())
    }

    /// Reproduce la pista dada o, si se omite, la cabeza de la cola.
    ///
    /// El estado pasa a `Playing` cuando el nodo emite su evento de inicio,
    /// no aquí.
    pub async fn play(&self, track: Option<Track>) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        if self.channel_id.read().is_none() {
            return Err(PlayerError::NotConnected);
        }

        let track = match track {
            Some(track) => track,
            None => self.queue.write().next().ok_or(PlayerError::NothingToPlay)?,
        };

        info!("🎵 [{}] Reproduciendo: {}", self.guild_id, track.title);
        self.node.play(self.guild_id, &track.encoded).await?;
        self.position_ms.store(0, Ordering::Relaxed);
        self.queue.write().set_current(Some(track.clone()));
        *self.current.write() = Some(track);
        self.start_position_task();
        Ok(())
    }

    /// Pausa o reanuda sin tocar la pista actual.
    pub async fn pause(&self, paused: bool) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        if self.channel_id.read().is_none() {
            return Err(PlayerError::NotConnected);
        }
        self.node.pause(self.guild_id, paused).await?;

        let mut state = self.state.write();
        *state = if paused {
            PlayerState::Paused
        } else {
            PlayerState::Playing
        };
        info!(
            "{} [{}] {}",
            if paused { "⏸️" } else { "▶️" },
            self.guild_id,
            if paused { "pausado" } else { "reanudado" }
        );
        Ok(())
    }

    /// Salto forzado: pide al nodo detener la pista actual y deja que el
    /// handler de fin de pista avance la cola.
    pub async fn skip(&self) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        if self.channel_id.read().is_none() {
            return Err(PlayerError::NotConnected);
        }
        debug!("⏭️ [{}] Skip solicitado", self.guild_id);
        self.node.stop(self.guild_id).await?;
        Ok(())
    }

    /// Detiene la reproducción y limpia la cola, sin destruir el player.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        self.node.stop(self.guild_id).await?;
        self.queue.write().clear();
        self.queue.write().set_current(None);
        *self.current.write() = None;
        *self.state.write() = PlayerState::Idle;
        self.stop_position_task();
        info!("⏹️ [{}] Reproducción detenida", self.guild_id);
        Ok(())
    }

    /// Volumen 0–100, con clamp.
    pub async fn set_volume(&self, volume: u8) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        let clamped = volume.min(100);
        self.node.set_volume(self.guild_id, clamped).await?;
        self.volume.store(clamped, Ordering::Relaxed);
        info!("🔊 [{}] Volumen ajustado a {}%", self.guild_id, clamped);
        Ok(())
    }

    /// Teardown idempotente: detiene la pista en vuelo, limpia la cola,
    /// libera el timer de posición y emite `Destroyed` una sola vez.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("♻️ [{}] destroy() sobre player ya destruido", self.guild_id);
            return;
        }

        if let Err(e) = self.node.destroy(self.guild_id).await {
            warn!("⚠️ [{}] Error al destruir sesión en el nodo: {}", self.guild_id, e);
        }
        self.stop_position_task();
        self.queue.write().clear();
        self.queue.write().set_current(None);
        *self.current.write() = None;
        *self.channel_id.write() = None;
        *self.state.write() = PlayerState::Destroyed;
        self.emit(PlayerEvent::Destroyed);
        info!("💀 [{}] Reproductor destruido", self.guild_id);
    }

    /// Reacciona a un evento de ciclo de vida del nodo.
    pub async fn handle_node_event(&self, event: NodeEvent) {
        if self.is_destroyed() {
            return;
        }
        match event {
            NodeEvent::TrackStart { .. } => {
                *self.state.write() = PlayerState::Playing;
                if let Some(track) = self.current_track() {
                    self.emit(PlayerEvent::TrackStart(track));
                }
            }
            NodeEvent::TrackEnd { reason, .. } => {
                self.on_track_end(reason).await;
            }
            NodeEvent::TrackException { message, .. } => {
                error!("💥 [{}] Excepción de pista: {}", self.guild_id, message);
                self.emit(PlayerEvent::TrackException {
                    track: self.current_track(),
                    message,
                });
            }
            NodeEvent::TrackStuck { threshold_ms, .. } => {
                warn!(
                    "🪤 [{}] Pista atascada más de {}ms",
                    self.guild_id, threshold_ms
                );
                self.emit(PlayerEvent::TrackStuck {
                    track: self.current_track(),
                    threshold_ms,
                });
            }
            NodeEvent::PlayerUpdate { position_ms, .. } => {
                self.position_ms.store(position_ms, Ordering::Relaxed);
            }
            NodeEvent::PlayerMoved { channel_id, .. } => {
                self.emit(PlayerEvent::PlayerMoved { channel_id });
                match channel_id {
                    Some(channel) => *self.channel_id.write() = Some(channel),
                    None => self.reconnect().await,
                }
            }
            NodeEvent::WebSocketClosed { code, reason, .. } => {
                warn!(
                    "🔌 [{}] Socket de voz cerrado ({}): {}",
                    self.guild_id, code, reason
                );
                self.reconnect().await;
            }
            NodeEvent::Resumed { .. } => {
                if self.current_track().is_some() {
                    *self.state.write() = PlayerState::Playing;
                }
            }
        }
    }

    async fn on_track_end(&self, reason: TrackEndReason) {
        let finished = self.current.write().take();
        self.position_ms.store(0, Ordering::Relaxed);

        if let Some(track) = finished {
            self.emit(PlayerEvent::TrackEnd {
                track,
                reason,
            });
        }

        // Un skip manual reemplaza la pista: el play() siguiente ya viene en
        // camino y no debemos avanzar por nuestra cuenta
        if !reason.should_advance() {
            return;
        }

        let next = self.queue.write().next();
        match next {
            Some(track) => {
                if let Err(e) = self.play_advanced(track).await {
                    error!("❌ [{}] Error al avanzar la cola: {}", self.guild_id, e);
                }
            }
            None => {
                debug!("📭 [{}] Cola agotada", self.guild_id);
                self.queue.write().set_current(None);
                *self.state.write() = PlayerState::Idle;
                self.stop_position_task();
                self.emit(PlayerEvent::QueueEnd);
            }
        }
    }

    /// Re-emisión de play para el avance automático: la pista ya salió de
    /// la cola, no se vuelve a pasar por `queue.next()`.
    async fn play_advanced(&self, track: Track) -> Result<(), NodeError> {
        info!("🎵 [{}] Siguiente en cola: {}", self.guild_id, track.title);
        self.node.play(self.guild_id, &track.encoded).await?;
        self.position_ms.store(0, Ordering::Relaxed);
        *self.current.write() = Some(track);
        self.start_position_task();
        Ok(())
    }

    /// Secuencia acotada de reconexión tras perder el canal de voz. Si se
    /// agotan los intentos se emite `ReconnectFailed` en vez de reintentar
    /// para siempre.
    async fn reconnect(&self) {
        let Some(channel) = self.channel_id() else {
            self.emit(PlayerEvent::ReconnectFailed);
            return;
        };

        for attempt in 1..=self.options.reconnect_attempts {
            info!(
                "🔄 [{}] Intento de reconexión {}/{}",
                self.guild_id, attempt, self.options.reconnect_attempts
            );
            tokio::time::sleep(self.options.reconnect_delay).await;
            match self.node.join(self.guild_id, channel, true).await {
                Ok(()) => {
                    info!("✅ [{}] Reconectado al canal {}", self.guild_id, channel);
                    return;
                }
                Err(e) => warn!("⚠️ [{}] Reconexión fallida: {}", self.guild_id, e),
            }
        }

        error!(
            "❌ [{}] Reconexión agotada tras {} intentos",
            self.guild_id, self.options.reconnect_attempts
        );
        *self.channel_id.write() = None;
        *self.state.write() = PlayerState::Idle;
        self.emit(PlayerEvent::ReconnectFailed);
    }

    fn start_position_task(&self) {
        let position = Arc::clone(&self.position_ms);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let current = *state.read();
                match current {
                    PlayerState::Playing => {
                        position.fetch_add(1000, Ordering::Relaxed);
                    }
                    PlayerState::Destroyed => break,
                    _ => {}
                }
            }
        });
        if let Some(previous) = self.position_task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_position_task(&self) {
        if let Some(handle) = self.position_task.lock().take() {
            handle.abort();
        }
    }

    fn ensure_alive(&self) -> Result<(), PlayerError> {
        if self.is_destroyed() {
            Err(PlayerError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: PlayerEvent) {
        // Sin suscriptores no es un error
        let _ = self.events.send(event);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(handle) = self.position_task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MockAudioNode;

    fn connected_node() -> MockAudioNode {
        let mut node = MockAudioNode::new();
        node.expect_join().returning(|_, _, _| Ok(()));
        node.expect_play().returning(|_, _| Ok(()));
        node.expect_stop().returning(|_| Ok(()));
        node.expect_pause().returning(|_, _| Ok(()));
        node.expect_set_volume().returning(|_, _| Ok(()));
        node.expect_destroy().returning(|_| Ok(()));
        node
    }

    fn track(title: &str) -> Track {
        Track::new(format!("enc-{title}"), title)
    }

    fn drain_events(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn play_without_connection_is_refused() {
        let player = Player::new(
            GuildId(1),
            Arc::new(connected_node()),
            PlayerOptions::default(),
        );
        let result = player.play(Some(track("a"))).await;
        assert!(matches!(result, Err(PlayerError::NotConnected)));
    }

    #[tokio::test]
    async fn play_uses_queue_head_when_no_track_given() {
        let player = Player::new(
            GuildId(1),
            Arc::new(connected_node()),
            PlayerOptions::default(),
        );
        player.connect(42, true).await.unwrap();
        player.enqueue(track("primera")).unwrap();
        player.enqueue(track("segunda")).unwrap();

        player.play(None).await.unwrap();
        assert_eq!(player.current_track().unwrap().title, "primera");
        assert_eq!(player.queue_snapshot().items.len(), 1);
    }

    #[tokio::test]
    async fn failed_join_returns_to_idle() {
        let mut node = MockAudioNode::new();
        node.expect_join()
            .returning(|_, _, _| Err(NodeError::Connection("sin permisos".into())));
        node.expect_destroy().returning(|_| Ok(()));

        let player = Player::new(GuildId(1), Arc::new(node), PlayerOptions::default());
        assert!(player.connect(42, true).await.is_err());
        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(player.channel_id(), None);
    }

    #[tokio::test]
    async fn track_start_event_flips_state_to_playing() {
        let player = Player::new(
            GuildId(1),
            Arc::new(connected_node()),
            PlayerOptions::default(),
        );
        player.connect(42, true).await.unwrap();
        player.play(Some(track("a"))).await.unwrap();
        assert_ne!(player.state(), PlayerState::Playing);

        player
            .handle_node_event(NodeEvent::TrackStart {
                guild_id: GuildId(1),
                encoded: "enc-a".into(),
            })
            .await;
        assert!(player.is_playing());
    }

    #[tokio::test]
    async fn track_end_advances_queue_then_signals_queue_end() {
        let mut node = MockAudioNode::new();
        node.expect_join().returning(|_, _, _| Ok(()));
        node.expect_play().times(2).returning(|_, _| Ok(()));
        node.expect_destroy().returning(|_| Ok(()));

        let player = Player::new(GuildId(1), Arc::new(node), PlayerOptions::default());
        let mut rx = player.subscribe();
        player.connect(42, true).await.unwrap();
        player.enqueue(track("a")).unwrap();
        player.enqueue(track("b")).unwrap();

        player.play(None).await.unwrap();

        player
            .handle_node_event(NodeEvent::TrackEnd {
                guild_id: GuildId(1),
                reason: TrackEndReason::Finished,
            })
            .await;
        assert_eq!(player.current_track().unwrap().title, "b");

        player
            .handle_node_event(NodeEvent::TrackEnd {
                guild_id: GuildId(1),
                reason: TrackEndReason::Finished,
            })
            .await;
        assert!(player.current_track().is_none());
        assert_eq!(player.state(), PlayerState::Idle);

        let events = drain_events(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::QueueEnd)));
    }

    #[tokio::test]
    async fn replaced_reason_does_not_advance() {
        let player = Player::new(
            GuildId(1),
            Arc::new(connected_node()),
            PlayerOptions::default(),
        );
        player.connect(42, true).await.unwrap();
        player.enqueue(track("a")).unwrap();
        player.enqueue(track("b")).unwrap();
        player.play(None).await.unwrap();

        player
            .handle_node_event(NodeEvent::TrackEnd {
                guild_id: GuildId(1),
                reason: TrackEndReason::Replaced,
            })
            .await;
        // la cola no avanzó: "b" sigue encolada
        assert!(player.current_track().is_none());
        assert_eq!(player.queue_snapshot().items.len(), 1);
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let mut node = MockAudioNode::new();
        node.expect_destroy().times(1).returning(|_| Ok(()));

        let player = Player::new(GuildId(1), Arc::new(node), PlayerOptions::default());
        let mut rx = player.subscribe();

        player.destroy().await;
        player.destroy().await;

        assert!(player.is_destroyed());
        assert_eq!(player.state(), PlayerState::Destroyed);
        let destroyed_events = drain_events(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, PlayerEvent::Destroyed))
            .count();
        assert_eq!(destroyed_events, 1);
    }

    #[tokio::test]
    async fn operations_after_destroy_are_refused() {
        let mut node = MockAudioNode::new();
        node.expect_destroy().returning(|_| Ok(()));
        let player = Player::new(GuildId(1), Arc::new(node), PlayerOptions::default());

        player.destroy().await;
        assert!(matches!(
            player.play(Some(track("a"))).await,
            Err(PlayerError::Destroyed)
        ));
        assert!(matches!(
            player.enqueue(track("a")),
            Err(PlayerError::Destroyed)
        ));
    }

    #[tokio::test]
    async fn volume_is_clamped_to_100() {
        let player = Player::new(
            GuildId(1),
            Arc::new(connected_node()),
            PlayerOptions::default(),
        );
        player.set_volume(250).await.unwrap();
        assert_eq!(player.volume(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnect_emits_failure() {
        let mut node = MockAudioNode::new();
        node.expect_join()
            .times(4) // 1 connect + 3 reintentos
            .returning(|guild, channel, _| {
                if channel == 42 && guild == GuildId(1) {
                    Err(NodeError::Connection("sin voz".into()))
                } else {
                    Ok(())
                }
            });

        let options = PlayerOptions {
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let player = Player::new(GuildId(1), Arc::new(node), options);
        let mut rx = player.subscribe();

        // conexión inicial falla pero deja canal registrado manualmente
        let _ = player.connect(42, true).await;
        *player.channel_id.write() = Some(42);

        player
            .handle_node_event(NodeEvent::PlayerMoved {
                guild_id: GuildId(1),
                channel_id: None,
            })
            .await;

        let events = drain_events(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::ReconnectFailed)));
        assert_eq!(player.channel_id(), None);
    }

    #[tokio::test]
    async fn pause_toggles_state_without_touching_track() {
        let player = Player::new(
            GuildId(1),
            Arc::new(connected_node()),
            PlayerOptions::default(),
        );
        player.connect(42, true).await.unwrap();
        player.play(Some(track("a"))).await.unwrap();
        player
            .handle_node_event(NodeEvent::TrackStart {
                guild_id: GuildId(1),
                encoded: "enc-a".into(),
            })
            .await;

        player.pause(true).await.unwrap();
        assert!(player.is_paused());
        assert!(!player.is_playing());
        assert_eq!(player.current_track().unwrap().title, "a");

        player.pause(false).await.unwrap();
        assert!(player.is_playing());
    }
}
