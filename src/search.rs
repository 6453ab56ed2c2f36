//! # Search Module
//!
//! The resolution pipeline: classify the query, check the cache, qualify it
//! with a search-engine prefix, resolve it against the least-loaded upstream
//! node under a timeout race, retry with exponential backoff on retryable
//! failures, walk the ordered fallback-engine list when the primary yields
//! nothing, and normalize whatever comes back into a uniform
//! [`SearchResult`].
//!
//! The public surface never throws: total failure is a `SearchResult` tagged
//! as error with a structured, suggestion-bearing exception.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::ResolutionCache;
use crate::error::{NodeError, SearchErrorKind, SearchException};
use crate::node::{LoadResult, LoadType, NodePool};
use crate::sources::{self, Platform};
use crate::track::{RawTrack, Track};

/// Opciones reconocidas de una búsqueda. Vía serde, las claves no
/// reconocidas se ignoran en lugar de rechazarse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Etiqueta opaca del solicitante, adjuntada a cada pista resultante
    pub requester: Option<String>,
    /// La lista de resultados se trunca a este largo, no se re-consulta
    pub limit: usize,
    /// Motor explícito; gana sobre el detectado por el clasificador
    pub source: Option<String>,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    /// Motores alternativos, probados en orden solo si el intento primario
    /// no produce pistas
    pub fallback_engines: Vec<String>,
    pub cache_results: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            requester: None,
            limit: 10,
            source: None,
            timeout_ms: 15_000,
            retry_attempts: 3,
            fallback_engines: Vec::new(),
            cache_results: true,
        }
    }
}

/// Forma del resultado: unión etiquetada sobre pista/playlist/búsqueda/
/// vacío/error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Track,
    Playlist,
    Search,
    Empty,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub name: String,
    pub selected: Option<usize>,
}

/// Resultado uniforme de una búsqueda. Transitorio: se produce por llamada,
/// no se persiste (salvo en el caché de resoluciones).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub kind: ResultKind,
    pub tracks: Vec<Track>,
    pub playlist: Option<PlaylistInfo>,
    pub exception: Option<SearchException>,
    /// Motor que produjo el resultado
    pub engine: String,
    pub elapsed_ms: u64,
    pub cache_hit: bool,
}

impl SearchResult {
    fn empty(engine: &str, elapsed_ms: u64) -> Self {
        Self {
            kind: ResultKind::Empty,
            tracks: Vec::new(),
            playlist: None,
            exception: Some(SearchException::new(
                SearchErrorKind::NoResults,
                "La búsqueda no produjo resultados",
            )),
            engine: engine.to_string(),
            elapsed_ms,
            cache_hit: false,
        }
    }

    fn failure(engine: &str, elapsed_ms: u64, exception: SearchException) -> Self {
        Self {
            kind: ResultKind::Error,
            tracks: Vec::new(),
            playlist: None,
            exception: Some(exception),
            engine: engine.to_string(),
            elapsed_ms,
            cache_hit: false,
        }
    }
}

/// Contadores de reporte del orquestador. Solo informan, nunca controlan el
/// flujo.
#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub total_searches: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub per_platform: HashMap<String, u64>,
}

/// Orquestador central de resolución de búsquedas.
pub struct SearchOrchestrator {
    pool: Arc<NodePool>,
    cache: Arc<ResolutionCache<SearchResult>>,
    default_engine: String,
    cache_ttl: Duration,
    backoff_base: Duration,
    total_searches: AtomicU64,
    cache_hits: AtomicU64,
    errors: AtomicU64,
    per_platform: DashMap<String, u64>,
}

impl SearchOrchestrator {
    pub fn new(
        pool: Arc<NodePool>,
        cache: Arc<ResolutionCache<SearchResult>>,
        default_engine: impl Into<String>,
        cache_ttl: Duration,
        backoff_base: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            default_engine: default_engine.into(),
            cache_ttl,
            backoff_base,
            total_searches: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            per_platform: DashMap::new(),
        }
    }

    /// Resuelve una query (texto libre o URL) en un `SearchResult`.
    ///
    /// Nunca propaga una excepción cruda del upstream: el fallo total tras
    /// todos los fallbacks se devuelve como resultado etiquetado `error`.
    pub async fn search(&self, query: &str, options: SearchOptions) -> SearchResult {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        // 1. Caché primero: hit no expirado responde sin latencia añadida
        let key = ResolutionCache::<SearchResult>::key_for(
            query,
            options.source.as_deref(),
            options.limit,
        );
        if options.cache_results {
            if let Some(mut hit) = self.cache.get(&key) {
                debug!("✅ Hit de caché para: '{}'", query);
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                hit.cache_hit = true;
                hit.elapsed_ms = 0;
                return hit;
            }
        }

        // 2. Clasificar y elegir motor efectivo
        let class = sources::classify(query);
        if let Some(kind) = Self::rejected_kind(query, &class) {
            self.errors.fetch_add(1, Ordering::Relaxed);
            warn!("❌ Query con esquema irreconocible rechazada: '{}'", query);
            return SearchResult::failure(
                &self.default_engine,
                started.elapsed().as_millis() as u64,
                SearchException::new(kind, format!("No se pudo interpretar: {query}")),
            );
        }
        let engine = options
            .source
            .clone()
            .or_else(|| class.search_prefix.map(str::to_string))
            .unwrap_or_else(|| self.default_engine.clone());
        self.bump_platform(&engine, class.platform);

        // 3. Query calificada: las URLs pasan sin tocar
        let qualified = if class.is_valid_url {
            query.to_string()
        } else {
            format!("{engine}:{query}")
        };
        debug!("🔍 Query calificada: '{}' (motor {})", qualified, engine);

        // 4-5. Intento primario con reintentos y backoff exponencial
        let timeout = Duration::from_millis(options.timeout_ms);
        let mut outcome = self
            .attempt_with_retries(&qualified, timeout, options.retry_attempts)
            .await;

        // 6. Caminar los motores de fallback en orden, un intento cada uno,
        // hasta el primero que produzca pistas
        let mut winning_engine = engine.clone();
        if !Self::has_tracks(&outcome) && !class.is_valid_url {
            for fallback in &options.fallback_engines {
                if *fallback == winning_engine {
                    continue;
                }
                info!("🔁 Fallback a motor '{}' para: '{}'", fallback, query);
                let fb_query = format!("{fallback}:{query}");
                let attempt = self.resolve_once(&fb_query, timeout).await;
                if Self::has_tracks(&attempt) {
                    winning_engine = fallback.clone();
                    outcome = attempt;
                    break;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;

        // 7-9. Normalizar, cachear o reportar el fallo estructurado
        let result = match outcome {
            Ok(load) => self.normalize(load, &winning_engine, &options, elapsed_ms),
            Err(node_err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                let kind = node_err.kind();
                warn!("❌ Búsqueda fallida para '{}': {}", query, node_err);
                SearchResult::failure(
                    &winning_engine,
                    elapsed_ms,
                    SearchException::new(kind, node_err.to_string()),
                )
            }
        };

        if options.cache_results && !result.tracks.is_empty() {
            self.cache.set(key, result.clone(), self.cache_ttl);
        }
        result
    }

    /// Wrapper que fija el motor de una plataforma y su cadena de fallbacks.
    pub async fn search_platform(
        &self,
        platform: Platform,
        query: &str,
        mut options: SearchOptions,
    ) -> SearchResult {
        if let Some(prefix) = platform.search_prefix() {
            options.source = Some(prefix.to_string());
        }
        if options.fallback_engines.is_empty() {
            options.fallback_engines = platform
                .fallback_engines()
                .into_iter()
                .map(str::to_string)
                .collect();
        }
        self.search(query, options).await
    }

    pub async fn search_youtube(&self, query: &str) -> SearchResult {
        self.search_platform(Platform::YouTube, query, SearchOptions::default())
            .await
    }

    pub async fn search_spotify(&self, query: &str) -> SearchResult {
        self.search_platform(Platform::Spotify, query, SearchOptions::default())
            .await
    }

    pub async fn search_soundcloud(&self, query: &str) -> SearchResult {
        self.search_platform(Platform::SoundCloud, query, SearchOptions::default())
            .await
    }

    pub fn stats(&self) -> SearchStats {
        SearchStats {
            total_searches: self.total_searches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            per_platform: self
                .per_platform
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }

    /// Saludable mientras los errores no dominen las búsquedas.
    pub fn is_healthy(&self) -> bool {
        let total = self.total_searches.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        total == 0 || errors * 2 < total
    }

    async fn attempt_with_retries(
        &self,
        qualified: &str,
        timeout: Duration,
        retry_attempts: u32,
    ) -> Result<LoadResult, NodeError> {
        let attempts = retry_attempts.max(1);
        let mut last_err = NodeError::NoAvailableNodes;

        for attempt in 0..attempts {
            if attempt > 0 {
                // backoff exponencial: base × 2^intento
                let delay = self.backoff_base * 2u32.pow(attempt - 1);
                debug!("⏳ Reintento {} tras {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }
            match self.resolve_once(qualified, timeout).await {
                Ok(load) => return Ok(load),
                Err(err) => {
                    if !err.kind().is_retryable() {
                        // errores terminales abortan de inmediato
                        return Err(err);
                    }
                    warn!("⚠️ Intento {} fallido: {}", attempt + 1, err);
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// Un intento de resolución contra el nodo ideal, bajo carrera de
    /// timeout: el primero entre {respuesta del nodo, timer} gana. Una vez
    /// en vuelo la llamada no se interrumpe, solo se ignora su resultado.
    async fn resolve_once(
        &self,
        qualified: &str,
        timeout: Duration,
    ) -> Result<LoadResult, NodeError> {
        let node = self.pool.ideal_node().ok_or(NodeError::NoAvailableNodes)?;
        match tokio::time::timeout(timeout, node.resolve(qualified)).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout),
        }
    }

    /// Una entrada con forma de URL (`esquema://...`) que el clasificador no
    /// reconoció como URL válida es un error terminal, no un término de
    /// búsqueda: calificarla con un motor produciría queries sin sentido.
    fn rejected_kind(
        query: &str,
        class: &sources::Classification,
    ) -> Option<SearchErrorKind> {
        if class.is_valid_url {
            return None;
        }
        let (scheme, _) = query.trim().split_once("://")?;
        let looks_like_scheme = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !looks_like_scheme {
            return None;
        }
        if matches!(scheme, "http" | "https") {
            Some(SearchErrorKind::InvalidUrl)
        } else {
            Some(SearchErrorKind::UnsupportedPlatform)
        }
    }

    fn has_tracks(outcome: &Result<LoadResult, NodeError>) -> bool {
        matches!(outcome, Ok(load) if !load.tracks.is_empty()
            && !matches!(load.load_type, LoadType::Error))
    }

    /// Normaliza la respuesta heterogénea del upstream al resultado
    /// uniforme: trunca a `limit`, rellena campos derivados que el upstream
    /// omite y adjunta motor, tiempo y marca de caché.
    fn normalize(
        &self,
        load: LoadResult,
        engine: &str,
        options: &SearchOptions,
        elapsed_ms: u64,
    ) -> SearchResult {
        match load.load_type {
            LoadType::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                let message = load
                    .error_message
                    .unwrap_or_else(|| "El nodo reportó un fallo de carga".to_string());
                SearchResult::failure(
                    engine,
                    elapsed_ms,
                    SearchException::new(SearchErrorKind::Upstream, message),
                )
            }
            LoadType::Empty => SearchResult::empty(engine, elapsed_ms),
            load_type => {
                if load.tracks.is_empty() {
                    return SearchResult::empty(engine, elapsed_ms);
                }
                let tracks: Vec<Track> = load
                    .tracks
                    .into_iter()
                    .take(options.limit)
                    .map(|raw| self.normalize_track(raw, engine, options))
                    .collect();
                let kind = match load_type {
                    LoadType::Track => ResultKind::Track,
                    LoadType::Playlist => ResultKind::Playlist,
                    _ => ResultKind::Search,
                };
                SearchResult {
                    kind,
                    tracks,
                    playlist: load.playlist.map(|p| PlaylistInfo {
                        name: p.name,
                        selected: p.selected_track,
                    }),
                    exception: None,
                    engine: engine.to_string(),
                    elapsed_ms,
                    cache_hit: false,
                }
            }
        }
    }

    fn normalize_track(&self, raw: RawTrack, engine: &str, options: &SearchOptions) -> Track {
        let info = raw.info;

        // plataforma: la declarada por el upstream, o inferida de la URI, o
        // la del motor usado
        let source = info
            .source_name
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                info.uri
                    .as_deref()
                    .map(|uri| sources::platform_from_uri(uri).to_string())
                    .filter(|name| name != "generic" && name != "http")
            })
            .or_else(|| {
                Platform::from_prefix(engine).map(|platform| platform.name().to_string())
            })
            .unwrap_or_else(|| "http".to_string());

        let artwork = info.artwork_url.clone().or_else(|| {
            // única plataforma con miniatura predecible
            if source == "youtube" {
                Some(sources::youtube_artwork(&info.identifier))
            } else {
                None
            }
        });

        let mut track = Track::new(raw.encoded, info.title)
            .with_author(info.author)
            .with_duration_ms(info.length)
            .with_source(source);
        track.seekable = info.is_seekable;
        track.stream = info.is_stream;
        track.artwork_url = artwork;
        track.uri = info.uri;
        track.requester = options.requester.clone();
        track
    }

    fn bump_platform(&self, engine: &str, detected: Platform) {
        let name = Platform::from_prefix(engine)
            .map(|platform| platform.name())
            .unwrap_or_else(|| detected.name());
        *self.per_platform.entry(name.to_string()).or_insert(0) += 1;
    }
}
