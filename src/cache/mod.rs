//! # Cache Module
//!
//! Time-bounded memoization of prior successful lookups.
//!
//! The cache is keyed by a pure function of the inputs that affect the
//! result (normalized query, explicit source, limit). Entries expire after
//! their TTL: expired entries are purged lazily on `get` and periodically by
//! a background sweep task, so keys that are never requested again do not
//! grow the map without bound.
//!
//! The size ceiling reported by [`ResolutionCache::is_healthy`] feeds the
//! health-check report only; it is not enforced as an eviction policy.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Entrada con timestamp de creación y TTL propio.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Caché de resoluciones con TTL por entrada y barrido periódico.
#[derive(Debug)]
pub struct ResolutionCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    hits: Arc<AtomicU64>,
    /// Por encima de este tamaño el caché se reporta como no saludable
    size_ceiling: usize,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<V> ResolutionCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            size_ceiling: 50_000,
            sweeper: parking_lot::Mutex::new(None),
        }
    }

    /// Deriva la clave a partir de los inputs que afectan el resultado.
    ///
    /// Dos llamadas lógicamente idénticas deben caer en la misma entrada,
    /// por eso la query se normaliza y las opciones van en orden fijo.
    pub fn key_for(query: &str, source: Option<&str>, limit: usize) -> String {
        format!(
            "{}|{}|{}",
            query.trim().to_lowercase(),
            source.unwrap_or("-"),
            limit
        )
    }

    /// Busca una entrada no expirada. Expiración perezosa: una entrada
    /// vencida se elimina y cuenta como miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    pub fn set(&self, key: String, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Elimina todas las entradas expiradas y devuelve cuántas se quitaron.
    pub fn sweep(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("🧹 Barrido de caché: {} entradas expiradas eliminadas", removed);
        }
        removed
    }

    /// Lanza la tarea de barrido periódico. Idempotente: reemplaza la
    /// anterior si ya había una.
    pub fn start_sweeper(&self, interval: Duration) {
        let entries = Arc::clone(&self.entries);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // el primer tick es inmediato
            loop {
                ticker.tick().await;
                let expired: Vec<String> = entries
                    .iter()
                    .filter(|entry| entry.value().is_expired())
                    .map(|entry| entry.key().clone())
                    .collect();
                for key in expired {
                    entries.remove(&key);
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    /// Vacía el caché y resetea el contador de hits.
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Señal de salud para el reporte: solo informa, no desaloja.
    pub fn is_healthy(&self) -> bool {
        self.entries.len() <= self.size_ceiling
    }
}

impl<V> Default for ResolutionCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for ResolutionCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}
