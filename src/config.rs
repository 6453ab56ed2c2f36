use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Búsqueda
    pub default_engine: String,
    pub search_timeout_ms: u64,
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,

    // Caché
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub cache_sweep_interval_secs: u64,

    // Cola
    pub max_queue_size: usize,
    pub max_history: usize,

    // Reproductor
    pub default_volume: u8,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Búsqueda
            default_engine: std::env::var("MELODIA_DEFAULT_ENGINE")
                .unwrap_or_else(|_| "ytsearch".to_string()),
            search_timeout_ms: std::env::var("MELODIA_SEARCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()?,
            retry_attempts: std::env::var("MELODIA_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            backoff_base_ms: std::env::var("MELODIA_BACKOFF_BASE_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,

            // Caché
            cache_enabled: std::env::var("MELODIA_CACHE_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            cache_ttl_secs: std::env::var("MELODIA_CACHE_TTL")
                .unwrap_or_else(|_| "600".to_string())
                .parse()?,
            cache_sweep_interval_secs: std::env::var("MELODIA_CACHE_SWEEP_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            // Cola
            max_queue_size: std::env::var("MELODIA_MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_history: std::env::var("MELODIA_MAX_HISTORY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,

            // Reproductor
            default_volume: std::env::var("MELODIA_DEFAULT_VOLUME")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            reconnect_attempts: std::env::var("MELODIA_RECONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            reconnect_delay_ms: std::env::var("MELODIA_RECONNECT_DELAY_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Chequeos de sanidad sobre los valores cargados.
    pub fn validate(&self) -> Result<()> {
        if self.default_engine.trim().is_empty() {
            anyhow::bail!("El motor por defecto no puede estar vacío");
        }
        if self.default_volume > 100 {
            anyhow::bail!(
                "El volumen por defecto debe estar entre 0 y 100, recibido: {}",
                self.default_volume
            );
        }
        if self.search_timeout_ms == 0 {
            anyhow::bail!("El timeout de búsqueda debe ser mayor que 0");
        }
        if self.max_queue_size == 0 {
            anyhow::bail!("El tamaño máximo de cola debe ser mayor que 0");
        }
        if self.cache_sweep_interval_secs == 0 {
            anyhow::bail!("El intervalo de barrido del caché debe ser mayor que 0");
        }
        Ok(())
    }

    /// Resumen seguro de la configuración para logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Búsqueda: motor {}, timeout {}ms, {} reintentos (backoff {}ms)\n  \
            Caché: {} (TTL {}s, barrido cada {}s)\n  \
            Cola: {} pistas máx, historial {}\n  \
            Reproductor: {}% vol, {} reconexiones cada {}ms",
            self.default_engine,
            self.search_timeout_ms,
            self.retry_attempts,
            self.backoff_base_ms,
            if self.cache_enabled { "activado" } else { "desactivado" },
            self.cache_ttl_secs,
            self.cache_sweep_interval_secs,
            self.max_queue_size,
            self.max_history,
            self.default_volume,
            self.reconnect_attempts,
            self.reconnect_delay_ms
        )
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_engine: "ytsearch".to_string(),
            search_timeout_ms: 15_000,
            retry_attempts: 3,
            backoff_base_ms: 500,
            cache_enabled: true,
            cache_ttl_secs: 600,
            cache_sweep_interval_secs: 60,
            max_queue_size: 1000,
            max_history: 50,
            default_volume: 50,
            reconnect_attempts: 3,
            reconnect_delay_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn volume_above_100_is_rejected() {
        let config = Config {
            default_volume: 150,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_engine_is_rejected() {
        let config = Config {
            default_engine: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_mentions_engine() {
        let summary = Config::default().summary();
        assert!(summary.contains("ytsearch"));
    }
}
