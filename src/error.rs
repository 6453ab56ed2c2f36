use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severidad de una excepción de búsqueda, usada para decidir el nivel de log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Esperable en operación normal (sin resultados, query rara)
    Common,
    /// Probablemente un problema externo transitorio
    Suspicious,
    /// Fallo real del sistema o configuración
    Fault,
}

/// Clasificación de errores del pipeline de búsqueda.
///
/// Cada variante sabe si merece reintento, si es recuperable de cara al
/// usuario y qué sugerencias mostrar. Ningún error crudo del nodo upstream
/// escapa sin pasar por esta taxonomía.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchErrorKind {
    /// La resolución superó el timeout configurado
    Timeout,
    /// Fallo de red o nodo caído
    Connection,
    /// Llamada exitosa pero sin pistas
    NoResults,
    /// URL malformada o irreconocible
    InvalidUrl,
    /// Plataforma detectada pero sin motor de búsqueda disponible
    UnsupportedPlatform,
    /// El nodo rechazó por credenciales o configuración
    MissingCredentials,
    /// Error interno reportado por el nodo (load-failed)
    Upstream,
}

impl SearchErrorKind {
    /// Solo timeouts y fallos de conexión se reintentan con backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection)
    }

    /// Recuperable = la UI puede ofrecer un botón de reintento.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection | Self::NoResults | Self::Upstream
        )
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::NoResults => Severity::Common,
            Self::Timeout | Self::Connection | Self::Upstream => Severity::Suspicious,
            Self::InvalidUrl | Self::UnsupportedPlatform | Self::MissingCredentials => {
                Severity::Fault
            }
        }
    }

    /// Sugerencias de remediación para mostrar directamente al usuario.
    pub fn suggestions(&self) -> Vec<String> {
        let items: &[&str] = match self {
            Self::Timeout | Self::Connection => &[
                "Intenta de nuevo en unos segundos",
                "Verifica que el nodo de audio esté en línea",
            ],
            Self::NoResults => &[
                "Prueba con términos más generales",
                "Incluye el nombre del artista en la búsqueda",
                "Verifica la ortografía",
            ],
            Self::InvalidUrl => &[
                "Revisa que el enlace esté completo",
                "Usa el enlace directo de la pista o playlist",
            ],
            Self::UnsupportedPlatform => &[
                "Esa plataforma no está soportada",
                "Busca la pista por nombre en su lugar",
            ],
            Self::MissingCredentials => &[
                "Revisa las credenciales del nodo de audio",
            ],
            Self::Upstream => &[
                "El servidor de audio reportó un error, intenta de nuevo",
            ],
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

/// Excepción estructurada adjunta a un `SearchResult` fallido o vacío.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchException {
    pub message: String,
    pub kind: SearchErrorKind,
    pub severity: Severity,
    pub recoverable: bool,
    pub suggestions: Vec<String>,
}

impl SearchException {
    pub fn new(kind: SearchErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            severity: kind.severity(),
            recoverable: kind.is_recoverable(),
            suggestions: kind.suggestions(),
        }
    }
}

/// Errores devueltos por el nodo de audio externo.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("tiempo de espera agotado esperando al nodo")]
    Timeout,
    #[error("fallo de conexión con el nodo: {0}")]
    Connection(String),
    #[error("el nodo rechazó las credenciales")]
    Unauthorized,
    #[error("el nodo rechazó la operación: {0}")]
    Rejected(String),
    #[error("no hay nodos de audio disponibles")]
    NoAvailableNodes,
}

impl NodeError {
    pub fn kind(&self) -> SearchErrorKind {
        match self {
            Self::Timeout => SearchErrorKind::Timeout,
            Self::Connection(_) | Self::NoAvailableNodes => SearchErrorKind::Connection,
            Self::Unauthorized => SearchErrorKind::MissingCredentials,
            Self::Rejected(_) => SearchErrorKind::Upstream,
        }
    }
}

/// Errores de las operaciones del reproductor.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("el reproductor no está conectado a un canal de voz")]
    NotConnected,
    #[error("el reproductor ya fue destruido")]
    Destroyed,
    #[error("no hay pista actual ni pistas en la cola")]
    NothingToPlay,
    #[error("la cola está llena (máximo {0} pistas)")]
    QueueFull(usize),
    #[error(transparent)]
    Node(#[from] NodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn retryable_kinds_are_only_network_ones() {
        assert!(SearchErrorKind::Timeout.is_retryable());
        assert!(SearchErrorKind::Connection.is_retryable());
        assert!(!SearchErrorKind::InvalidUrl.is_retryable());
        assert!(!SearchErrorKind::NoResults.is_retryable());
        assert!(!SearchErrorKind::MissingCredentials.is_retryable());
    }

    #[test]
    fn terminal_kinds_are_faults() {
        assert_eq!(SearchErrorKind::InvalidUrl.severity(), Severity::Fault);
        assert_eq!(SearchErrorKind::NoResults.severity(), Severity::Common);
        assert!(!SearchErrorKind::InvalidUrl.is_recoverable());
        assert!(SearchErrorKind::NoResults.is_recoverable());
    }

    #[test]
    fn exception_carries_suggestions() {
        let exc = SearchException::new(SearchErrorKind::NoResults, "sin resultados");
        assert!(!exc.suggestions.is_empty());
        assert!(exc.recoverable);
    }

    #[test]
    fn node_error_maps_to_kind() {
        assert_eq!(NodeError::Timeout.kind(), SearchErrorKind::Timeout);
        assert_eq!(
            NodeError::NoAvailableNodes.kind(),
            SearchErrorKind::Connection
        );
        assert_eq!(
            NodeError::Unauthorized.kind(),
            SearchErrorKind::MissingCredentials
        );
    }
}
