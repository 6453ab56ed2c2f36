use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identificador del guild (tenant) bajo el cual vive exactamente un
/// reproductor y su cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(pub u64);

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for GuildId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Bloque de metadatos por pista tal como lo entrega el nodo upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrackInfo {
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// Duración en milisegundos; 0 para streams en vivo
    pub length: u64,
    pub is_seekable: bool,
    pub is_stream: bool,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

/// Pista cruda del nodo: handle codificado opaco + bloque de info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrack {
    pub encoded: String,
    pub info: RawTrackInfo,
}

/// Descriptor de una pista ya resuelta, inmutable una vez creada.
///
/// Lo produce el orquestador de búsqueda al normalizar la respuesta del nodo
/// y a partir de ahí lo posee la cola que lo contenga. El único campo que se
/// ajusta después de la creación es la etiqueta `requester`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Handle opaco reproducible por el nodo upstream
    pub encoded: String,
    pub title: String,
    pub author: String,
    /// Milisegundos; 0 cuando la duración es desconocida (streams en vivo)
    pub duration_ms: u64,
    /// Nombre de la plataforma de origen ("youtube", "spotify", ...)
    pub source: String,
    pub seekable: bool,
    pub stream: bool,
    pub artwork_url: Option<String>,
    pub uri: Option<String>,
    /// Etiqueta opaca del solicitante, puesta por el caller
    pub requester: Option<String>,
    pub inserted_at: DateTime<Utc>,
}

impl Track {
    pub fn new(encoded: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
            title: title.into(),
            author: String::new(),
            duration_ms: 0,
            source: "generic".to_string(),
            seekable: false,
            stream: false,
            artwork_url: None,
            uri: None,
            requester: None,
            inserted_at: Utc::now(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_artwork(mut self, artwork_url: impl Into<String>) -> Self {
        self.artwork_url = Some(artwork_url.into());
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn duration(&self) -> Option<std::time::Duration> {
        if self.stream || self.duration_ms == 0 {
            None
        } else {
            Some(std::time::Duration::from_millis(self.duration_ms))
        }
    }
}
