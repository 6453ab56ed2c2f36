//! # Sources Module
//!
//! Pure URL/platform classification for inbound queries.
//!
//! Given a free-text query or a URL, this module decides which platform it
//! belongs to, what kind of content it points at (track/album/playlist/
//! artist) and which search-engine prefix the upstream resolver should use.
//! Classification is a pure function: no I/O, no failure mode beyond
//! returning the "unknown" classification.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Plataformas reconocidas por el clasificador, en orden de prioridad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTubeMusic,
    YouTube,
    Spotify,
    SoundCloud,
    Deezer,
    AppleMusic,
    Twitch,
    Bandcamp,
    /// URL HTTP(S) bien formada pero de plataforma desconocida (stream directo)
    Http,
    /// Texto libre, no es una URL
    Generic,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Self::YouTubeMusic => "youtubemusic",
            Self::YouTube => "youtube",
            Self::Spotify => "spotify",
            Self::SoundCloud => "soundcloud",
            Self::Deezer => "deezer",
            Self::AppleMusic => "applemusic",
            Self::Twitch => "twitch",
            Self::Bandcamp => "bandcamp",
            Self::Http => "http",
            Self::Generic => "generic",
        }
    }

    /// Prefijo de motor de búsqueda para el resolver upstream.
    pub fn search_prefix(&self) -> Option<&'static str> {
        match self {
            Self::YouTubeMusic => Some("ytmsearch"),
            Self::YouTube => Some("ytsearch"),
            Self::Spotify => Some("spsearch"),
            Self::SoundCloud => Some("scsearch"),
            Self::Deezer => Some("dzsearch"),
            Self::AppleMusic => Some("amsearch"),
            Self::Bandcamp => Some("bcsearch"),
            Self::Twitch | Self::Http | Self::Generic => None,
        }
    }

    /// Cadena de motores alternativos propia de la plataforma, en orden.
    pub fn fallback_engines(&self) -> Vec<&'static str> {
        match self {
            Self::Spotify | Self::Deezer | Self::AppleMusic => vec!["ytsearch", "scsearch"],
            Self::YouTube | Self::YouTubeMusic => vec!["scsearch"],
            Self::SoundCloud | Self::Bandcamp => vec!["ytsearch"],
            Self::Twitch | Self::Http | Self::Generic => vec![],
        }
    }

    /// Plataforma a partir de un prefijo de motor ("ytsearch" -> YouTube).
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "ytsearch" => Some(Self::YouTube),
            "ytmsearch" => Some(Self::YouTubeMusic),
            "spsearch" => Some(Self::Spotify),
            "scsearch" => Some(Self::SoundCloud),
            "dzsearch" => Some(Self::Deezer),
            "amsearch" => Some(Self::AppleMusic),
            "bcsearch" => Some(Self::Bandcamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Track,
    Album,
    Playlist,
    Artist,
    Unknown,
}

/// Resultado de clasificar una query entrante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub platform: Platform,
    pub content_type: ContentType,
    /// Primer grupo de captura no vacío del patrón que reconoció la URL
    pub canonical_id: Option<String>,
    pub search_prefix: Option<&'static str>,
    pub is_valid_url: bool,
}

impl Classification {
    fn generic() -> Self {
        Self {
            platform: Platform::Generic,
            content_type: ContentType::Unknown,
            canonical_id: None,
            search_prefix: None,
            is_valid_url: false,
        }
    }
}

struct PlatformRules {
    platform: Platform,
    host: Regex,
    /// Patrones por tipo de contenido, probados en orden fijo
    content: Vec<(ContentType, Regex)>,
}

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("patrón de plataforma inválido")
}

static PLATFORM_TABLE: LazyLock<Vec<PlatformRules>> = LazyLock::new(|| {
    vec![
        PlatformRules {
            platform: Platform::YouTubeMusic,
            host: rx(r"^music\.youtube\.com$"),
            content: vec![
                (ContentType::Track, rx(r"[?&]v=([A-Za-z0-9_-]{11})")),
                (ContentType::Playlist, rx(r"[?&]list=([A-Za-z0-9_-]+)")),
                (ContentType::Artist, rx(r"/channel/([A-Za-z0-9_-]+)")),
            ],
        },
        PlatformRules {
            platform: Platform::YouTube,
            host: rx(r"^(?:www\.|m\.)?(?:youtube\.com|youtu\.be)$"),
            content: vec![
                (ContentType::Playlist, rx(r"[?&]list=([A-Za-z0-9_-]+)")),
                (ContentType::Track, rx(r"[?&]v=([A-Za-z0-9_-]{11})")),
                (ContentType::Track, rx(r"youtu\.be/([A-Za-z0-9_-]{11})")),
                (ContentType::Track, rx(r"/shorts/([A-Za-z0-9_-]{11})")),
                (ContentType::Artist, rx(r"/channel/([A-Za-z0-9_-]+)")),
                (ContentType::Artist, rx(r"/@([A-Za-z0-9_.-]+)")),
            ],
        },
        PlatformRules {
            platform: Platform::Spotify,
            host: rx(r"^open\.spotify\.com$"),
            content: vec![
                (
                    ContentType::Track,
                    rx(r"/(?:intl-[a-z]+/)?track/([A-Za-z0-9]+)"),
                ),
                (
                    ContentType::Album,
                    rx(r"/(?:intl-[a-z]+/)?album/([A-Za-z0-9]+)"),
                ),
                (
                    ContentType::Playlist,
                    rx(r"/(?:intl-[a-z]+/)?playlist/([A-Za-z0-9]+)"),
                ),
                (
                    ContentType::Artist,
                    rx(r"/(?:intl-[a-z]+/)?artist/([A-Za-z0-9]+)"),
                ),
            ],
        },
        PlatformRules {
            platform: Platform::SoundCloud,
            host: rx(r"^(?:www\.|on\.)?soundcloud\.com$"),
            content: vec![
                // sets/ va antes que track: el patrón de track también matchearía
                (
                    ContentType::Playlist,
                    rx(r"soundcloud\.com/[^/]+/sets/([^/?#]+)"),
                ),
                (ContentType::Track, rx(r"soundcloud\.com/[^/]+/([^/?#]+)")),
                (ContentType::Artist, rx(r"soundcloud\.com/([^/?#]+)/?$")),
            ],
        },
        PlatformRules {
            platform: Platform::Deezer,
            host: rx(r"^(?:www\.)?deezer\.com$"),
            content: vec![
                (ContentType::Track, rx(r"/(?:[a-z]{2}/)?track/(\d+)")),
                (ContentType::Album, rx(r"/(?:[a-z]{2}/)?album/(\d+)")),
                (ContentType::Playlist, rx(r"/(?:[a-z]{2}/)?playlist/(\d+)")),
                (ContentType::Artist, rx(r"/(?:[a-z]{2}/)?artist/(\d+)")),
            ],
        },
        PlatformRules {
            platform: Platform::AppleMusic,
            host: rx(r"^music\.apple\.com$"),
            content: vec![
                (ContentType::Track, rx(r"/album/[^/]+/\d+\?i=(\d+)")),
                (ContentType::Album, rx(r"/album/[^/]+/(\d+)")),
                (
                    ContentType::Playlist,
                    rx(r"/playlist/[^/]+/(pl\.[A-Za-z0-9-]+)"),
                ),
                (ContentType::Artist, rx(r"/artist/[^/]+/(\d+)")),
            ],
        },
        PlatformRules {
            platform: Platform::Twitch,
            host: rx(r"^(?:www\.)?twitch\.tv$"),
            content: vec![(ContentType::Track, rx(r"twitch\.tv/([^/?#]+)"))],
        },
        PlatformRules {
            platform: Platform::Bandcamp,
            host: rx(r"^[^.]+\.bandcamp\.com$"),
            content: vec![
                (ContentType::Track, rx(r"bandcamp\.com/track/([^/?#]+)")),
                (ContentType::Album, rx(r"bandcamp\.com/album/([^/?#]+)")),
            ],
        },
    ]
});

/// Parámetros de tracking que se eliminan antes de clasificar.
const TRACKING_PARAMS: &[&str] = &["si", "feature", "context", "pp", "ab_channel"];

static SPOTIFY_URI: LazyLock<Regex> =
    LazyLock::new(|| rx(r"^spotify:(track|album|playlist|artist):([A-Za-z0-9]+)$"));

/// Reescribe URIs `spotify:tipo:id` a su forma canónica HTTPS para que la
/// misma tabla de regex aplique a ambas formas.
fn rewrite_bare_uri(input: &str) -> Option<String> {
    let caps = SPOTIFY_URI.captures(input.trim())?;
    Some(format!("https://open.spotify.com/{}/{}", &caps[1], &caps[2]))
}

fn strip_tracking_params(url: &mut Url) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
    }
}

/// Clasifica una query entrante: plataforma, tipo de contenido, id canónico
/// y prefijo de motor.
///
/// Nunca falla: si la entrada no es una URL válida devuelve la clasificación
/// `generic` y el caller la trata como término de búsqueda contra el motor
/// por defecto.
pub fn classify(input: &str) -> Classification {
    let rewritten = rewrite_bare_uri(input);
    let candidate = rewritten.as_deref().unwrap_or(input).trim();

    let mut url = match Url::parse(candidate) {
        Ok(url) => url,
        Err(_) => return Classification::generic(),
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Classification::generic();
    }
    let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
        return Classification::generic();
    };

    strip_tracking_params(&mut url);
    let normalized = url.as_str();

    // La primera plataforma cuyo host matchea gana; dentro de ella, el primer
    // patrón de contenido que matchea decide tipo e id canónico.
    for rules in PLATFORM_TABLE.iter() {
        if !rules.host.is_match(&host) {
            continue;
        }
        for (content_type, pattern) in &rules.content {
            if let Some(caps) = pattern.captures(normalized) {
                let canonical_id = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().to_string())
                    .find(|s| !s.is_empty());
                return Classification {
                    platform: rules.platform,
                    content_type: *content_type,
                    canonical_id,
                    search_prefix: rules.platform.search_prefix(),
                    is_valid_url: true,
                };
            }
        }
        // Host conocido pero ruta irreconocible: se trata como stream directo
        break;
    }

    Classification {
        platform: Platform::Http,
        content_type: ContentType::Track,
        canonical_id: None,
        search_prefix: None,
        is_valid_url: true,
    }
}

/// Infere el nombre de plataforma a partir de la URI de una pista, para
/// rellenar el campo `source` cuando el upstream lo omite.
pub fn platform_from_uri(uri: &str) -> &'static str {
    classify(uri).platform.name()
}

/// Miniatura predecible de YouTube a partir del identificador del video.
pub fn youtube_artwork(identifier: &str) -> String {
    format!("https://i.ytimg.com/vi/{identifier}/hqdefault.jpg")
}
