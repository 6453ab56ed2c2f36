use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

use crate::track::Track;

/// Modo de repetición de la cola. Tri-estado, no booleano.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

#[derive(Debug, Clone)]
struct Entry {
    /// Número de inserción, usado para restaurar el orden original al
    /// desactivar shuffle
    seq: u64,
    track: Track,
}

/// Cola ordenada de pistas resueltas con historial acotado.
///
/// Las manipulaciones por índice vienen de comandos de usuario, así que los
/// índices fuera de rango son no-ops que devuelven `None`/`false`, nunca un
/// pánico.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Entry>,
    current: Option<Track>,
    history: VecDeque<Track>,
    repeat: RepeatMode,
    shuffle: bool,
    next_seq: u64,
    max_size: usize,
    max_history: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize, max_history: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            history: VecDeque::new(),
            repeat: RepeatMode::Off,
            shuffle: false,
            next_seq: 0,
            max_size,
            max_history,
        }
    }

    /// Agrega una pista al final. Devuelve `false` si la cola está llena.
    pub fn add(&mut self, track: Track) -> bool {
        if self.items.len() >= self.max_size {
            debug!("📭 Cola llena, pista rechazada: {}", track.title);
            return false;
        }
        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(Entry {
            seq: self.next_seq,
            track,
        });
        self.next_seq += 1;
        true
    }

    /// Agrega varias pistas (playlist) y devuelve cuántas entraron.
    pub fn add_many(&mut self, tracks: Vec<Track>) -> usize {
        let available = self.max_size.saturating_sub(self.items.len());
        let accepted = tracks.len().min(available);
        for track in tracks.into_iter().take(accepted) {
            self.items.push_back(Entry {
                seq: self.next_seq,
                track,
            });
            self.next_seq += 1;
        }
        if accepted > 0 {
            info!("➕ Agregadas {} pistas a la cola", accepted);
        }
        accepted
    }

    /// Avanza a la siguiente pista según el modo de repetición.
    ///
    /// Exactamente una de tres progresiones aplica por llamada: repetición
    /// de pista (no consume), avance normal, o wraparound en modo Queue
    /// (la pista consumida se re-encola al final, así al agotar la
    /// secuencia se reinicia desde la primera pista original).
    pub fn next(&mut self) -> Option<Track> {
        if self.repeat == RepeatMode::Track {
            if let Some(current) = &self.current {
                info!("🔂 Repitiendo pista: {}", current.title);
                return Some(current.clone());
            }
        }

        if let Some(finished) = self.current.take() {
            self.push_history(finished);
        }

        let entry = self.items.pop_front()?;
        if self.repeat == RepeatMode::Queue {
            self.items.push_back(entry.clone());
        }
        self.current = Some(entry.track.clone());
        Some(entry.track)
    }

    /// Retrocede a la última pista del historial. La pista actual, si hay,
    /// vuelve al frente de la cola.
    pub fn previous(&mut self) -> Option<Track> {
        let prev = self.history.pop_back()?;
        if let Some(current) = self.current.take() {
            self.items.push_front(Entry {
                seq: self.next_seq,
                track: current,
            });
            self.next_seq += 1;
        }
        self.current = Some(prev.clone());
        Some(prev)
    }

    /// Elimina la pista en `index`. Fuera de rango devuelve `None` y la cola
    /// queda intacta.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.items.len() {
            return None;
        }
        self.items.remove(index).map(|entry| {
            debug!("❌ Pista eliminada en posición {}", index);
            entry.track
        })
    }

    /// Versión con índice firmado para entradas de usuario: los negativos
    /// son no-op.
    pub fn remove_at(&mut self, index: i64) -> Option<Track> {
        if index < 0 {
            return None;
        }
        self.remove(index as usize)
    }

    /// Mueve una pista de `from` a `to`. Fuera de rango devuelve `false`.
    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        if from != to {
            if let Some(entry) = self.items.remove(from) {
                self.items.insert(to, entry);
                debug!("📍 Pista movida de {} a {}", from, to);
            }
        }
        true
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Track => info!("🔂 Repetir pista activado"),
            RepeatMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    /// Activa o desactiva shuffle. Al activarlo se baraja el orden vivo; al
    /// desactivarlo se restaura el orden de inserción original, que se
    /// conserva en el número de secuencia de cada entrada.
    pub fn set_shuffle(&mut self, enabled: bool) {
        if self.shuffle == enabled {
            return;
        }
        self.shuffle = enabled;
        if enabled {
            let mut rng = rand::thread_rng();
            self.items.make_contiguous().shuffle(&mut rng);
            info!("🔀 Modo aleatorio activado");
        } else {
            self.items
                .make_contiguous()
                .sort_by_key(|entry| entry.seq);
            info!("➡️ Modo aleatorio desactivado, orden original restaurado");
        }
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Elimina pistas duplicadas por URI y devuelve cuántas quitó.
    pub fn clear_duplicates(&mut self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let before = self.items.len();
        self.items
            .retain(|entry| seen.insert(entry.track.uri.clone().unwrap_or_else(|| {
                entry.track.encoded.clone()
            })));
        let removed = before - self.items.len();
        if removed > 0 {
            info!("🗑️ Eliminados {} duplicados", removed);
        }
        removed
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, track: Option<Track>) {
        self.current = track;
    }

    pub fn history(&self) -> impl Iterator<Item = &Track> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.items.iter().map(|entry| entry.track.clone()).collect()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            items: self.tracks(),
            repeat: self.repeat,
            shuffle: self.shuffle,
            total_duration: self.total_duration(),
        }
    }

    fn total_duration(&self) -> Duration {
        let queued: Duration = self
            .items
            .iter()
            .filter_map(|entry| entry.track.duration())
            .sum();
        let current = self
            .current
            .as_ref()
            .and_then(|track| track.duration())
            .unwrap_or_default();
        queued + current
    }

    fn push_history(&mut self, track: Track) {
        self.history.push_back(track);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }
}

/// Vista inmutable de la cola para mostrar al usuario.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    /// Página de la cola para listados paginados (páginas desde 1).
    ///
    /// Entradas absurdas (`per_page` cero, página fuera de rango) devuelven
    /// una página vacía, nunca un pánico.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        if per_page == 0 {
            return QueuePage {
                items: Vec::new(),
                current_page: 1,
                total_pages: 1,
                total_items: self.items.len(),
            };
        }
        let safe_page = page.max(1);
        let start = safe_page.saturating_sub(1).saturating_mul(per_page);
        let end = start.saturating_add(per_page).min(self.items.len());
        let total_pages = if self.items.is_empty() {
            1
        } else {
            self.items.len().div_ceil(per_page)
        };
        QueuePage {
            items: if start < self.items.len() {
                self.items[start..end].to_vec()
            } else {
                Vec::new()
            },
            current_page: safe_page,
            total_pages,
            total_items: self.items.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> Track {
        Track::new(format!("enc-{title}"), title).with_uri(format!("https://x/{title}"))
    }

    fn queue_with(titles: &[&str]) -> TrackQueue {
        let mut queue = TrackQueue::new(100, 50);
        for title in titles {
            assert!(queue.add(track(title)));
        }
        queue
    }

    fn titles(queue: &TrackQueue) -> Vec<String> {
        queue.tracks().into_iter().map(|t| t.title).collect()
    }

    #[test]
    fn next_consumes_in_insertion_order() {
        let mut queue = queue_with(&["a", "b", "c"]);
        assert_eq!(queue.next().unwrap().title, "a");
        assert_eq!(queue.next().unwrap().title, "b");
        assert_eq!(queue.next().unwrap().title, "c");
        assert!(queue.next().is_none());
    }

    #[test]
    fn repeat_off_returns_none_when_exhausted() {
        let mut queue = queue_with(&["a"]);
        assert!(queue.next().is_some());
        assert!(queue.next().is_none());
    }

    #[test]
    fn repeat_track_replays_without_consuming() {
        let mut queue = queue_with(&["a", "b"]);
        assert_eq!(queue.next().unwrap().title, "a");
        queue.set_repeat(RepeatMode::Track);
        assert_eq!(queue.next().unwrap().title, "a");
        assert_eq!(queue.next().unwrap().title, "a");
        assert_eq!(queue.len(), 1);

        queue.set_repeat(RepeatMode::Off);
        assert_eq!(queue.next().unwrap().title, "b");
    }

    #[test]
    fn repeat_queue_wraps_around_to_first_track() {
        let mut queue = queue_with(&["t1", "t2", "t3"]);
        queue.set_repeat(RepeatMode::Queue);

        let seen: Vec<String> = (0..4).filter_map(|_| queue.next()).map(|t| t.title).collect();
        assert_eq!(seen, vec!["t1", "t2", "t3", "t1"]);
    }

    #[test]
    fn shuffle_roundtrip_restores_insertion_order() {
        let names: Vec<String> = (0..20).map(|i| format!("pista-{i:02}")).collect();
        let mut queue = TrackQueue::new(100, 50);
        for name in &names {
            queue.add(track(name));
        }

        queue.set_shuffle(true);
        queue.set_shuffle(false);
        assert_eq!(titles(&queue), names);
    }

    #[test]
    fn shuffle_keeps_same_track_set() {
        let mut queue = queue_with(&["a", "b", "c", "d"]);
        queue.set_shuffle(true);
        let mut shuffled = titles(&queue);
        shuffled.sort();
        assert_eq!(shuffled, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn remove_out_of_range_is_noop() {
        let mut queue = queue_with(&["a", "b"]);
        assert!(queue.remove_at(-1).is_none());
        assert!(queue.remove(2).is_none());
        assert_eq!(queue.len(), 2);
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn remove_in_range_returns_track() {
        let mut queue = queue_with(&["a", "b", "c"]);
        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.title, "b");
        assert_eq!(titles(&queue), vec!["a", "c"]);
    }

    #[test]
    fn move_track_bounds_checked() {
        let mut queue = queue_with(&["a", "b", "c"]);
        assert!(!queue.move_track(0, 3));
        assert!(queue.move_track(0, 2));
        assert_eq!(titles(&queue), vec!["b", "c", "a"]);
    }

    #[test]
    fn previous_walks_history() {
        let mut queue = queue_with(&["a", "b"]);
        queue.next();
        queue.next();

        let prev = queue.previous().unwrap();
        assert_eq!(prev.title, "a");
        // la pista que estaba sonando vuelve al frente
        assert_eq!(titles(&queue), vec!["b"]);
    }

    #[test]
    fn history_is_bounded() {
        let mut queue = TrackQueue::new(100, 3);
        for i in 0..10 {
            queue.add(track(&format!("t{i}")));
        }
        for _ in 0..10 {
            queue.next();
        }
        queue.next(); // descarta la última actual hacia el historial
        assert!(queue.history().count() <= 3);
    }

    #[test]
    fn full_queue_rejects_adds() {
        let mut queue = TrackQueue::new(2, 50);
        assert!(queue.add(track("a")));
        assert!(queue.add(track("b")));
        assert!(!queue.add(track("c")));
        assert_eq!(queue.add_many(vec![track("d"), track("e")]), 0);
    }

    #[test]
    fn clear_duplicates_by_uri() {
        let mut queue = TrackQueue::new(100, 50);
        queue.add(track("a"));
        queue.add(track("a"));
        queue.add(track("b"));
        assert_eq!(queue.clear_duplicates(), 1);
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn snapshot_pages_are_bounds_safe() {
        let queue = queue_with(&["a", "b", "c", "d", "e"]);
        let snapshot = queue.snapshot();

        let first = snapshot.page(1, 2);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total_pages, 3);

        let beyond = snapshot.page(99, 2);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_items, 5);
    }

    #[test]
    fn degenerate_page_sizes_do_not_panic() {
        let queue = queue_with(&["a", "b", "c"]);
        let snapshot = queue.snapshot();

        let zero = snapshot.page(1, 0);
        assert!(zero.items.is_empty());
        assert_eq!(zero.total_pages, 1);
        assert_eq!(zero.total_items, 3);

        let huge = snapshot.page(usize::MAX, usize::MAX);
        assert!(huge.items.is_empty());
        assert_eq!(huge.total_items, 3);
    }
}
