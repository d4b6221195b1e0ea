//! Mémoire des deux dernières résolutions
//!
//! Les lectures successives d'une même piste (un segment après l'autre)
//! réutilisent l'URL déjà résolue au lieu de rappeler `/player`. Deux
//! emplacements suffisent : la piste courante et celle qui vient d'être
//! préchargée. Le plus ancien est écrasé en premier.

use std::time::Instant;

pub const RING_CAPACITY: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEntry {
    pub key: String,
    pub url: String,
    pub itag: u32,
    pub content_length: Option<u64>,
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct RecentResolutions {
    slots: [Option<RingEntry>; RING_CAPACITY],
    next: usize,
}

impl RecentResolutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entrée valide pour `key` à l'instant `now`
    pub fn get(&self, key: &str, now: Instant) -> Option<&RingEntry> {
        self.slots
            .iter()
            .flatten()
            .find(|e| e.key == key && e.expires_at > now)
    }

    /// Ajoute une entrée ; une entrée existante pour la même clé est
    /// rafraîchie sur place, sinon l'emplacement le plus ancien est écrasé.
    pub fn push(&mut self, entry: RingEntry) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|e| e.key == entry.key))
        {
            *slot = Some(entry);
            return;
        }
        self.slots[self.next] = Some(entry);
        self.next = (self.next + 1) % RING_CAPACITY;
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let mut removed = false;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|e| e.key == key) {
                *slot = None;
                removed = true;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(key: &str, url: &str, ttl: Duration) -> RingEntry {
        RingEntry {
            key: key.into(),
            url: url.into(),
            itag: 251,
            content_length: None,
            expires_at: Instant::now() + ttl,
        }
    }

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_oldest_is_overwritten_first() {
        let mut ring = RecentResolutions::new();
        ring.push(entry("a", "ua", TTL));
        ring.push(entry("b", "ub", TTL));
        ring.push(entry("c", "uc", TTL));

        let now = Instant::now();
        assert!(ring.get("a", now).is_none());
        assert_eq!(ring.get("b", now).unwrap().url, "ub");
        assert_eq!(ring.get("c", now).unwrap().url, "uc");
        assert_eq!(ring.len(), RING_CAPACITY);

        ring.push(entry("d", "ud", TTL));
        assert!(ring.get("b", Instant::now()).is_none());
        assert!(ring.get("c", Instant::now()).is_some());
    }

    #[test]
    fn test_same_key_is_refreshed_in_place() {
        let mut ring = RecentResolutions::new();
        ring.push(entry("a", "ua1", TTL));
        ring.push(entry("b", "ub", TTL));
        ring.push(entry("a", "ua2", TTL));

        let now = Instant::now();
        assert_eq!(ring.get("a", now).unwrap().url, "ua2");
        assert!(ring.get("b", now).is_some());
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let mut ring = RecentResolutions::new();
        ring.push(entry("a", "ua", Duration::ZERO));
        assert!(ring.get("a", Instant::now()).is_none());
    }

    #[test]
    fn test_remove() {
        let mut ring = RecentResolutions::new();
        ring.push(entry("a", "ua", TTL));
        assert!(ring.remove("a"));
        assert!(!ring.remove("a"));
        assert!(ring.is_empty());
    }
}
