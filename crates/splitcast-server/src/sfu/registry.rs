//! Track Registry
//!
//! Process-wide table of forwardable tracks, one slot per publisher and media
//! kind. All locking happens inside; callers only see snapshots.

use crate::transport::MediaKind;
use splitcast_protocol::ClientId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One registered track as seen through a snapshot
#[derive(Debug)]
pub struct TrackEntry<T> {
    pub owner: ClientId,
    pub kind: MediaKind,
    pub track: Arc<T>,
}

/// Point-in-time copy of registry entries; can be iterated any number of times
#[derive(Debug)]
pub struct TrackSnapshot<T> {
    entries: Vec<TrackEntry<T>>,
}

impl<T> TrackSnapshot<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, TrackEntry<T>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a TrackSnapshot<T> {
    type Item = &'a TrackEntry<T>;
    type IntoIter = std::slice::Iter<'a, TrackEntry<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub struct TrackRegistry<T> {
    tracks: RwLock<HashMap<(ClientId, MediaKind), Arc<T>>>,
}

impl<T> TrackRegistry<T> {
    pub fn new() -> Self {
        Self {
            tracks: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the track for a publisher/kind pair
    pub async fn register(&self, owner: ClientId, kind: MediaKind, track: Arc<T>) {
        self.register_if(owner, kind, track, || true).await;
    }

    /// Register only if `live()` still holds once the write lock is taken.
    /// Returns whether the track was stored.
    pub async fn register_if<F>(&self, owner: ClientId, kind: MediaKind, track: Arc<T>, live: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut tracks = self.tracks.write().await;
        if !live() {
            return false;
        }

        if tracks.insert((owner.clone(), kind), track).is_some() {
            tracing::info!("Replaced {} track of {} in registry", kind, owner);
        } else {
            tracing::debug!("Registered {} track of {}", kind, owner);
        }
        true
    }

    /// Remove the slot only while it still holds this exact track
    pub async fn unregister(&self, owner: &ClientId, kind: MediaKind, track: &Arc<T>) -> bool {
        let mut tracks = self.tracks.write().await;
        let key = (owner.clone(), kind);

        match tracks.get(&key) {
            Some(current) if Arc::ptr_eq(current, track) => {
                tracks.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Every registered track not owned by `exclude`, ordered by owner and kind
    pub async fn all_except(&self, exclude: &ClientId) -> TrackSnapshot<T> {
        let mut entries: Vec<TrackEntry<T>> = self
            .tracks
            .read()
            .await
            .iter()
            .filter(|((owner, _), _)| owner != exclude)
            .map(|((owner, kind), track)| TrackEntry {
                owner: owner.clone(),
                kind: *kind,
                track: track.clone(),
            })
            .collect();

        entries.sort_by(|a, b| (&a.owner, a.kind).cmp(&(&b.owner, b.kind)));
        TrackSnapshot { entries }
    }

    /// Remove all tracks of a publisher, returning how many were removed
    pub async fn remove_all_for(&self, owner: &ClientId) -> usize {
        let mut tracks = self.tracks.write().await;
        let before = tracks.len();
        tracks.retain(|(track_owner, _), _| track_owner != owner);
        before - tracks.len()
    }

    pub async fn contains(&self, owner: &ClientId) -> bool {
        self.tracks
            .read()
            .await
            .keys()
            .any(|(track_owner, _)| track_owner == owner)
    }

    pub async fn len(&self) -> usize {
        self.tracks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tracks.read().await.is_empty()
    }
}

impl<T> Default for TrackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ClientId {
        ClientId::from(s)
    }

    #[tokio::test]
    async fn test_register_replaces_same_kind() {
        let registry = TrackRegistry::new();
        registry
            .register(id("a"), MediaKind::Video, Arc::new("first"))
            .await;
        registry
            .register(id("a"), MediaKind::Video, Arc::new("second"))
            .await;
        registry
            .register(id("a"), MediaKind::Audio, Arc::new("mic"))
            .await;

        assert_eq!(registry.len().await, 2);

        let snapshot = registry.all_except(&id("b")).await;
        let tracks: Vec<&str> = snapshot.iter().map(|e| *e.track).collect();
        assert_eq!(tracks, vec!["mic", "second"]);
    }

    #[tokio::test]
    async fn test_all_except_skips_owner() {
        let registry = TrackRegistry::new();
        registry.register(id("a"), MediaKind::Video, Arc::new(1)).await;
        registry.register(id("b"), MediaKind::Video, Arc::new(2)).await;
        registry.register(id("b"), MediaKind::Audio, Arc::new(3)).await;

        let snapshot = registry.all_except(&id("b")).await;
        assert_eq!(snapshot.len(), 1);

        // Snapshot can be walked more than once
        for _ in 0..2 {
            let owners: Vec<&ClientId> = snapshot.iter().map(|e| &e.owner).collect();
            assert_eq!(owners, vec![&id("a")]);
        }

        assert!(registry.all_except(&id("c")).await.len() == 3);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_later_writes() {
        let registry = TrackRegistry::new();
        registry.register(id("a"), MediaKind::Video, Arc::new(1)).await;

        let snapshot = registry.all_except(&id("z")).await;
        registry.remove_all_for(&id("a")).await;
        registry.register(id("b"), MediaKind::Audio, Arc::new(2)).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.iter().next().map(|e| *e.track), Some(1));
    }

    #[tokio::test]
    async fn test_remove_all_for_is_idempotent() {
        let registry = TrackRegistry::new();
        registry.register(id("a"), MediaKind::Video, Arc::new(1)).await;
        registry.register(id("a"), MediaKind::Audio, Arc::new(2)).await;
        registry.register(id("b"), MediaKind::Audio, Arc::new(3)).await;

        assert_eq!(registry.remove_all_for(&id("a")).await, 2);
        assert_eq!(registry.remove_all_for(&id("a")).await, 0);
        assert!(!registry.contains(&id("a")).await);
        assert!(registry.contains(&id("b")).await);
    }

    #[tokio::test]
    async fn test_register_if_checks_under_lock() {
        let registry = TrackRegistry::new();

        assert!(!registry.register_if(id("a"), MediaKind::Video, Arc::new(1), || false).await);
        assert!(registry.is_empty().await);

        assert!(registry.register_if(id("a"), MediaKind::Video, Arc::new(2), || true).await);
        assert!(registry.contains(&id("a")).await);
    }

    #[tokio::test]
    async fn test_unregister_leaves_replacement_alone() {
        let registry = TrackRegistry::new();
        let stale = Arc::new(1);
        let live = Arc::new(2);

        registry.register(id("a"), MediaKind::Video, stale.clone()).await;
        registry.register(id("a"), MediaKind::Video, live.clone()).await;

        assert!(!registry.unregister(&id("a"), MediaKind::Video, &stale).await);
        assert_eq!(registry.len().await, 1);

        assert!(registry.unregister(&id("a"), MediaKind::Video, &live).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let registry = Arc::new(TrackRegistry::new());
        let mut handles = vec![];

        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let owner = ClientId::from(format!("client{}", i));
                registry.register(owner.clone(), MediaKind::Audio, Arc::new(i)).await;
                registry.register(owner, MediaKind::Video, Arc::new(i)).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len().await, 32);
        assert_eq!(registry.all_except(&id("client3")).await.len(), 30);
    }
}
