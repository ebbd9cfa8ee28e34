use rand::seq::SliceRandom;

use crate::track::Track;

/// The active ordered collection that `next`/`previous` walk.
///
/// `order` is a permutation of indices into `tracks`: the identity while
/// shuffle is off, a random permutation while it is on.
#[derive(Clone, Debug, Default)]
pub struct TrackQueue {
    tracks: Vec<Track>,
    order: Vec<usize>,
    shuffled: bool,
}

impl TrackQueue {
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut queue = Self {
            tracks,
            ..Default::default()
        };
        queue.rebuild_order();
        queue
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
        self.rebuild_order();
    }

    pub fn set_shuffled(&mut self, shuffled: bool) {
        self.shuffled = shuffled;
        self.rebuild_order();
    }

    /// Tracks in play order.
    pub fn ordered(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().map(|&i| &self.tracks[i])
    }

    /// Wraps past the end. An unknown `current` starts from the first entry.
    pub fn next_after(&self, current: Option<&Track>) -> Option<&Track> {
        let n = self.order.len();
        if n == 0 {
            return None;
        }
        let pos = match self.position(current) {
            Some(p) => (p + 1) % n,
            None => 0,
        };
        Some(&self.tracks[self.order[pos]])
    }

    /// Wraps past the start. An unknown `current` starts from the last entry.
    pub fn previous_before(&self, current: Option<&Track>) -> Option<&Track> {
        let n = self.order.len();
        if n == 0 {
            return None;
        }
        let pos = match self.position(current) {
            Some(p) => (p + n - 1) % n,
            None => n - 1,
        };
        Some(&self.tracks[self.order[pos]])
    }

    /// Give a freshly saved track its identifier wherever it is queued.
    pub fn assign_id(&mut self, saved: &Track, id: &str) {
        for track in self.tracks.iter_mut().filter(|t| t.id.is_none() && t.same_media(saved)) {
            track.id = Some(id.to_owned());
        }
    }

    fn position(&self, current: Option<&Track>) -> Option<usize> {
        let current = current?;
        self.order.iter().position(|&i| self.tracks[i].same_media(current))
    }

    fn rebuild_order(&mut self) {
        self.order = (0..self.tracks.len()).collect();
        if self.shuffled {
            self.order.shuffle(&mut rand::rng());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn queue(n: usize) -> TrackQueue {
        TrackQueue::new(
            (0..n)
                .map(|i| Track::new(format!("t{i}"), format!("{i}.mp3")))
                .collect(),
        )
    }

    #[test]
    fn next_and_previous_wrap() {
        let q = queue(3);
        let first = &q.tracks()[0];
        let last = &q.tracks()[2];
        assert_eq!(q.next_after(Some(last)).map(|t| t.title.as_str()), Some("t0"));
        assert_eq!(q.previous_before(Some(first)).map(|t| t.title.as_str()), Some("t2"));
        assert_eq!(q.next_after(Some(first)).map(|t| t.title.as_str()), Some("t1"));
    }

    #[test]
    fn unknown_current_starts_at_the_edges() {
        let q = queue(3);
        let stray = Track::new("stray", "elsewhere.mp3");
        assert_eq!(q.next_after(Some(&stray)).map(|t| t.title.as_str()), Some("t0"));
        assert_eq!(q.previous_before(None).map(|t| t.title.as_str()), Some("t2"));
    }

    #[test]
    fn empty_queue_has_no_neighbours() {
        let q = TrackQueue::default();
        assert!(q.next_after(None).is_none());
        assert!(q.previous_before(None).is_none());
    }

    #[test]
    fn shuffled_walk_visits_every_track_once() {
        let mut q = queue(20);
        q.set_shuffled(true);
        let mut seen = HashSet::new();
        let mut current = q.next_after(None).cloned();
        for _ in 0..20 {
            let track = current.clone().unwrap();
            assert!(seen.insert(track.media_uri.clone()));
            current = q.next_after(Some(&track)).cloned();
        }
        assert_eq!(seen.len(), 20);

        q.set_shuffled(false);
        let titles: Vec<_> = q.ordered().map(|t| t.title.clone()).collect();
        assert_eq!(titles[0], "t0");
        assert_eq!(titles[19], "t19");
    }

    #[test]
    fn saved_ids_propagate_to_queued_copies() {
        let mut q = queue(2);
        let saved = q.tracks()[1].clone();
        q.assign_id(&saved, "77");
        assert_eq!(q.tracks()[1].id.as_deref(), Some("77"));
        assert_eq!(q.tracks()[0].id, None);
    }
}
