use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::catalog::{Song, ALL_CATEGORIES};
use crate::protocol::RepeatMode;

/// Label the original UI used for the unfiltered view; accepted as an alias of `all`.
const ALL_CATEGORIES_LABEL: &str = "전체";

/// Returns `true` when `category` selects the unfiltered view.
pub fn is_all_filter(category: &str) -> bool {
    category == ALL_CATEGORIES || category == ALL_CATEGORIES_LABEL
}

/// Ordered song list with a derived category view and the shuffle permutation over that view.
///
/// Indices come in two coordinate systems: *source* indices into the unfiltered song list and
/// *view* indices into the filtered list. Only source indices are ever stored by callers.
pub struct Playlist {
    songs: Vec<Song>,
    category: String,
    repeat_mode: RepeatMode,
    shuffle_enabled: bool,
    // Permutation of view indices
    shuffled_indices: Vec<usize>,
    rng: StdRng,
}

impl Playlist {
    pub fn new() -> Playlist {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Playlist {
        Playlist {
            songs: Vec::new(),
            category: ALL_CATEGORIES.to_string(),
            repeat_mode: RepeatMode::All,
            shuffle_enabled: false,
            shuffled_indices: Vec::new(),
            rng,
        }
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn get_song(&self, source_index: usize) -> Option<&Song> {
        self.songs.get(source_index)
    }

    pub fn num_songs(&self) -> usize {
        self.songs.len()
    }

    /// Replaces the whole sequence; the shuffle order follows the new view.
    pub fn replace_songs(&mut self, songs: Vec<Song>) {
        self.songs = songs;
        if self.shuffle_enabled {
            self.generate_shuffle_order();
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Switches the active category. Returns `false` when it was already active.
    pub fn set_category(&mut self, category: &str) -> bool {
        let category = if is_all_filter(category) {
            ALL_CATEGORIES
        } else {
            category
        };
        if self.category == category {
            return false;
        }
        self.category = category.to_string();
        if self.shuffle_enabled {
            self.generate_shuffle_order();
        }
        true
    }

    fn in_view(&self, song: &Song) -> bool {
        is_all_filter(&self.category) || song.category == self.category
    }

    /// Source indices of the filtered view, in list order.
    pub fn view_source_indices(&self) -> Vec<usize> {
        self.songs
            .iter()
            .enumerate()
            .filter(|(_, song)| self.in_view(song))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn filtered_songs(&self) -> Vec<&Song> {
        self.songs.iter().filter(|song| self.in_view(song)).collect()
    }

    pub fn view_len(&self) -> usize {
        self.songs.iter().filter(|song| self.in_view(song)).count()
    }

    pub fn source_index_of(&self, view_index: usize) -> Option<usize> {
        self.view_source_indices().get(view_index).copied()
    }

    pub fn view_index_of(&self, source_index: usize) -> Option<usize> {
        self.view_source_indices()
            .iter()
            .position(|&index| index == source_index)
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    pub fn is_shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle_enabled = enabled;
        if enabled {
            self.generate_shuffle_order();
        } else {
            self.shuffled_indices.clear();
        }
    }

    pub fn shuffled_indices(&self) -> &[usize] {
        &self.shuffled_indices
    }

    // Uniform random permutation of the current view
    fn generate_shuffle_order(&mut self) {
        let mut indices: Vec<usize> = (0..self.view_len()).collect();
        indices.shuffle(&mut self.rng);
        self.shuffled_indices = indices;
    }

    /// Next view index after `current`, or `None` when playback should stop.
    ///
    /// `current == None` means nothing from this view is playing; the first entry of the
    /// active order is returned.
    pub fn next_view_index(&self, current: Option<usize>) -> Option<usize> {
        let view_len = self.view_len();
        if view_len == 0 {
            return None;
        }

        if self.shuffle_enabled && !self.shuffled_indices.is_empty() {
            let position =
                current.and_then(|index| self.shuffled_indices.iter().position(|&i| i == index));
            match position {
                Some(position) if position + 1 < self.shuffled_indices.len() => {
                    Some(self.shuffled_indices[position + 1])
                }
                Some(_) if self.repeat_mode == RepeatMode::All => {
                    self.shuffled_indices.first().copied()
                }
                Some(_) => None,
                None => self.shuffled_indices.first().copied(),
            }
        } else {
            let next_index = current.map_or(0, |index| index + 1);
            if next_index < view_len {
                Some(next_index)
            } else if self.repeat_mode == RepeatMode::All {
                Some(0)
            } else {
                None
            }
        }
    }

    /// Previous view index before `current`. Never wraps.
    pub fn previous_view_index(&self, current: Option<usize>) -> Option<usize> {
        let current = current?;
        if self.shuffle_enabled && !self.shuffled_indices.is_empty() {
            let position = self.shuffled_indices.iter().position(|&i| i == current)?;
            position
                .checked_sub(1)
                .map(|previous| self.shuffled_indices[previous])
        } else {
            current.checked_sub(1)
        }
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_song as song;

    fn seeded_playlist(songs: Vec<Song>) -> Playlist {
        let mut playlist = Playlist::with_rng(StdRng::seed_from_u64(7));
        playlist.replace_songs(songs);
        playlist
    }

    fn mixed_songs() -> Vec<Song> {
        vec![
            song("a", "QT"),
            song("b", "주일"),
            song("c", "QT"),
            song("d", "기타"),
            song("e", "QT"),
        ]
    }

    #[test]
    fn test_filtered_view_is_order_preserving_subset() {
        let mut playlist = seeded_playlist(mixed_songs());
        assert_eq!(playlist.view_len(), 5);

        assert!(playlist.set_category("QT"));
        let ids: Vec<&str> = playlist
            .filtered_songs()
            .iter()
            .map(|song| song.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "c", "e"]);
        assert_eq!(playlist.view_source_indices(), vec![0, 2, 4]);
        assert_eq!(playlist.source_index_of(1), Some(2));
        assert_eq!(playlist.view_index_of(4), Some(2));
        assert_eq!(playlist.view_index_of(1), None);

        assert!(playlist.set_category("전체"));
        assert_eq!(playlist.category(), ALL_CATEGORIES);
        assert_eq!(playlist.view_len(), 5);
    }

    #[test]
    fn test_linear_next_cycles_back_with_repeat_all() {
        let playlist = seeded_playlist(mixed_songs());
        let mut index = Some(2);
        for _ in 0..playlist.view_len() {
            index = playlist.next_view_index(index);
        }
        assert_eq!(index, Some(2));
    }

    #[test]
    fn test_linear_next_stops_at_end_without_repeat_all() {
        let mut playlist = seeded_playlist(mixed_songs());
        playlist.set_repeat_mode(RepeatMode::Off);
        assert_eq!(playlist.next_view_index(Some(3)), Some(4));
        assert_eq!(playlist.next_view_index(Some(4)), None);
        playlist.set_repeat_mode(RepeatMode::One);
        assert_eq!(playlist.next_view_index(Some(4)), None);
    }

    #[test]
    fn test_next_without_current_starts_at_first_entry() {
        let mut playlist = seeded_playlist(mixed_songs());
        assert_eq!(playlist.next_view_index(None), Some(0));
        playlist.set_shuffle(true);
        assert_eq!(
            playlist.next_view_index(None),
            playlist.shuffled_indices().first().copied()
        );
    }

    #[test]
    fn test_shuffle_order_is_permutation_of_view() {
        let mut playlist = seeded_playlist(mixed_songs());
        playlist.set_category("QT");
        playlist.set_shuffle(true);
        let mut order = playlist.shuffled_indices().to_vec();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);

        playlist.set_category(ALL_CATEGORIES);
        let mut order = playlist.shuffled_indices().to_vec();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        playlist.set_shuffle(false);
        assert!(playlist.shuffled_indices().is_empty());
    }

    #[test]
    fn test_shuffle_follows_permutation_and_wraps_only_on_repeat_all() {
        let mut playlist = seeded_playlist(mixed_songs());
        playlist.set_shuffle(true);
        let order = playlist.shuffled_indices().to_vec();

        for pair in order.windows(2) {
            assert_eq!(playlist.next_view_index(Some(pair[0])), Some(pair[1]));
        }
        let last = *order.last().expect("non-empty order");
        assert_eq!(playlist.next_view_index(Some(last)), Some(order[0]));

        playlist.set_repeat_mode(RepeatMode::Off);
        assert_eq!(playlist.next_view_index(Some(last)), None);
    }

    #[test]
    fn test_replacing_songs_regenerates_shuffle_for_new_view() {
        let mut playlist = seeded_playlist(mixed_songs());
        playlist.set_shuffle(true);
        let mut songs = mixed_songs();
        songs.push(song("f", "QT"));
        playlist.replace_songs(songs);
        assert_eq!(playlist.shuffled_indices().len(), 6);
    }

    #[test]
    fn test_previous_never_wraps() {
        let mut playlist = seeded_playlist(mixed_songs());
        assert_eq!(playlist.previous_view_index(Some(0)), None);
        assert_eq!(playlist.previous_view_index(Some(3)), Some(2));
        assert_eq!(playlist.previous_view_index(None), None);

        playlist.set_shuffle(true);
        let order = playlist.shuffled_indices().to_vec();
        assert_eq!(playlist.previous_view_index(Some(order[0])), None);
        assert_eq!(playlist.previous_view_index(Some(order[2])), Some(order[1]));
    }

    #[test]
    fn test_empty_view_has_no_next() {
        let mut playlist = seeded_playlist(mixed_songs());
        playlist.set_category("금철");
        assert_eq!(playlist.view_len(), 0);
        assert_eq!(playlist.next_view_index(None), None);
    }
}
