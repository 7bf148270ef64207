use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channels::{Catalog, Channel};
use crate::filter::{CategoryMatch, FilterCriteria};
use crate::player::{Playback, PlayerHints};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// What happens to the selection when a new filter hides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfViewPolicy {
    /// Keep playing the hidden channel.
    #[default]
    Keep,
    /// Fall back to the first channel of the new view (or nothing).
    Reset,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_step")]
    pub page_step: usize,
    #[serde(default)]
    pub out_of_view: OutOfViewPolicy,
    #[serde(default)]
    pub category_match: CategoryMatch,
    /// Seconds without any request after which a session is dropped; 0 keeps
    /// sessions until they are deleted.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_page_size() -> usize {
    10
}

fn default_page_step() -> usize {
    10
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_step: default_page_step(),
            out_of_view: OutOfViewPolicy::default(),
            category_match: CategoryMatch::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Empty,
    /// `index` is the position in the view at the time of the last selection,
    /// `None` when the channel was not part of it.
    Selected { channel: Channel, index: Option<usize> },
}

/// Filter, pagination and selection state for one UI surface.
///
/// The catalog is shared, never copied; every query re-derives the view from
/// it and the current criteria.
pub struct CatalogSession {
    catalog: Arc<Catalog>,
    criteria: FilterCriteria,
    limit: usize,
    selection: Selection,
    config: SessionConfig,
}

impl CatalogSession {
    pub fn new(catalog: Arc<Catalog>, config: SessionConfig) -> Self {
        let mut session = Self {
            catalog,
            criteria: FilterCriteria::default(),
            limit: config.page_size,
            selection: Selection::Empty,
            config,
        };
        session.select_default();
        session
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected(&self) -> Option<&Channel> {
        match &self.selection {
            Selection::Selected { channel, .. } => Some(channel),
            Selection::Empty => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self.selection {
            Selection::Selected { index, .. } => index,
            Selection::Empty => None,
        }
    }

    /// Channels matching the current criteria, before pagination.
    pub fn view(&self) -> Vec<&Channel> {
        self.criteria
            .apply(self.catalog.as_ref(), self.config.category_match)
    }

    pub fn apply_filter(&mut self, criteria: FilterCriteria) -> Vec<&Channel> {
        debug!("Applying filter {:?} to {}", criteria, self.catalog.source());
        self.criteria = criteria;

        if self.config.out_of_view == OutOfViewPolicy::Reset {
            if let Selection::Selected { channel, .. } = &self.selection {
                let position = self.view().iter().position(|c| *c == channel);
                self.selection = match position {
                    Some(index) => Selection::Selected {
                        channel: channel.clone(),
                        index: Some(index),
                    },
                    None => Selection::Empty,
                };
            }
        }

        self.select_default();
        self.view()
    }

    /// The first `limit` channels of the view.
    pub fn page(&self) -> Vec<&Channel> {
        let mut view = self.view();
        view.truncate(self.limit);
        view
    }

    /// Whether the view holds more channels than the page shows.
    pub fn has_more(&self) -> bool {
        self.limit < self.view().len()
    }

    pub fn grow_page(&mut self) {
        self.grow_page_by(self.config.page_step);
    }

    pub fn grow_page_by(&mut self, step: usize) {
        self.limit = self.limit.saturating_add(step);
    }

    pub fn select(&mut self, channel: &Channel) {
        let index = self.view().iter().position(|c| *c == channel);
        debug!("Selected {} (index={:?})", channel.name, index);
        self.selection = Selection::Selected {
            channel: channel.clone(),
            index,
        };
    }

    /// Moves the selection one step through the current view, wrapping at
    /// both ends. No-op on an empty view.
    pub fn advance(&mut self, direction: Direction) {
        let view = self.view();
        let len = view.len();
        if len == 0 {
            return;
        }

        let current = match self.selection {
            Selection::Selected { index: Some(i), .. } => Some(i % len),
            _ => None,
        };
        let next = match (current, direction) {
            (Some(i), Direction::Forward) => (i + 1) % len,
            (Some(i), Direction::Backward) => (i + len - 1) % len,
            (None, Direction::Forward) => 0,
            (None, Direction::Backward) => len - 1,
        };

        let channel = view[next].clone();
        debug!("Advanced {:?} to {} (index={})", direction, channel.name, next);
        self.selection = Selection::Selected {
            channel,
            index: Some(next),
        };
    }

    pub fn playback(&self, hints: &PlayerHints) -> Option<Playback> {
        self.selected().map(|channel| Playback::new(&channel.url, hints))
    }

    fn select_default(&mut self) {
        if self.selection != Selection::Empty {
            return;
        }
        let first = self.view().first().map(|c| (*c).clone());
        if let Some(channel) = first {
            self.selection = Selection::Selected {
                channel,
                index: Some(0),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_of(count: usize) -> Arc<Catalog> {
        let channels = (0..count)
            .map(|i| Channel::new(format!("Channel {i}"), format!("http://ch{i}.test/live")))
            .collect();
        Arc::new(Catalog::new("mem://test", channels))
    }

    fn named(names: &[&str]) -> Arc<Catalog> {
        let channels = names
            .iter()
            .map(|name| Channel::new(*name, format!("http://{}.test", name.replace(' ', "-"))))
            .collect();
        Arc::new(Catalog::new("mem://named", channels))
    }

    #[test]
    fn test_page_grows_until_view_is_exhausted() {
        let mut session = CatalogSession::new(catalog_of(25), SessionConfig::default());
        assert_eq!(session.limit(), 10);
        assert_eq!(session.page().len(), 10);
        assert!(session.has_more());

        session.grow_page();
        session.grow_page();
        assert_eq!(session.limit(), 30);
        assert_eq!(session.page().len(), 25);
        assert!(!session.has_more());
    }

    #[test]
    fn test_page_len_is_min_of_limit_and_view() {
        for page_size in [0, 1, 5, 7, 8, 100] {
            let config = SessionConfig {
                page_size,
                ..SessionConfig::default()
            };
            let session = CatalogSession::new(catalog_of(7), config);
            assert_eq!(session.page().len(), page_size.min(7));
        }
    }

    #[test]
    fn test_grow_page_is_monotonic() {
        let mut session = CatalogSession::new(catalog_of(3), SessionConfig::default());
        for step in [0, 1, 10, usize::MAX] {
            let before = session.limit();
            session.grow_page_by(step);
            assert!(session.limit() >= before);
        }
        assert_eq!(session.limit(), usize::MAX);
    }

    #[test]
    fn test_defaults_to_first_channel() {
        let session = CatalogSession::new(named(&["A", "B"]), SessionConfig::default());
        assert_eq!(session.selected().map(|c| c.name.as_str()), Some("A"));
        assert_eq!(session.index(), Some(0));

        let empty = CatalogSession::new(catalog_of(0), SessionConfig::default());
        assert_eq!(empty.selection(), &Selection::Empty);
    }

    #[test]
    fn test_advance_wraps_and_round_trips() {
        let mut session = CatalogSession::new(named(&["A", "B", "C"]), SessionConfig::default());
        session.advance(Direction::Backward);
        assert_eq!(session.selected().unwrap().name, "C");
        assert_eq!(session.index(), Some(2));

        session.advance(Direction::Forward);
        assert_eq!(session.selected().unwrap().name, "A");
        assert_eq!(session.index(), Some(0));

        for len in 1..5 {
            let mut session = CatalogSession::new(catalog_of(len), SessionConfig::default());
            for start in 0..len {
                let channel = session.view()[start].clone();
                session.select(&channel);
                session.advance(Direction::Forward);
                session.advance(Direction::Backward);
                assert_eq!(session.index(), Some(start));
                assert_eq!(session.selected(), Some(&channel));
            }
        }
    }

    #[test]
    fn test_advance_on_empty_view_is_noop() {
        let mut session = CatalogSession::new(named(&["A", "B"]), SessionConfig::default());
        session.apply_filter(FilterCriteria::search("zzz"));
        let before = session.selection().clone();
        session.advance(Direction::Forward);
        session.advance(Direction::Backward);
        assert_eq!(session.selection(), &before);

        let mut empty = CatalogSession::new(catalog_of(0), SessionConfig::default());
        empty.advance(Direction::Forward);
        assert_eq!(empty.selection(), &Selection::Empty);
    }

    #[test]
    fn test_selection_sticks_when_filtered_out() {
        let mut session = CatalogSession::new(
            named(&["BBC News", "Sports HD", "World News Live"]),
            SessionConfig::default(),
        );
        let sports = session.view()[1].clone();
        session.select(&sports);

        let view: Vec<String> = session
            .apply_filter(FilterCriteria::search("news"))
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(view, vec!["BBC News", "World News Live"]);
        assert_eq!(session.selected(), Some(&sports));
    }

    #[test]
    fn test_reset_policy_follows_the_view() {
        let config = SessionConfig {
            out_of_view: OutOfViewPolicy::Reset,
            ..SessionConfig::default()
        };
        let mut session = CatalogSession::new(
            named(&["BBC News", "Sports HD", "World News Live"]),
            config,
        );
        let world = session.view()[2].clone();
        session.select(&world);

        session.apply_filter(FilterCriteria::search("news"));
        assert_eq!(session.selected(), Some(&world));
        assert_eq!(session.index(), Some(1));

        session.apply_filter(FilterCriteria::search("sports"));
        assert_eq!(session.selected().unwrap().name, "Sports HD");
        assert_eq!(session.index(), Some(0));

        session.apply_filter(FilterCriteria::search("nothing"));
        assert_eq!(session.selection(), &Selection::Empty);
    }

    #[test]
    fn test_select_outside_view_has_no_index() {
        let mut session = CatalogSession::new(named(&["A", "B", "C"]), SessionConfig::default());
        session.apply_filter(FilterCriteria::search("b"));
        let stranger = Channel::new("Elsewhere", "http://elsewhere.test");
        session.select(&stranger);
        assert_eq!(session.selected(), Some(&stranger));
        assert_eq!(session.index(), None);

        session.advance(Direction::Forward);
        assert_eq!(session.selected().unwrap().name, "B");
        assert_eq!(session.index(), Some(0));
    }

    #[test]
    fn test_filter_then_populate_defaults_selection() {
        let mut session = CatalogSession::new(named(&["A", "B"]), SessionConfig::default());
        session.apply_filter(FilterCriteria::search("b"));
        // Selection was already made at construction and stays on "A".
        assert_eq!(session.selected().unwrap().name, "A");
        assert_eq!(session.page().len(), 1);
        assert_eq!(session.criteria(), &FilterCriteria::search("b"));
    }

    #[test]
    fn test_playback_uses_selected_url() {
        let mut session = CatalogSession::new(named(&["A", "B"]), SessionConfig::default());
        session.advance(Direction::Forward);
        let playback = session.playback(&PlayerHints::default()).unwrap();
        assert_eq!(playback.url, "http://B.test");

        let empty = CatalogSession::new(catalog_of(0), SessionConfig::default());
        assert!(empty.playback(&PlayerHints::default()).is_none());
    }

    #[test]
    fn test_idle_timeout_zero_disables_expiry() {
        assert_eq!(SessionConfig::default().idle_timeout(), Some(Duration::from_secs(1800)));
        let config = SessionConfig {
            idle_timeout_secs: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.idle_timeout(), None);
    }
}
