/// Scroll-preserving consumer of the open conversation's message window.
///
/// Front ends measure their rendered content after every frame and feed the
/// height back through [`MessageListView::sync`]; heights are in whatever unit
/// the front end scrolls by (terminal rows, pixels).
use crate::config::Config;
use crate::cursor::Cursor;
use crate::model::{DeliveryStatus, Message};
use crate::state::{ChatState, LoadStatus};
use crate::throttle::Throttle;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::debug;

pub const EMPTY_PLACEHOLDER: &str = "No messages yet. Start the conversation!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Foreign messages
    Leading,
    /// The viewer's own messages
    Trailing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: String,
    pub own: bool,
    pub align: Alignment,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Only set on own messages
    pub status_glyph: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListBody {
    /// No conversation open
    Closed,
    /// First page in flight
    Loading,
    /// Loaded, zero messages
    Empty,
    Rows(Vec<MessageRow>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    ToBottom,
    /// Offset advanced by the height of prepended content
    Anchored { delta: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlderPageRequest {
    pub conversation_id: String,
    pub cursor: Cursor,
}

pub fn status_glyph(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Sent => "✓",
        DeliveryStatus::Delivered => "✓✓",
        DeliveryStatus::Read => "✔✔",
    }
}

pub fn message_row(message: &Message, viewer_id: &str) -> MessageRow {
    let own = message.sender.id == viewer_id;
    MessageRow {
        id: message.id.clone(),
        own,
        align: if own { Alignment::Trailing } else { Alignment::Leading },
        sender_name: message.sender.display_name(),
        content: message.content.clone(),
        created_at: message.created_at,
        status_glyph: own.then(|| status_glyph(message.status)),
    }
}

/// Recorded right before an older-page request
#[derive(Debug, Clone)]
struct Anchor {
    completions_before: u64,
    height_before: usize,
}

#[derive(Debug, Clone)]
pub struct MessageListView {
    viewer_id: String,
    top_threshold: usize,
    throttle: Throttle,
    /// State generation the view was last armed for
    generation: Option<u64>,
    first_load_done: bool,
    sends_seen: u64,
    anchor: Option<Anchor>,
    offset: usize,
    content_height: usize,
    viewport_height: usize,
}

impl MessageListView {
    pub fn new(viewer_id: impl Into<String>, top_threshold: usize, throttle_window: Duration) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            top_threshold,
            throttle: Throttle::new(throttle_window),
            generation: None,
            first_load_done: false,
            sends_seen: 0,
            anchor: None,
            offset: 0,
            content_height: 0,
            viewport_height: 0,
        }
    }

    /// `unit_px` is the pixel height of one scroll unit of the front end
    /// (1 for pixel-based lists, roughly a line height for terminals).
    pub fn from_config(config: &Config, unit_px: usize) -> Self {
        Self::new(
            config.viewer_id.clone(),
            config.top_threshold_px.div_ceil(unit_px.max(1)),
            config.scroll_throttle,
        )
    }

    pub fn top_threshold(&self) -> usize {
        self.top_threshold
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn content_height(&self) -> usize {
        self.content_height
    }

    pub fn viewport_height(&self) -> usize {
        self.viewport_height
    }

    /// Largest valid offset (scrolled to the bottom)
    pub fn max_offset(&self) -> usize {
        self.content_height.saturating_sub(self.viewport_height)
    }

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn is_loading_older(&self) -> bool {
        self.anchor.is_some()
    }

    fn scroll_to(&mut self, offset: usize) {
        self.offset = offset.min(self.max_offset());
    }

    fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    /// Reconcile with the latest state after a render pass that measured
    /// `content_height`.
    ///
    /// Transitions are detected through counters on the state, so any number
    /// of them may happen between two calls.
    pub fn sync(&mut self, state: &ChatState, content_height: usize) -> Option<ScrollAction> {
        if self.generation != Some(state.generation()) {
            debug!(
                conversation_id = ?state.open.conversation_id,
                generation = state.generation(),
                "message view re-armed"
            );
            self.generation = Some(state.generation());
            self.first_load_done = false;
            self.sends_seen = state.sends_completed();
            self.anchor = None;
            self.throttle.reset();
            self.offset = 0;
        }
        self.content_height = content_height;

        let mut action = None;

        if let Some(anchor) = &self.anchor {
            if state.open.older_completions != anchor.completions_before {
                let delta = content_height.saturating_sub(anchor.height_before);
                self.anchor = None;
                // Failed or empty loads leave the offset alone; the next
                // scroll to the top retries
                if state.open.status != LoadStatus::Failed && delta > 0 {
                    self.scroll_to(self.offset + delta);
                    action = Some(ScrollAction::Anchored { delta });
                }
            }
        }

        let loading = state.open.status == LoadStatus::Loading;
        let sends = state.sends_completed();
        if !self.first_load_done && !state.open.messages.is_empty() && !loading {
            self.first_load_done = true;
            self.scroll_to_bottom();
            action = Some(ScrollAction::ToBottom);
        } else if self.first_load_done && sends != self.sends_seen {
            self.scroll_to_bottom();
            action = Some(ScrollAction::ToBottom);
        }
        self.sends_seen = sends;

        if action.is_none() {
            self.offset = self.offset.min(self.max_offset());
        }
        action
    }

    /// Scroll listener. Throttled; returns the older page to request when
    /// the viewport is near the top and more history exists.
    pub fn on_scroll(
        &mut self,
        offset: usize,
        now: Instant,
        state: &ChatState,
    ) -> Option<OlderPageRequest> {
        self.scroll_to(offset);
        if self.throttle.call(now) {
            self.check_load_more(state)
        } else {
            None
        }
    }

    /// Relative scroll, same semantics as [`MessageListView::on_scroll`]
    pub fn scroll_by(
        &mut self,
        delta: isize,
        now: Instant,
        state: &ChatState,
    ) -> Option<OlderPageRequest> {
        let target = if delta < 0 {
            self.offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.offset + delta as usize
        };
        self.on_scroll(target, now, state)
    }

    /// Trailing edge of the throttled scroll listener
    pub fn poll(&mut self, now: Instant, state: &ChatState) -> Option<OlderPageRequest> {
        if self.throttle.poll(now) {
            self.check_load_more(state)
        } else {
            None
        }
    }

    pub fn throttle_deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    fn check_load_more(&mut self, state: &ChatState) -> Option<OlderPageRequest> {
        if self.offset > self.top_threshold || self.anchor.is_some() {
            return None;
        }
        let conversation_id = state.open.conversation_id.clone()?;
        state.check_older_page(&conversation_id).ok()?;
        let cursor = state.open.cursor.next_cursor?;

        self.anchor = Some(Anchor {
            completions_before: state.open.older_completions,
            height_before: self.content_height,
        });
        debug!(%conversation_id, %cursor, height = self.content_height, "requesting older page");
        Some(OlderPageRequest {
            conversation_id,
            cursor,
        })
    }

    /// What the list area should show
    pub fn body(&self, state: &ChatState) -> ListBody {
        if state.open.conversation_id.is_none() {
            return ListBody::Closed;
        }
        if state.open.status == LoadStatus::Loading {
            return ListBody::Loading;
        }
        if state.open.messages.is_empty() {
            return ListBody::Empty;
        }
        ListBody::Rows(
            state
                .open
                .messages
                .iter()
                .map(|m| message_row(m, &self.viewer_id))
                .collect(),
        )
    }
}
