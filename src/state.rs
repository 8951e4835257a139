//! Shared channel state
//!
//! The per-strip state table touched by the reconciliation loop, the
//! event dispatcher, and the surface's inbound MIDI callback. One mutex
//! guards the whole 8-entry table so that every read-then-write sequence
//! against a strip (deadband check, touch check, gain update) is a
//! critical section; the fields of a strip never race each other.
//!
//! The selected page carries an epoch counter: it is bumped on every
//! page switch, and long-running work (a reconciliation tick, an event
//! handler mid-await) snapshots it once and re-validates before writing,
//! so a stale tick can't clobber the new page's baselines.

use crate::page::{Page, STRIP_COUNT};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// State of one physical channel strip.
#[derive(Debug, Clone, Copy)]
pub struct StripState {
    /// Last value pushed to or observed on the physical fader (0-1000)
    pub fader_value: u16,
    /// Last value accepted after deadband filtering; baseline for the
    /// next deadband comparison (0-1000)
    pub last_stable_value: u16,
    pub is_muted: bool,
    /// True while a hand holds the motorized fader; written only by the
    /// surface's touch-sense decoder
    pub is_touched: bool,
    /// Last known preamp gain mirrored to the encoder LED ring
    pub gain_db: f32,
}

impl Default for StripState {
    fn default() -> Self {
        Self {
            fader_value: 0,
            last_stable_value: 0,
            is_muted: false,
            is_touched: false,
            gain_db: 0.0,
        }
    }
}

/// Shared state for all 8 strips plus the selected page.
pub struct SharedState {
    strips: Mutex<[StripState; STRIP_COUNT as usize]>,
    page: Mutex<Page>,
    page_epoch: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            strips: Mutex::new([StripState::default(); STRIP_COUNT as usize]),
            page: Mutex::new(Page::Main),
            page_epoch: AtomicU64::new(0),
        }
    }

    /// Snapshot the selected page and its epoch.
    ///
    /// Callers doing multi-step work act on this snapshot and check
    /// [`SharedState::epoch_is_current`] before writing results back.
    pub fn page(&self) -> (Page, u64) {
        let page = *self.page.lock();
        (page, self.page_epoch.load(Ordering::Acquire))
    }

    /// Switch to a new page, invalidating in-flight work on the old one.
    ///
    /// Returns the new epoch.
    pub fn set_page(&self, page: Page) -> u64 {
        let mut current = self.page.lock();
        *current = page;
        self.page_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether a snapshot taken at `epoch` is still current.
    pub fn epoch_is_current(&self, epoch: u64) -> bool {
        self.page_epoch.load(Ordering::Acquire) == epoch
    }

    /// Run `f` against one strip (1-8) as a critical section.
    ///
    /// Out-of-range strips get a throwaway default entry so callers
    /// don't need their own bounds checks.
    pub fn with_strip<R>(&self, strip: u8, f: impl FnOnce(&mut StripState) -> R) -> R {
        if (1..=STRIP_COUNT).contains(&strip) {
            let mut strips = self.strips.lock();
            f(&mut strips[(strip - 1) as usize])
        } else {
            f(&mut StripState::default())
        }
    }

    /// Copy of one strip's state (1-8).
    pub fn strip(&self, strip: u8) -> StripState {
        self.with_strip(strip, |s| *s)
    }

    pub fn is_touched(&self, strip: u8) -> bool {
        self.with_strip(strip, |s| s.is_touched)
    }

    pub fn set_touched(&self, strip: u8, touched: bool) {
        self.with_strip(strip, |s| s.is_touched = touched);
    }

    /// Reset fader/deadband baselines on all strips.
    ///
    /// Done on every page switch so the old page's baselines are never
    /// compared against the new page's values.
    pub fn reset_baselines(&self) {
        let mut strips = self.strips.lock();
        for strip in strips.iter_mut() {
            strip.fader_value = 0;
            strip.last_stable_value = 0;
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
