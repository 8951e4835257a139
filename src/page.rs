//! Page map
//!
//! Pure mapping from (page, strip) to the console/lighting target the
//! strip currently represents, plus the scribble-strip label and color
//! tables shown on each page. All per-page behavior differences live in
//! this table; the engine dispatches on the resolved target only.

use crate::console::FaderTarget;
use crate::surface::StripColor;

/// Number of physical channel strips on the surface.
pub const STRIP_COUNT: u8 = 8;

/// Logical page selected with the select buttons.
///
/// Select buttons 5-8 land on [`Page::Blank`]: the deployment leaves
/// those pages empty, but the buttons still exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Mics 1-4, matrix outputs 1-3, house lights
    Main,
    /// Console channels 9-16
    InputsLow,
    /// Console channels 17-24
    InputsHigh,
    /// DMX dimmers 1-8
    Dimmers,
    /// Undefined page (select buttons 5-8)
    Blank,
}

impl Page {
    /// Page selected by a select-button press on the given strip.
    pub fn from_select_strip(strip: u8) -> Page {
        match strip {
            1 => Page::Main,
            2 => Page::InputsLow,
            3 => Page::InputsHigh,
            4 => Page::Dimmers,
            _ => Page::Blank,
        }
    }

    /// The strip whose select LED marks this page, if any.
    pub fn select_strip(&self) -> Option<u8> {
        match self {
            Page::Main => Some(1),
            Page::InputsLow => Some(2),
            Page::InputsHigh => Some(3),
            Page::Dimmers => Some(4),
            Page::Blank => None,
        }
    }
}

/// What a strip is wired to on the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripTarget {
    /// A console fader (channel or matrix)
    Console(FaderTarget),
    /// House-lights proxy: reads the average of DMX channels 1-4,
    /// writes broadcast to all four
    HouseLights,
    /// A single DMX dimmer channel
    Dimmer(u16),
    /// Nothing on this page
    None,
}

/// Resolve the target for a strip (1-8) on a page.
pub fn resolve(page: Page, strip: u8) -> StripTarget {
    if !(1..=STRIP_COUNT).contains(&strip) {
        return StripTarget::None;
    }
    match page {
        Page::Main => match strip {
            1..=4 => StripTarget::Console(FaderTarget::Channel(strip)),
            5..=7 => StripTarget::Console(FaderTarget::Matrix(strip - 4)),
            _ => StripTarget::HouseLights,
        },
        Page::InputsLow => StripTarget::Console(FaderTarget::Channel(strip + 8)),
        Page::InputsHigh => StripTarget::Console(FaderTarget::Channel(strip + 16)),
        Page::Dimmers => StripTarget::Dimmer(strip as u16),
        Page::Blank => StripTarget::None,
    }
}

/// The console channel behind a strip's preamp gain, if the strip has one.
///
/// Matrix outputs and lighting strips have no controllable input source.
pub fn console_channel(page: Page, strip: u8) -> Option<u8> {
    match resolve(page, strip) {
        StripTarget::Console(FaderTarget::Channel(n)) => Some(n),
        _ => None,
    }
}

/// Scribble-strip labels for a page (7 characters max each).
pub fn labels(page: Page) -> [&'static str; 8] {
    match page {
        Page::Main => ["Mic 1", "Mic 2", "Media", "BT", "Main", "Foyer", "PA Ext", "Light"],
        Page::InputsLow => ["Ch 9", "Ch 10", "Ch 11", "Ch 12", "Ch 13", "Ch 14", "Ch 15", "Ch 16"],
        Page::InputsHigh => ["Ch 17", "Ch 18", "Ch 19", "Ch 20", "Ch 21", "Ch 22", "Ch 23", "Ch 24"],
        Page::Dimmers => ["Dim 1", "Dim 2", "Dim 3", "Dim 4", "Dim 5", "Dim 6", "Dim 7", "Dim 8"],
        Page::Blank => [""; 8],
    }
}

/// Scribble-strip backlight colors for a page.
pub fn colors(page: Page) -> [StripColor; 8] {
    use StripColor::*;
    match page {
        // Inputs cyan, media sources green/blue, outputs yellow, light magenta
        Page::Main => [Cyan, Cyan, Green, Blue, White, Yellow, Yellow, Magenta],
        Page::InputsLow => [Red; 8],
        Page::InputsHigh => [Green; 8],
        Page::Dimmers => [Magenta; 8],
        Page::Blank => [White; 8],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_page_layout() {
        assert_eq!(resolve(Page::Main, 1), StripTarget::Console(FaderTarget::Channel(1)));
        assert_eq!(resolve(Page::Main, 4), StripTarget::Console(FaderTarget::Channel(4)));
        assert_eq!(resolve(Page::Main, 5), StripTarget::Console(FaderTarget::Matrix(1)));
        assert_eq!(resolve(Page::Main, 7), StripTarget::Console(FaderTarget::Matrix(3)));
        assert_eq!(resolve(Page::Main, 8), StripTarget::HouseLights);
    }

    #[test]
    fn input_bank_offsets() {
        assert_eq!(resolve(Page::InputsLow, 1), StripTarget::Console(FaderTarget::Channel(9)));
        assert_eq!(resolve(Page::InputsLow, 8), StripTarget::Console(FaderTarget::Channel(16)));
        assert_eq!(resolve(Page::InputsHigh, 1), StripTarget::Console(FaderTarget::Channel(17)));
        assert_eq!(resolve(Page::InputsHigh, 8), StripTarget::Console(FaderTarget::Channel(24)));
    }

    #[test]
    fn dimmer_page_maps_strip_to_channel() {
        for strip in 1..=8 {
            assert_eq!(resolve(Page::Dimmers, strip), StripTarget::Dimmer(strip as u16));
        }
    }

    #[test]
    fn blank_page_has_no_targets() {
        for strip in 1..=8 {
            assert_eq!(resolve(Page::Blank, strip), StripTarget::None);
        }
    }

    #[test]
    fn out_of_range_strip_resolves_to_none() {
        assert_eq!(resolve(Page::Main, 0), StripTarget::None);
        assert_eq!(resolve(Page::Main, 9), StripTarget::None);
    }

    #[test]
    fn gain_capable_strips() {
        // Matrix and lighting strips have no preamp
        assert_eq!(console_channel(Page::Main, 1), Some(1));
        assert_eq!(console_channel(Page::Main, 5), None);
        assert_eq!(console_channel(Page::Main, 8), None);
        assert_eq!(console_channel(Page::InputsLow, 3), Some(11));
        assert_eq!(console_channel(Page::Dimmers, 1), None);
    }

    #[test]
    fn select_strip_round_trip() {
        for strip in 1..=4 {
            assert_eq!(Page::from_select_strip(strip).select_strip(), Some(strip));
        }
        assert_eq!(Page::from_select_strip(6), Page::Blank);
        assert_eq!(Page::Blank.select_strip(), None);
    }

    #[test]
    fn labels_fit_the_display() {
        for page in [Page::Main, Page::InputsLow, Page::InputsHigh, Page::Dimmers] {
            for label in labels(page) {
                assert!(label.len() <= 7, "label '{label}' too long");
            }
        }
    }
}
