//! Double-click synthesis.

use crate::event::Timestamp;
use crate::input::ActionKind;
use crate::registry::Handle;

/// Memory of the last press, used to pair presses into double clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickTracker {
    /// Button of the most recent press, paired or not.
    pub last_button: u32,
    /// Window of the press a new one may pair with; [`Handle::NONE`] right
    /// after a double click so a third press starts over.
    pub last_window: Handle,
    pub last_time: Timestamp,
}

impl ClickTracker {
    pub const fn new() -> Self {
        Self {
            last_button: 0,
            last_window: Handle::NONE,
            last_time: Timestamp(0),
        }
    }

    /// Classify a press and return the tracker state after it.
    ///
    /// Same button on the same window within `interval_ms` of the remembered
    /// press gives [`ActionKind::DoubleClick`] and forgets the window;
    /// anything else records this press.
    #[must_use]
    pub fn classify(
        self,
        button: u32,
        window: Handle,
        time: Timestamp,
        interval_ms: u32,
    ) -> (Self, ActionKind) {
        let pairs = !window.is_none()
            && self.last_button == button
            && self.last_window == window
            && time.since(self.last_time) < interval_ms;

        if pairs {
            let next = Self {
                last_button: button,
                last_window: Handle::NONE,
                last_time: self.last_time,
            };
            (next, ActionKind::DoubleClick)
        } else {
            let next = Self {
                last_button: button,
                last_window: window,
                last_time: time,
            };
            (next, ActionKind::ButtonPress)
        }
    }

    /// Classify in place.
    pub fn press(&mut self, button: u32, window: Handle, time: Timestamp, interval_ms: u32) -> ActionKind {
        let (next, kind) = self.classify(button, window, time, interval_ms);
        *self = next;
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: Handle = Handle(0x40);

    #[test]
    fn test_two_quick_presses_pair() {
        let mut t = ClickTracker::new();
        assert_eq!(t.press(1, W, Timestamp(1000), 300), ActionKind::ButtonPress);
        assert_eq!(t.press(1, W, Timestamp(1200), 300), ActionKind::DoubleClick);
        assert_eq!(t.last_window, Handle::NONE);
    }

    #[test]
    fn test_third_press_does_not_pair() {
        let mut t = ClickTracker::new();
        t.press(1, W, Timestamp(1000), 300);
        t.press(1, W, Timestamp(1100), 300);
        assert_eq!(t.press(1, W, Timestamp(1150), 300), ActionKind::ButtonPress);
        assert_eq!(t.press(1, W, Timestamp(1200), 300), ActionKind::DoubleClick);
    }

    #[test]
    fn test_slow_or_different_presses_do_not_pair() {
        let mut t = ClickTracker::new();
        t.press(1, W, Timestamp(1000), 300);
        assert_eq!(t.press(1, W, Timestamp(1300), 300), ActionKind::ButtonPress);
        assert_eq!(t.press(3, W, Timestamp(1350), 300), ActionKind::ButtonPress);
        assert_eq!(t.last_button, 3);
        assert_eq!(
            t.press(3, Handle(0x41), Timestamp(1360), 300),
            ActionKind::ButtonPress
        );
    }

    #[test]
    fn test_pairs_across_clock_wrap() {
        let mut t = ClickTracker::new();
        t.press(2, W, Timestamp(u32::MAX - 50), 300);
        assert_eq!(t.press(2, W, Timestamp(100), 300), ActionKind::DoubleClick);
    }
}
