//! Property tests for the core: click pairing, the increment size check,
//! viewport clamping and the window shift that follows a scroll.

use driftwm_core::click::ClickTracker;
use driftwm_core::config::Config;
use driftwm_core::event::Timestamp;
use driftwm_core::geometry::Geometry;
use driftwm_core::input::ActionKind;
use driftwm_core::mock::{self, MockBackend, ROOT};
use driftwm_core::screen::Screen;
use driftwm_core::window::{inc_size_check, Decor, DecorFlags, DecorStyle, ShadeChange, SizeHints, SizingState};
use driftwm_core::{Core, Handle};
use proptest::prelude::*;

fn decor() -> Decor {
    Decor::new(DecorFlags::all(), &DecorStyle::default())
}

proptest! {
    #[test]
    fn press_pairs_only_with_same_button_and_window(
        b1 in 1u32..6, b2 in 1u32..6,
        w1 in 2u32..5, w2 in 2u32..5,
        t in 0u32..100_000, gap in 0u32..1000,
    ) {
        let mut clicks = ClickTracker::new();
        prop_assert_eq!(clicks.press(b1, Handle(w1), Timestamp(t), 300), ActionKind::ButtonPress);
        let second = clicks.press(b2, Handle(w2), Timestamp(t.wrapping_add(gap)), 300);
        let pairs = b1 == b2 && w1 == w2 && gap < 300;
        prop_assert_eq!(second == ActionKind::DoubleClick, pairs);
    }

    #[test]
    fn third_quick_press_starts_over(button in 1u32..6, t in 0u32..100_000) {
        let mut clicks = ClickTracker::new();
        let w = Handle(7);
        let kinds: Vec<_> = (0..3)
            .map(|i| clicks.press(button, w, Timestamp(t + i * 10), 300))
            .collect();
        prop_assert_eq!(
            kinds,
            vec![ActionKind::ButtonPress, ActionKind::DoubleClick, ActionKind::ButtonPress]
        );
    }

    #[test]
    fn accepted_sizes_respect_hints(
        width in 50i32..400, height in 20i32..400,
        req_w in -50i32..800, req_h in -50i32..800,
        inc in 1i32..20, base in 0i32..40,
    ) {
        let hints = SizeHints {
            min_width: 50,
            min_height: 20,
            max_width: 600,
            max_height: 600,
            base_width: base,
            base_height: base,
            width_inc: inc,
            height_inc: inc,
            ..SizeHints::default()
        };
        let state = SizingState { width, height, shaded: false, hints: &hints, decor: decor() };
        if let Some(check) = inc_size_check(&state, req_w, req_h) {
            prop_assert!(check.width <= hints.max_width);
            if check.width != width {
                prop_assert_eq!((check.width - base) % inc, 0);
                prop_assert!(check.width <= req_w);
            }
            if check.shade == ShadeChange::None {
                prop_assert!(check.height <= hints.max_height);
            } else {
                prop_assert_eq!(check.height, decor().shaded_height());
            }
        }
    }

    #[test]
    fn unchanged_size_is_always_accepted(width in 50i32..600, height in 20i32..600, inc in 1i32..20) {
        let hints = SizeHints {
            min_width: 50,
            min_height: 20,
            max_width: 600,
            max_height: 600,
            width_inc: inc,
            height_inc: inc,
            base_width: width,
            base_height: height,
            ..SizeHints::default()
        };
        let state = SizingState { width, height, shaded: false, hints: &hints, decor: decor() };
        let check = inc_size_check(&state, width, height);
        prop_assert_eq!(check.map(|c| (c.width, c.height, c.shade)), Some((width, height, ShadeChange::None)));
    }

    #[test]
    fn snapped_size_is_stable(
        min in 1i32..60, inc in 1i32..20,
        kw in 0i32..40, kh in 0i32..40,
        req_w in 0i32..=800, req_h in 0i32..=800,
    ) {
        let max = min + 40 * inc;
        let hints = SizeHints {
            min_width: min,
            min_height: min,
            max_width: max,
            max_height: max,
            base_width: min,
            base_height: min,
            width_inc: inc,
            height_inc: inc,
            ..SizeHints::default()
        };
        let (width, height) = (min + kw * inc, min + kh * inc);
        let (req_w, req_h) = (min + req_w % (max - min + 1), min + req_h % (max - min + 1));
        let state = SizingState { width, height, shaded: false, hints: &hints, decor: decor() };
        if let Some(check) = inc_size_check(&state, req_w, req_h) {
            prop_assert_eq!(check.shade, ShadeChange::None);
            for size in [check.width, check.height] {
                prop_assert!(size >= min && size <= max);
                prop_assert_eq!((size - min) % inc, 0);
            }

            let again = SizingState { width: check.width, height: check.height, ..state };
            let second = inc_size_check(&again, check.width, check.height);
            prop_assert_eq!(
                second.map(|c| (c.width, c.height, c.shade)),
                Some((check.width, check.height, ShadeChange::None))
            );
        }
    }

    #[test]
    fn viewport_stays_inside_virtual_area(
        cols in 1i32..5, rows in 1i32..5,
        x in -5000i32..5000, y in -5000i32..5000,
    ) {
        let mut screen = Screen::new(Handle(1), 800, 600, cols, rows);
        let (old_x, old_y) = (screen.vx, screen.vy);
        let shift = screen.set_viewport(x, y);
        prop_assert!((0..=screen.vmax_x()).contains(&screen.vx));
        prop_assert!((0..=screen.vmax_y()).contains(&screen.vy));
        prop_assert_eq!(shift, (old_x - screen.vx, old_y - screen.vy));
        if (0..=screen.vmax_x()).contains(&x) {
            prop_assert_eq!(screen.vx, x);
        }
    }
}

fn scrolling_core(windows: &[(i32, i32, bool)]) -> Core<MockBackend> {
    let mut config = Config::default();
    config.general.virtual_x = 3;
    config.general.virtual_y = 2;
    let mut core = Core::new(config, MockBackend::new(800, 600)).unwrap();
    core.add_screen(ROOT, 800, 600);
    for &(x, y, sticky) in windows {
        let client = core.backend.create_client(Geometry::new(x, y, 120, 90));
        core.dispatch(mock::map_request(client));
        let id = core.state.window_by_client(client).unwrap();
        core.set_sticky(id, sticky);
    }
    core
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scrolling_shifts_all_but_sticky_windows(
        windows in prop::collection::vec((-900i32..2400, -600i32..1200, any::<bool>()), 1..6),
        start_x in 0i32..=1600, start_y in 0i32..=600,
        x in -1000i32..3000, y in -1000i32..2000,
    ) {
        let mut core = scrolling_core(&windows);
        core.move_viewport_to(0, start_x, start_y);
        let before: Vec<_> = core.state.windows.values().map(|w| (w.id, w.geometry, w.is_sticky())).collect();
        let (old_x, old_y) = (core.state.screens[0].vx, core.state.screens[0].vy);

        core.move_viewport_to(0, x, y);
        let screen = &core.state.screens[0];
        prop_assert_eq!(screen.vx, x.clamp(0, screen.vmax_x()));
        prop_assert_eq!(screen.vy, y.clamp(0, screen.vmax_y()));
        let (dx, dy) = (old_x - screen.vx, old_y - screen.vy);

        for (id, geometry, sticky) in before {
            let now = core.state.window(id).unwrap().geometry;
            if sticky {
                prop_assert_eq!(now, geometry);
            } else {
                prop_assert_eq!(now, geometry.translated(dx, dy));
            }
        }
        prop_assert!(core.state.validate_invariants().is_ok());
    }
}
