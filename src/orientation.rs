//! Projection of a preview-view region into sensor-frame crop fractions.
//!
//! The sensor is mounted landscape, a quarter turn from natural device-up. The
//! preview shows the frame upright and scaled to fill the view, anchored at the
//! view's top-left corner, so one frame axis may overflow the view.

use crate::geometry::{DeviceOrientation, NormalizedRect, Resolution, ViewRect};

/// Maps `region` (view pixels) to a crop rect in sensor-frame coordinates.
///
/// `None` selects the full frame. A degenerate region, or one that collapses
/// after clamping to the frame, yields [`NormalizedRect::EMPTY`].
pub fn project(
    region: Option<ViewRect>,
    view: Resolution,
    frame: Resolution,
    orientation: DeviceOrientation,
) -> NormalizedRect {
    let Some(region) = region else {
        return NormalizedRect::FULL;
    };
    if region.is_degenerate() {
        return NormalizedRect::EMPTY;
    }

    let shown = orientation.upright(frame);
    let (vw, vh) = (f64::from(view.width), f64::from(view.height));
    let (sw, sh) = (f64::from(shown.width), f64::from(shown.height));

    // Scale on the axis where the frame fills the view exactly; the other overflows.
    let ratio = if vw * sh < sw * vh { sh / vh } else { sw / vw };

    let edge = |px: i32, extent: f64| ((ratio * f64::from(px)) / extent).clamp(0.0, 1.0);
    let l = edge(region.left, sw);
    let t = edge(region.top, sh);
    let r = edge(region.right, sw);
    let b = edge(region.bottom, sh);
    if l >= r || t >= b {
        return NormalizedRect::EMPTY;
    }

    // Undo the display rotation: upright (u, v) back to sensor (x, y).
    let (left, top, right, bottom) = match orientation {
        // shown = sensor turned 90 degrees clockwise: x = v, y = 1 - u
        DeviceOrientation::Up => (t, 1.0 - r, b, 1.0 - l),
        DeviceOrientation::Left => (l, t, r, b),
        // shown = sensor turned 90 degrees counter-clockwise: x = 1 - v, y = u
        DeviceOrientation::Down => (1.0 - b, l, 1.0 - t, r),
        DeviceOrientation::Right => (1.0 - r, 1.0 - b, 1.0 - l, 1.0 - t),
    };

    NormalizedRect::new(left as f32, top as f32, right as f32, bottom as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Resolution = Resolution::new(1920, 1080);

    fn view_for(orientation: DeviceOrientation) -> Resolution {
        if orientation.is_portrait() {
            Resolution::new(1080, 2160)
        } else {
            Resolution::new(2160, 1080)
        }
    }

    fn regions(view: Resolution) -> Vec<ViewRect> {
        let (w, h) = (view.width as i32, view.height as i32);
        let mut out = Vec::new();
        for l in [0, w / 7, w / 3] {
            for t in [0, h / 5, h / 2] {
                for (dw, dh) in [(1, 1), (w / 4, h / 9), (w - l, h - t)] {
                    out.push(ViewRect::new(l, t, (l + dw).min(w), (t + dh).min(h)));
                }
            }
        }
        out
    }

    fn assert_close(actual: NormalizedRect, expected: (f32, f32, f32, f32)) {
        let got = (actual.left, actual.top, actual.right, actual.bottom);
        let eq = |a: f32, b: f32| (a - b).abs() < 1e-4;
        assert!(
            eq(got.0, expected.0) && eq(got.1, expected.1) && eq(got.2, expected.2) && eq(got.3, expected.3),
            "got {got:?}, expected {expected:?}"
        );
    }

    #[test]
    fn test_non_degenerate_regions_stay_non_empty() {
        for orientation in DeviceOrientation::ALL {
            let view = view_for(orientation);
            for region in regions(view) {
                let rect = project(Some(region), view, FRAME, orientation);
                assert!(!rect.is_empty(), "{orientation:?} {region:?} -> {rect:?}");
                assert!(rect.left < rect.right && rect.top < rect.bottom);
                for edge in [rect.left, rect.top, rect.right, rect.bottom] {
                    assert!((0.0..=1.0).contains(&edge));
                }
            }
        }
    }

    #[test]
    fn test_degenerate_regions_are_empty() {
        for orientation in DeviceOrientation::ALL {
            let view = view_for(orientation);
            for region in [
                ViewRect::new(10, 10, 10, 50),
                ViewRect::new(10, 60, 40, 20),
                ViewRect::new(300, 0, 100, 0),
            ] {
                assert!(project(Some(region), view, FRAME, orientation).is_empty());
            }
        }
    }

    #[test]
    fn test_unset_region_is_full_frame() {
        for orientation in DeviceOrientation::ALL {
            let rect = project(None, view_for(orientation), FRAME, orientation);
            assert_eq!(rect, NormalizedRect::FULL);
        }
    }

    #[test]
    fn test_full_view_on_wider_view() {
        // A 1:2 view shows the 16:9 frame filled along its short edge, so the
        // long edge overflows and only 8/9 of it is visible.
        let visible = 1920.0 / 2160.0;
        let cases = [
            (DeviceOrientation::Up, (0.0, 1.0 - visible, 1.0, 1.0)),
            (DeviceOrientation::Left, (0.0, 0.0, 1.0, visible)),
            (DeviceOrientation::Down, (0.0, 0.0, 1.0, visible)),
            (DeviceOrientation::Right, (0.0, 1.0 - visible, 1.0, 1.0)),
        ];
        for (orientation, expected) in cases {
            let view = view_for(orientation);
            let region = ViewRect::new(0, 0, view.width as i32, view.height as i32);
            assert_close(project(Some(region), view, FRAME, orientation), expected);
        }
    }

    #[test]
    fn test_quadrant_per_orientation() {
        // Top-left quarter of a view that exactly matches the upright frame.
        let cases = [
            (DeviceOrientation::Up, (0.0, 0.5, 0.5, 1.0)),
            (DeviceOrientation::Left, (0.0, 0.0, 0.5, 0.5)),
            (DeviceOrientation::Down, (0.5, 0.0, 1.0, 0.5)),
            (DeviceOrientation::Right, (0.5, 0.5, 1.0, 1.0)),
        ];
        for (orientation, expected) in cases {
            let view = orientation.upright(FRAME);
            let region = ViewRect::new(0, 0, view.width as i32 / 2, view.height as i32 / 2);
            assert_close(project(Some(region), view, FRAME, orientation), expected);
        }
    }

    #[test]
    fn test_region_clamped_to_frame() {
        let view = Resolution::new(1920, 1080);
        let region = ViewRect::new(-100, -100, 5000, 540);
        let rect = project(Some(region), view, FRAME, DeviceOrientation::Left);
        assert_close(rect, (0.0, 0.0, 1.0, 0.5));
    }
}
