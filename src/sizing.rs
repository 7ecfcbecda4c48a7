//! Stream and converter size selection from device-reported candidates.
//!
//! Both functions are pure. Ties on pixel count keep the earlier candidate, so
//! repeated calls with the same input always return the same size.

use crate::geometry::Resolution;

/// Pixel ceiling above which decode accuracy stops improving (1920 x 1080).
pub const DEFAULT_MAX_DECODE_PIXELS: u64 = 2_073_600;

/// Smallest candidate covering `min` in both dimensions.
///
/// Falls back to the largest candidate when none is big enough. Returns `None`
/// only for an empty candidate list.
pub fn biggest_size_at_least(candidates: &[Resolution], min: Resolution) -> Option<Resolution> {
    let mut best: Option<Resolution> = None;
    let mut largest: Option<Resolution> = None;

    for &size in candidates {
        if largest.map_or(true, |l| size.pixels() > l.pixels()) {
            largest = Some(size);
        }
        if size.width >= min.width && size.height >= min.height
            && best.map_or(true, |b| size.pixels() < b.pixels())
        {
            best = Some(size);
        }
    }

    best.or(largest)
}

/// Largest candidate with exactly the aspect of `reference` and at most `max_pixels`.
///
/// Falls back to the smallest candidate overall when nothing matches. Returns
/// `None` only for an empty candidate list.
pub fn largest_size_under_budget(
    candidates: &[Resolution],
    reference: Resolution,
    max_pixels: u64,
) -> Option<Resolution> {
    let mut best: Option<Resolution> = None;
    let mut smallest: Option<Resolution> = None;

    for &size in candidates {
        if smallest.map_or(true, |s| size.pixels() < s.pixels()) {
            smallest = Some(size);
        }
        if size.same_aspect(&reference)
            && size.pixels() <= max_pixels
            && best.map_or(true, |b| size.pixels() > b.pixels())
        {
            best = Some(size);
        }
    }

    best.or(smallest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> Vec<Resolution> {
        vec![
            Resolution::new(640, 480),
            Resolution::new(3840, 2160),
            Resolution::new(1280, 720),
            Resolution::new(1920, 1080),
            Resolution::new(1440, 1080),
            Resolution::new(320, 240),
        ]
    }

    #[test]
    fn test_at_least_picks_smallest_qualifying() {
        let chosen = biggest_size_at_least(&sizes(), Resolution::new(1000, 700)).unwrap();
        assert_eq!(chosen, Resolution::new(1280, 720));
    }

    #[test]
    fn test_at_least_never_undershoots() {
        let candidates = sizes();
        for min in [
            Resolution::new(1, 1),
            Resolution::new(641, 200),
            Resolution::new(1300, 1000),
            Resolution::new(1920, 1080),
        ] {
            let chosen = biggest_size_at_least(&candidates, min).unwrap();
            assert!(chosen.width >= min.width && chosen.height >= min.height, "{min} -> {chosen}");
            assert_eq!(biggest_size_at_least(&candidates, min), Some(chosen));
        }
    }

    #[test]
    fn test_at_least_falls_back_to_largest() {
        let chosen = biggest_size_at_least(&sizes(), Resolution::new(5000, 5000)).unwrap();
        assert_eq!(chosen, Resolution::new(3840, 2160));
        assert_eq!(biggest_size_at_least(&[], Resolution::new(1, 1)), None);
    }

    #[test]
    fn test_budget_respects_aspect_and_ceiling() {
        let chosen = largest_size_under_budget(
            &sizes(),
            Resolution::new(16, 9),
            DEFAULT_MAX_DECODE_PIXELS,
        )
        .unwrap();
        assert_eq!(chosen, Resolution::new(1920, 1080));

        let small = largest_size_under_budget(&sizes(), Resolution::new(16, 9), 1_000_000).unwrap();
        assert_eq!(small, Resolution::new(1280, 720));

        let four_three = largest_size_under_budget(&sizes(), Resolution::new(4, 3), 1_000_000).unwrap();
        assert_eq!(four_three, Resolution::new(640, 480));
    }

    #[test]
    fn test_budget_degrades_to_smallest() {
        let chosen = largest_size_under_budget(&sizes(), Resolution::new(21, 9), u64::MAX).unwrap();
        assert_eq!(chosen, Resolution::new(320, 240));
    }
}
