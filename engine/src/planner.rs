//! Two-phase checkerboard sweep planner.

use barrage_types::{Coord, Phase};

/// The ordered firing sequence for one sweep phase.
///
/// Probes are spaced 4 along x and 2 along y, with a horizontal offset of 2
/// that alternates by row pair. The two phases use complementary offsets, so
/// together they tile every other diagonal of the grid - a pattern sized to
/// the guns' effective blast radius. Pure in (width, height, phase):
/// repeated calls produce identical sequences.
#[must_use]
pub fn phase_targets(width: u16, height: u16, phase: Phase) -> Vec<Coord> {
    let parity = match phase {
        Phase::One => 0,
        Phase::Two => 1,
    };

    let mut targets = Vec::new();
    for x in (0..width).step_by(4) {
        for y in (0..height).step_by(2) {
            let x1 = if (y / 2) % 2 == parity { x } else { x + 2 };
            if x1 >= width {
                continue;
            }
            targets.push(Coord::new(x1, y));
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn row(targets: &[Coord], y: u16) -> Vec<u16> {
        let mut xs: Vec<u16> = targets.iter().filter(|c| c.y == y).map(|c| c.x).collect();
        xs.sort_unstable();
        xs
    }

    #[test]
    fn alternates_offset_by_row_pair() {
        let one = phase_targets(8, 4, Phase::One);
        assert_eq!(row(&one, 0), vec![0, 4]);
        assert_eq!(row(&one, 2), vec![2, 6]);

        let two = phase_targets(8, 4, Phase::Two);
        assert_eq!(row(&two, 0), vec![2, 6]);
        assert_eq!(row(&two, 2), vec![0, 4]);
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        assert_eq!(
            phase_targets(23, 17, Phase::One),
            phase_targets(23, 17, Phase::One)
        );
        assert_eq!(
            phase_targets(23, 17, Phase::Two),
            phase_targets(23, 17, Phase::Two)
        );
    }

    #[test]
    fn phases_are_disjoint_and_duplicate_free() {
        for (w, h) in [(8, 4), (24, 16), (23, 17), (4, 2), (1, 1)] {
            let one = phase_targets(w, h, Phase::One);
            let two = phase_targets(w, h, Phase::Two);

            let set_one: HashSet<Coord> = one.iter().copied().collect();
            let set_two: HashSet<Coord> = two.iter().copied().collect();
            assert_eq!(set_one.len(), one.len(), "{w}x{h} phase 1 has duplicates");
            assert_eq!(set_two.len(), two.len(), "{w}x{h} phase 2 has duplicates");
            assert!(
                set_one.is_disjoint(&set_two),
                "{w}x{h} phases share coordinates"
            );
        }
    }

    #[test]
    fn all_targets_in_bounds() {
        for phase in [Phase::One, Phase::Two] {
            for coord in phase_targets(23, 17, phase) {
                assert!(coord.x < 23 && coord.y < 17, "{coord} out of bounds");
            }
        }
    }

    #[test]
    fn narrow_grid_skips_offset_columns() {
        // Width 2 leaves no room for the +2 offset, so each phase only
        // probes the row pairs whose offset is zero.
        let one = phase_targets(2, 8, Phase::One);
        assert_eq!(one, vec![Coord::new(0, 0), Coord::new(0, 4)]);
        let two = phase_targets(2, 8, Phase::Two);
        assert_eq!(two, vec![Coord::new(0, 2), Coord::new(0, 6)]);
    }
}
