//! The authoritative tile-state table.
//!
//! Transitions are monotone and one-directional:
//! `Unknown → Standby → Check → {Hot | Cold}`. Each transition method
//! enforces its precondition and reports whether it took effect, so racing
//! callers resolve to exactly one winner.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use barrage_types::{Coord, Tile};

pub struct Grid {
    width: u16,
    height: u16,
    tiles: Vec<Tile>,
}

impl Grid {
    /// All-Unknown grid sized from the registration handshake.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        assert!(width > 0 && height > 0, "degenerate grid {width}x{height}");
        Self {
            width,
            height,
            tiles: vec![Tile::Unknown; usize::from(width) * usize::from(height)],
        }
    }

    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    #[must_use]
    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    fn index(&self, coord: Coord) -> Option<usize> {
        self.in_bounds(coord)
            .then(|| usize::from(coord.y) * usize::from(self.width) + usize::from(coord.x))
    }

    #[must_use]
    pub fn tile(&self, coord: Coord) -> Option<Tile> {
        self.index(coord).map(|i| self.tiles[i])
    }

    /// Claim a tile for firing: `Unknown → Standby`.
    ///
    /// Returns whether the claim won; a tile in any other state (already
    /// queued, fired, or resolved) is never re-targeted.
    pub fn claim(&mut self, coord: Coord) -> bool {
        let Some(i) = self.index(coord) else {
            debug_assert!(false, "claim out of bounds: {coord}");
            return false;
        };
        if self.tiles[i] == Tile::Unknown {
            self.tiles[i] = Tile::Standby;
            true
        } else {
            false
        }
    }

    /// Record a shot going out: `Standby → Check`.
    ///
    /// Workers only receive claimed coordinates, so any other current state
    /// is a logic fault.
    pub fn mark_fired(&mut self, coord: Coord) -> bool {
        let Some(i) = self.index(coord) else {
            debug_assert!(false, "mark_fired out of bounds: {coord}");
            return false;
        };
        if self.tiles[i] == Tile::Standby {
            self.tiles[i] = Tile::Check;
            true
        } else {
            debug_assert!(false, "mark_fired on {:?} tile {coord}", self.tiles[i]);
            false
        }
    }

    /// Classify feedback: `Check → {Hot | Cold}`.
    ///
    /// A tile in any other state ignores the event; late or duplicate
    /// feedback, and feedback for cells not yet fired at, is expected
    /// from the feed and must not change state.
    pub fn resolve(&mut self, coord: Coord, hit: bool) -> bool {
        let Some(i) = self.index(coord) else {
            return false;
        };
        if self.tiles[i] == Tile::Check {
            self.tiles[i] = if hit { Tile::Hot } else { Tile::Cold };
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.tiles.iter().filter(|&&t| t == Tile::Unknown).count()
    }

    /// The up-to-four orthogonal in-bounds neighbors.
    #[must_use]
    pub fn neighbors(&self, coord: Coord) -> Vec<Coord> {
        let mut out = Vec::with_capacity(4);
        if coord.x + 1 < self.width {
            out.push(Coord::new(coord.x + 1, coord.y));
        }
        if coord.x > 0 {
            out.push(Coord::new(coord.x - 1, coord.y));
        }
        if coord.y + 1 < self.height {
            out.push(Coord::new(coord.x, coord.y + 1));
        }
        if coord.y > 0 {
            out.push(Coord::new(coord.x, coord.y - 1));
        }
        out
    }

    /// The feed's pass markers: the two opposite corners it re-reports
    /// once per sweep.
    #[must_use]
    pub fn is_sentinel(&self, coord: Coord) -> bool {
        (coord.x == 0 && coord.y == 0)
            || (coord.x == self.width - 1 && coord.y == self.height - 1)
    }
}

/// Shared handle to the grid.
///
/// Every method takes the lock for exactly one read-modify-write, which is
/// what makes the dispatcher's claim atomic with respect to concurrent
/// dispatches of the same coordinate. No guard ever escapes, so the lock is
/// never held across an await point.
#[derive(Clone)]
pub struct SharedGrid(Arc<Mutex<Grid>>);

impl SharedGrid {
    #[must_use]
    pub fn new(grid: Grid) -> Self {
        Self(Arc::new(Mutex::new(grid)))
    }

    fn lock(&self) -> MutexGuard<'_, Grid> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn dimensions(&self) -> (u16, u16) {
        let grid = self.lock();
        (grid.width(), grid.height())
    }

    #[must_use]
    pub fn tile(&self, coord: Coord) -> Option<Tile> {
        self.lock().tile(coord)
    }

    #[must_use]
    pub fn in_bounds(&self, coord: Coord) -> bool {
        self.lock().in_bounds(coord)
    }

    pub fn claim(&self, coord: Coord) -> bool {
        self.lock().claim(coord)
    }

    pub fn mark_fired(&self, coord: Coord) -> bool {
        self.lock().mark_fired(coord)
    }

    pub fn resolve(&self, coord: Coord, hit: bool) -> bool {
        self.lock().resolve(coord, hit)
    }

    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.lock().unknown_count()
    }

    #[must_use]
    pub fn neighbors(&self, coord: Coord) -> Vec<Coord> {
        self.lock().neighbors(coord)
    }

    #[must_use]
    pub fn is_sentinel(&self, coord: Coord) -> bool {
        self.lock().is_sentinel(coord)
    }
}
