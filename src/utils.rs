use std::time::Duration;

use rand::Rng;

use crate::{
    config::DelayRange,
    constants::{MAX_COLOR_ID, SWEEP_COLOR_CYCLE},
    protocol::PixelUpdate,
};

/// Uniformly random delay within `range`, bounds inclusive.
pub fn random_delay<R: Rng + ?Sized>(rng: &mut R, range: &DelayRange) -> Duration {
    let (min, max) = (range.min.as_secs_f64(), range.max.as_secs_f64());
    if max <= min {
        return range.min;
    }
    Duration::try_from_secs_f64(rng.random_range(min..=max)).unwrap_or(range.max)
}

/// A random pixel with `x` in `[0, edge]`, `y` in `[y_min, edge]` and any
/// palette colour.
pub fn random_pixel<R: Rng + ?Sized>(rng: &mut R, edge: i16, y_min: i16) -> PixelUpdate {
    PixelUpdate {
        x: rng.random_range(0..=edge),
        y: rng.random_range(y_min..=edge),
        color_id: rng.random_range(0..=MAX_COLOR_ID),
    }
}

/// Walks the canvas row by row, forever, cycling colours as it goes.
#[derive(Debug, Clone)]
pub struct Sweep {
    edge: i16,
    x: i16,
    y: i16,
    placed: u32,
}

impl Sweep {
    pub fn new(edge: i16) -> Self {
        Self {
            edge,
            x: 0,
            y: 0,
            placed: 0,
        }
    }
}

impl Iterator for Sweep {
    type Item = PixelUpdate;

    fn next(&mut self) -> Option<PixelUpdate> {
        if self.edge <= 0 {
            return None;
        }

        self.placed = self.placed.wrapping_add(1);
        let update = PixelUpdate {
            x: self.x,
            y: self.y,
            color_id: (self.placed % SWEEP_COLOR_CYCLE) as i16,
        };

        self.x += 1;
        if self.x == self.edge {
            self.x = 0;
            self.y += 1;
            if self.y == self.edge {
                self.y = 0;
            }
        }
        Some(update)
    }
}
