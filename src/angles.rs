use rand::Rng;
use rand::seq::IteratorRandom;
use thiserror::Error;

use crate::config::SynthConfig;

/// Errors raised when mapping azimuths onto the direction grid.
#[derive(Debug, Error)]
pub enum AngleError {
    #[error("Azimuth {angle} deg is off the grid ({min}..={max} step {step})")]
    OffGrid {
        angle: i32,
        min: i32,
        max: i32,
        step: i32,
    },
    #[error("All {count} grid azimuths are already taken")]
    Exhausted { count: usize },
}

/// Uniform azimuth grid sources are placed on and labels are quantized to.
///
/// Class indices run from 0 at `min_deg` upward in `step_deg` increments.
/// The noise class lives one past the final grid index and is owned by
/// [`SynthConfig::noise_class`], not by the grid itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AngleGrid {
    min_deg: i32,
    max_deg: i32,
    step_deg: i32,
}

impl AngleGrid {
    /// Build a grid from explicit bounds. Callers are expected to pass
    /// values that already satisfy [`SynthConfig::validate`].
    pub fn new(min_deg: i32, max_deg: i32, step_deg: i32) -> Self {
        debug_assert!(step_deg > 0);
        debug_assert!(max_deg >= min_deg);
        debug_assert_eq!((max_deg - min_deg) % step_deg, 0);
        Self {
            min_deg,
            max_deg,
            step_deg,
        }
    }

    pub fn from_config(config: &SynthConfig) -> Self {
        Self::new(
            config.min_angle_deg,
            config.max_angle_deg,
            config.angle_step_deg,
        )
    }

    /// Number of azimuths on the grid.
    pub fn len(&self) -> usize {
        ((self.max_deg - self.min_deg) / self.step_deg) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Class index for an azimuth that lies exactly on the grid.
    pub fn class_of(&self, angle_deg: i32) -> Result<usize, AngleError> {
        let off_grid = || AngleError::OffGrid {
            angle: angle_deg,
            min: self.min_deg,
            max: self.max_deg,
            step: self.step_deg,
        };
        if angle_deg < self.min_deg || angle_deg > self.max_deg {
            return Err(off_grid());
        }
        let offset = angle_deg - self.min_deg;
        if offset % self.step_deg != 0 {
            return Err(off_grid());
        }
        Ok((offset / self.step_deg) as usize)
    }

    /// Azimuth for a class index, or `None` for the noise class and beyond.
    pub fn angle_of(&self, class: usize) -> Option<i32> {
        if class >= self.len() {
            return None;
        }
        Some(self.min_deg + class as i32 * self.step_deg)
    }

    /// All grid azimuths in ascending order.
    pub fn angles(&self) -> impl Iterator<Item = i32> + '_ {
        (0..self.len()).map(|class| self.min_deg + class as i32 * self.step_deg)
    }

    /// Draw a uniformly random azimuth that is not in `taken`.
    pub fn draw_unique<R: Rng + ?Sized>(
        &self,
        taken: &[i32],
        rng: &mut R,
    ) -> Result<i32, AngleError> {
        self.angles()
            .filter(|angle| !taken.contains(angle))
            .choose(rng)
            .ok_or(AngleError::Exhausted { count: self.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn default_grid() -> AngleGrid {
        AngleGrid::from_config(&SynthConfig::default())
    }

    #[test]
    fn maps_angles_to_classes_and_back() {
        let grid = default_grid();
        assert_eq!(grid.len(), 37);
        assert_eq!(grid.class_of(-90).unwrap(), 0);
        assert_eq!(grid.class_of(0).unwrap(), 18);
        assert_eq!(grid.class_of(90).unwrap(), 36);
        for class in 0..grid.len() {
            let angle = grid.angle_of(class).unwrap();
            assert_eq!(grid.class_of(angle).unwrap(), class);
        }
        assert_eq!(grid.angle_of(37), None);
    }

    #[test]
    fn rejects_off_grid_angles() {
        let grid = default_grid();
        assert!(matches!(
            grid.class_of(-91),
            Err(AngleError::OffGrid { angle: -91, .. })
        ));
        assert!(matches!(grid.class_of(91), Err(AngleError::OffGrid { .. })));
        assert!(matches!(grid.class_of(3), Err(AngleError::OffGrid { .. })));
    }

    #[test]
    fn draws_avoid_taken_angles() {
        let grid = AngleGrid::new(-10, 10, 5);
        let mut rng = StdRng::seed_from_u64(7);
        let mut taken = Vec::new();
        for _ in 0..grid.len() {
            let angle = grid.draw_unique(&taken, &mut rng).unwrap();
            assert!(!taken.contains(&angle));
            taken.push(angle);
        }
        taken.sort_unstable();
        assert_eq!(taken, vec![-10, -5, 0, 5, 10]);
    }

    #[test]
    fn exhausted_grid_reports_error() {
        let grid = AngleGrid::new(0, 5, 5);
        let mut rng = StdRng::seed_from_u64(1);
        let taken = vec![0, 5];
        assert!(matches!(
            grid.draw_unique(&taken, &mut rng),
            Err(AngleError::Exhausted { count: 2 })
        ));
    }
}
