use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

/// Shape of a procedurally generated terrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Topology {
    /// Rolling sine/cosine hills with ripples
    #[default]
    Hills,
    /// Long dunes, flatter than hills
    Desert,
    /// Height 0 everywhere
    Flat,
}

impl Topology {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Topology::Desert,
            2 => Topology::Flat,
            _ => Topology::Hills,
        }
    }
}

/// World units per "meter" of the topology functions.
const UNITS_PER_METER: f32 = 10.0;
/// Wavelength divisor of the large hills.
const HILL_PERIOD: f32 = 1000.0 / 150.0;
/// Wavelength divisor of the ripples laid over the hills.
const RIPPLE_PERIOD: f32 = 1000.0 / 925.0;
/// Upper bound of the ground jitter added in valleys.
const JITTER_AMPLITUDE: f32 = 3.0;

/// Height function for procedural generation.
///
/// Heights are a deterministic function of the cell coordinate and the seed;
/// the only noise is a small non-negative jitter applied in low areas.
pub struct TopologyField {
    topology: Topology,
    max_height: f32,
    cell_size: f32,
    jitter: Fbm<Perlin>,
}

impl TopologyField {
    pub fn new(topology: Topology, max_height: f32, cell_size: i32, seed: u32) -> Self {
        let jitter = Fbm::<Perlin>::new(seed)
            .set_octaves(3)
            .set_frequency(0.7)
            .set_lacunarity(2.0)
            .set_persistence(0.5);

        Self {
            topology,
            max_height,
            cell_size: cell_size as f32,
            jitter,
        }
    }

    /// Height of cell `(cx, cy)`, within `[0, max_height + small jitter]`.
    pub fn sample(&self, cx: i32, cy: i32) -> f32 {
        let x = cx as f32 * self.cell_size / UNITS_PER_METER;
        let y = cy as f32 * self.cell_size / UNITS_PER_METER;
        let max = self.max_height;

        let hill_x = (x / HILL_PERIOD).sin() * max;
        let hill_y = (y / HILL_PERIOD).cos() * max;
        let hill = match self.topology {
            Topology::Flat => return 0.0,
            Topology::Hills => (hill_x + hill_y) / 2.0,
            Topology::Desert => hill_x + hill_y / 2.0,
        };

        let ripple_x = (x / RIPPLE_PERIOD).sin();
        let ripple_y = (y / RIPPLE_PERIOD).cos();
        let ripple = (ripple_x + ripple_y) / 2.0 * UNITS_PER_METER * 1.1;

        let mut height = (hill + ripple).clamp(0.0, max.max(0.0));

        if height < max / 100.0 {
            height += (ripple_x + ripple_y) / 2.0 * UNITS_PER_METER * 0.2;
            height += self.jitter_at(x, y);
        }

        height
    }

    fn jitter_at(&self, x: f32, y: f32) -> f32 {
        let n = self.jitter.get([x as f64, y as f64]) as f32;
        ((n + 1.0) * 0.5).clamp(0.0, 0.999) * JITTER_AMPLITUDE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_is_zero() {
        let field = TopologyField::new(Topology::Flat, 200.0, 10, 1);
        for (x, y) in [(0, 0), (7, 3), (100, 250)] {
            assert_eq!(field.sample(x, y), 0.0);
        }
    }

    #[test]
    fn test_hills_are_deterministic() {
        let a = TopologyField::new(Topology::Hills, 200.0, 10, 7);
        let b = TopologyField::new(Topology::Hills, 200.0, 10, 7);
        for x in 0..20 {
            assert_eq!(a.sample(x, x * 3).to_bits(), b.sample(x, x * 3).to_bits());
        }
    }

    #[test]
    fn test_hills_stay_near_range() {
        let field = TopologyField::new(Topology::Hills, 200.0, 10, 3);
        for y in 0..70 {
            for x in 0..70 {
                let h = field.sample(x, y);
                assert!(h >= -UNITS_PER_METER * 0.2, "height {} too low at {},{}", h, x, y);
                assert!(h <= 200.0 + JITTER_AMPLITUDE, "height {} too high at {},{}", h, x, y);
            }
        }
    }

    #[test]
    fn test_topology_codes() {
        assert_eq!(Topology::from_i32(0), Topology::Hills);
        assert_eq!(Topology::from_i32(1), Topology::Desert);
        assert_eq!(Topology::from_i32(2), Topology::Flat);
        assert_eq!(Topology::from_i32(99), Topology::Hills);
    }
}
