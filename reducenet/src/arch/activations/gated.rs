use crate::gating::Gate;

/// A ReLU blended with the identity: `gate * relu(z) + (1 - gate) * z`.
///
/// The blend is a single expression of the gate, so both the value and the derivative move
/// continuously as the gate goes from `1` (plain ReLU) to `0` (identity).
#[derive(Clone, Copy, Debug, Default)]
pub struct GatedRelu {
    gate: Gate,
}

impl GatedRelu {
    pub fn new(gate: Gate) -> Self {
        Self { gate }
    }

    pub fn f(&self, z: f32) -> f32 {
        let g = self.gate.value();
        g * z.max(0.) + (1. - g) * z
    }

    /// The derivative is `gate * [z > 0] + (1 - gate)`.
    pub fn df(&self, z: f32) -> f32 {
        let g = self.gate.value();
        let step = if z > 0. { 1. } else { 0. };
        g * step + (1. - g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZS: [f32; 7] = [-3., -1.5, -0.25, 0., 0.25, 1.5, 3.];

    #[test]
    fn open_gate_is_relu() {
        let act = GatedRelu::new(Gate::OPEN);

        for z in ZS {
            assert_eq!(act.f(z), z.max(0.));
        }
    }

    #[test]
    fn closed_gate_is_identity() {
        let act = GatedRelu::new(Gate::CLOSED);

        for z in ZS {
            assert_eq!(act.f(z), z);
            assert_eq!(act.df(z), 1.);
        }
    }

    #[test]
    fn half_gate_averages_both_paths() {
        let act = GatedRelu::new(Gate::new(0.5).unwrap());

        for z in ZS {
            assert!((act.f(z) - (0.5 * z.max(0.) + 0.5 * z)).abs() < 1e-6);
        }

        assert_eq!(act.df(-1.), 0.5);
        assert_eq!(act.df(1.), 1.);
    }
}
