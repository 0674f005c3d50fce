use gloop::Inputs;

/// Arrow-key movement state. Synthesizes a pointer vector far enough from the
/// player that `Player::apply_move`'s speed law reads it as "full speed in
/// this direction", since keys only give us on/off rather than a real
/// pointer position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

const THRUST: f32 = 10_000.0;

impl InputState {
    pub fn to_inputs(self) -> Inputs {
        let mut x = 0.0;
        let mut y = 0.0;
        if self.left {
            x -= THRUST;
        }
        if self.right {
            x += THRUST;
        }
        if self.up {
            y -= THRUST;
        }
        if self.down {
            y += THRUST;
        }
        Inputs::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keys_held_is_zero_vector() {
        assert_eq!(InputState::default().to_inputs(), Inputs::ZERO);
    }

    #[test]
    fn opposite_keys_cancel() {
        let input = InputState {
            left: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(input.to_inputs(), Inputs::ZERO);
    }

    #[test]
    fn single_direction_produces_full_magnitude_vector() {
        let input = InputState {
            right: true,
            ..Default::default()
        };
        let inputs = input.to_inputs();
        assert!(inputs.x > 0.0);
        assert_eq!(inputs.y, 0.0);
    }
}
