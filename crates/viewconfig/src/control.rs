use crate::{clamp_scale, finite, finite_pair, ConfigError, Configuration};

/// A single edit to a [`Configuration`] coming from an interactive control.
///
/// `Set*` variants overwrite a field, `Nudge*` variants add a signed delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlChange {
    ToggleBoundary,
    SetBoundary(bool),
    SetAnimationSpeed(f32),
    NudgeAnimationSpeed(f32),
    SetLatticePoint([f32; 2]),
    NudgeLatticePoint([f32; 2]),
    SetScale(f32),
    NudgeScale(f32),
    SetTranslation([f32; 2]),
    NudgeTranslation([f32; 2]),
    SetRotation(f32),
    NudgeRotation(f32),
    Reset,
}

impl Configuration {
    /// Applies `change` and reports whether any field actually moved.
    ///
    /// A change that would produce a non-finite value is rejected and the
    /// configuration is left untouched.
    pub fn apply(&mut self, change: ControlChange) -> Result<bool, ConfigError> {
        let before = self.clone();
        match change {
            ControlChange::ToggleBoundary => self.boundary = !self.boundary,
            ControlChange::SetBoundary(value) => self.boundary = value,
            ControlChange::SetAnimationSpeed(speed) => {
                self.animation_speed = finite("animation_speed", speed)?;
            }
            ControlChange::NudgeAnimationSpeed(delta) => {
                self.animation_speed = finite("animation_speed", self.animation_speed + delta)?;
            }
            ControlChange::SetLatticePoint(point) => {
                self.lattice_point = finite_pair("lattice_point", point)?;
            }
            ControlChange::NudgeLatticePoint([dx, dy]) => {
                let [x, y] = self.lattice_point;
                self.lattice_point = finite_pair("lattice_point", [x + dx, y + dy])?;
            }
            ControlChange::SetScale(scale) => {
                self.scale = clamp_scale(finite("scale", scale)?);
            }
            ControlChange::NudgeScale(delta) => {
                self.scale = clamp_scale(finite("scale", self.scale + delta)?);
            }
            ControlChange::SetTranslation(translation) => {
                self.translation = finite_pair("translation", translation)?;
            }
            ControlChange::NudgeTranslation([dx, dy]) => {
                let [x, y] = self.translation;
                self.translation = finite_pair("translation", [x + dx, y + dy])?;
            }
            ControlChange::SetRotation(degrees) => {
                self.rotation = finite("rotation", degrees)?;
            }
            ControlChange::NudgeRotation(delta) => {
                self.rotation = finite("rotation", self.rotation + delta)?;
            }
            ControlChange::Reset => *self = Configuration::default(),
        }
        Ok(*self != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIN_SCALE;

    #[test]
    fn toggle_boundary_flips_each_time() {
        let mut config = Configuration::default();
        assert!(config.apply(ControlChange::ToggleBoundary).unwrap());
        assert!(config.boundary);
        assert!(config.apply(ControlChange::ToggleBoundary).unwrap());
        assert!(!config.boundary);
    }

    #[test]
    fn setting_same_value_reports_no_change() {
        let mut config = Configuration::default();
        assert!(!config.apply(ControlChange::SetScale(4.0)).unwrap());
        assert!(!config.apply(ControlChange::SetBoundary(false)).unwrap());
        assert!(!config.apply(ControlChange::Reset).unwrap());
    }

    #[test]
    fn nudges_accumulate() {
        let mut config = Configuration::default();
        config.apply(ControlChange::NudgeTranslation([0.05, 0.0])).unwrap();
        config.apply(ControlChange::NudgeTranslation([0.05, -0.05])).unwrap();
        assert!((config.translation[0] - 0.1).abs() < 1e-6);
        assert!((config.translation[1] + 0.05).abs() < 1e-6);

        config.apply(ControlChange::NudgeRotation(-5.0)).unwrap();
        assert_eq!(config.rotation, -5.0);

        config.apply(ControlChange::NudgeLatticePoint([0.0, -0.1])).unwrap();
        assert!((config.lattice_point[1] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nudge_scale_never_crosses_minimum() {
        let mut config = Configuration::default();
        config.apply(ControlChange::SetScale(0.05)).unwrap();
        config.apply(ControlChange::NudgeScale(-0.1)).unwrap();
        assert_eq!(config.scale, MIN_SCALE);
    }

    #[test]
    fn rejected_change_leaves_configuration_intact() {
        let mut config = Configuration::default();
        config.apply(ControlChange::SetRotation(30.0)).unwrap();
        let snapshot = config.clone();
        assert!(config.apply(ControlChange::NudgeRotation(f32::NAN)).is_err());
        assert!(config.apply(ControlChange::SetAnimationSpeed(f32::INFINITY)).is_err());
        assert_eq!(config, snapshot);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut config = Configuration::default();
        config.apply(ControlChange::SetAnimationSpeed(1.5)).unwrap();
        config.apply(ControlChange::ToggleBoundary).unwrap();
        assert!(config.apply(ControlChange::Reset).unwrap());
        assert_eq!(config, Configuration::default());
    }
}
