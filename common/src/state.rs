use crate::types::Flag;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    flags: [bool; 6],
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, flag: Flag) -> bool {
        self.flags[flag.index()]
    }

    pub fn toggle(&mut self, flag: Flag) -> bool {
        let slot = &mut self.flags[flag.index()];
        *slot = !*slot;
        *slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn starts_all_off() {
        let state = DeviceState::new();
        for flag in Flag::ALL {
            assert!(!state.get(flag), "{} should start off", flag.as_str());
        }
    }

    #[test]
    fn toggling_twice_restores_every_flag() {
        for flag in Flag::ALL {
            let mut state = DeviceState::new();
            let original = state;

            assert!(state.toggle(flag));
            assert!(state.get(flag));
            assert!(!state.toggle(flag));
            assert_eq!(state, original);
        }
    }

    #[test]
    fn toggle_only_touches_its_flag() {
        for target in Flag::ALL {
            let mut state = DeviceState::new();
            state.toggle(target);

            for other in Flag::ALL.into_iter().filter(|flag| *flag != target) {
                assert!(!state.get(other), "{} leaked into {}", target.as_str(), other.as_str());
            }
        }
    }

}
