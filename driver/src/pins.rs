use std::cell::RefCell;
use std::rc::Rc;

use motion::{MotorPins, MAX_AXES};

// Stand-in for the real step/dir/enable lines: counts rising edges per axis
// so a simulation run can be checked against the commanded step counts.
#[derive(Clone, Default)]
pub struct CountingPins {
    state: Rc<RefCell<PinState>>,
}

#[derive(Default)]
struct PinState {
    step_level: [bool; MAX_AXES],
    pulses: [u64; MAX_AXES],
    directions: [bool; MAX_AXES],
    enabled: [bool; MAX_AXES],
}

impl CountingPins {
    pub fn pulses(&self, axis: usize) -> u64 {
        self.state.borrow().pulses[axis]
    }

    pub fn direction(&self, axis: usize) -> bool {
        self.state.borrow().directions[axis]
    }

    pub fn enabled(&self, axis: usize) -> bool {
        self.state.borrow().enabled[axis]
    }
}

impl MotorPins for CountingPins {
    fn step(&mut self, motor: usize, high: bool) {
        if motor >= MAX_AXES {
            return;
        }
        let mut state = self.state.borrow_mut();
        if high && !state.step_level[motor] {
            state.pulses[motor] += 1;
        }
        state.step_level[motor] = high;
    }

    fn dir(&mut self, motor: usize, forward: bool) {
        if motor < MAX_AXES {
            self.state.borrow_mut().directions[motor] = forward;
        }
    }

    fn enable(&mut self, motor: usize, on: bool) {
        if motor < MAX_AXES {
            self.state.borrow_mut().enabled[motor] = on;
        }
    }
}
