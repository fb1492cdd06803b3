use crate::fixed::{ticks_per_step, FX_ONE};

// Hardware lines for one bank of stepper drivers. Implementations toggle
// the real pins; tests record the edges.
pub trait MotorPins {
    fn step(&mut self, motor: usize, high: bool);
    fn dir(&mut self, motor: usize, forward: bool);
    fn enable(&mut self, motor: usize, on: bool);
}

// What a single motor did during one step tick.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct TickEvents {
    pub pulsed: bool,
    pub finished: bool,
    pub signal_step: bool,
}

// Per-axis step generator. A Q32.32 accumulator gains one whole tick per
// step tick; every time it crosses fx_ticks_per_step a pulse is emitted and
// the remainder is carried, which is the Bresenham/DDA that keeps multiple
// axes in exact integer ratio over a whole block.
pub struct StepperMotor {
    index: usize,
    pub steps_to_move: u32,
    pub stepped: u32,
    pub direction: bool,
    pub moving: bool,
    pub paused: bool,
    pub enabled: bool,
    pub is_move_finished: bool,
    pub fx_counter: u64,
    pub fx_ticks_per_step: u64,
    // this axis's share of the dominant-axis rate
    pub rate_ratio: f32,
    signal_step: Option<u32>,
}

impl StepperMotor {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            steps_to_move: 0,
            stepped: 0,
            direction: false,
            moving: false,
            paused: false,
            enabled: false,
            is_move_finished: false,
            fx_counter: 0,
            fx_ticks_per_step: FX_ONE,
            rate_ratio: 1.0,
            signal_step: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn begin_move(&mut self, pins: &mut impl MotorPins, direction: bool, steps: u32) {
        // the last pulse of a previous move is only deasserted by its MR1;
        // a new move needs the line low so its first edge is a real edge
        pins.step(self.index, false);
        self.direction = direction;
        pins.dir(self.index, direction);
        self.steps_to_move = steps;
        self.stepped = 0;
        self.fx_counter = 0;
        self.signal_step = None;
        self.is_move_finished = steps == 0;
        self.moving = steps > 0;
    }

    // The rate is the dominant-axis rate scaled by rate_ratio before it gets
    // here. Clamped so at most one pulse per tick is ever scheduled.
    pub fn set_speed(&mut self, ticker_frequency: f32, steps_per_second: f32) {
        debug_assert!(steps_per_second > 0.0);
        self.fx_ticks_per_step = ticks_per_step(ticker_frequency, steps_per_second);
    }

    // Step-tick work. Runs in interrupt context: no allocation, no failure.
    pub fn tick(&mut self, pins: &mut impl MotorPins) -> TickEvents {
        let mut events = TickEvents::default();
        if self.paused || !self.moving {
            return events;
        }
        self.fx_counter += FX_ONE;
        if self.fx_counter >= self.fx_ticks_per_step {
            pins.step(self.index, true);
            events.pulsed = true;
            self.fx_counter -= self.fx_ticks_per_step;
            self.stepped += 1;
            if self.signal_step == Some(self.stepped) {
                self.signal_step = None;
                events.signal_step = true;
            }
            if self.stepped == self.steps_to_move {
                // moving is cleared in the follow-up pass, out of the per-motor path
                self.is_move_finished = true;
                events.finished = true;
            }
        }
        events
    }

    pub fn unstep(&mut self, pins: &mut impl MotorPins) {
        pins.step(self.index, false);
    }

    pub fn enable(&mut self, pins: &mut impl MotorPins, on: bool) {
        self.enabled = on;
        pins.enable(self.index, on);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn unpause(&mut self) {
        self.paused = false;
    }

    // Ask for a signal the moment `stepped` reaches the given count.
    pub fn attach_signal_step(&mut self, step: u32) {
        self.signal_step = Some(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingPins {
        record: Rc<RefCell<PinRecord>>,
    }

    #[derive(Default)]
    struct PinRecord {
        step_edges: Vec<(usize, bool)>,
        dirs: Vec<(usize, bool)>,
    }

    impl MotorPins for RecordingPins {
        fn step(&mut self, motor: usize, high: bool) {
            self.record.borrow_mut().step_edges.push((motor, high));
        }
        fn dir(&mut self, motor: usize, forward: bool) {
            self.record.borrow_mut().dirs.push((motor, forward));
        }
        fn enable(&mut self, _motor: usize, _on: bool) {}
    }

    fn pulses(pins: &RecordingPins) -> usize {
        pins.record.borrow().step_edges.iter().filter(|(_, high)| *high).count()
    }

    #[test]
    fn pulse_every_third_tick() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(0);
        m.begin_move(&mut pins, false, 4);
        m.set_speed(9000.0, 3000.0);
        let mut history = Vec::new();
        for _ in 0..12 {
            history.push(m.tick(&mut pins).pulsed);
        }
        assert_eq!(history, vec![
            false, false, true, false, false, true,
            false, false, true, false, false, true,
        ]);
        assert_eq!(m.stepped, 4);
    }

    #[test]
    fn finishes_exactly_at_target() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(0);
        m.begin_move(&mut pins, true, 2);
        m.set_speed(1000.0, 1000.0);
        assert_eq!(m.tick(&mut pins), TickEvents { pulsed: true, finished: false, signal_step: false });
        let last = m.tick(&mut pins);
        assert_eq!(last.finished, true);
        assert_eq!(m.is_move_finished, true);
        // ticking past the end emits nothing once moving is cleared
        m.moving = false;
        assert_eq!(m.tick(&mut pins), TickEvents::default());
        assert_eq!(m.stepped, 2);
    }

    #[test]
    fn zero_step_move_is_immediately_finished() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(0);
        m.begin_move(&mut pins, false, 0);
        assert_eq!(m.moving, false);
        assert_eq!(m.is_move_finished, true);
        assert_eq!(pulses(&pins), 0);
    }

    #[test]
    fn stepped_is_monotonic_and_bounded() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(1);
        m.begin_move(&mut pins, false, 5);
        m.set_speed(10_000.0, 7000.0);
        let mut last = 0;
        for _ in 0..40 {
            let events = m.tick(&mut pins);
            assert!(m.stepped >= last);
            assert!(m.stepped <= m.steps_to_move);
            last = m.stepped;
            if events.finished {
                m.moving = false;
            }
        }
        assert_eq!(m.stepped, 5);
    }

    #[test]
    fn signal_step_fires_once() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(0);
        m.begin_move(&mut pins, false, 10);
        m.set_speed(1000.0, 1000.0);
        m.attach_signal_step(3);
        let mut signalled = Vec::new();
        for _ in 0..10 {
            if m.tick(&mut pins).signal_step {
                signalled.push(m.stepped);
            }
        }
        assert_eq!(signalled, vec![3]);
    }

    #[test]
    fn paused_motor_holds_position() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(0);
        m.begin_move(&mut pins, false, 10);
        m.set_speed(1000.0, 1000.0);
        m.tick(&mut pins);
        m.pause();
        for _ in 0..5 {
            assert_eq!(m.tick(&mut pins), TickEvents::default());
        }
        assert_eq!(m.stepped, 1);
        m.unpause();
        assert_eq!(m.tick(&mut pins).pulsed, true);
    }

    #[test]
    fn direction_pin_follows_move() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(2);
        m.begin_move(&mut pins, true, 1);
        m.begin_move(&mut pins, false, 1);
        assert_eq!(pins.record.borrow().dirs, vec![(2, true), (2, false)]);
    }

    #[test]
    fn unstep_releases_pin() {
        let mut pins = RecordingPins::default();
        let mut m = StepperMotor::new(0);
        m.begin_move(&mut pins, false, 1);
        m.set_speed(1000.0, 1000.0);
        m.tick(&mut pins);
        m.unstep(&mut pins);
        // the leading deassert comes from begin_move zeroing the line
        assert_eq!(pins.record.borrow().step_edges, vec![(0, false), (0, true), (0, false)]);
    }
}
