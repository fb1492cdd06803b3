use arrayvec::ArrayVec;

use crate::fixed::{whole_ticks, FX_SHIFT};
use crate::motor::{MotorPins, StepperMotor};
use crate::timer::MatchTimer;
use crate::{Error, MAX_MOTORS};

// What one serviced step edge produced, for the caller to act on outside
// the per-motor loop.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct StepSummary {
    pub finished_bm: u32,
    pub signal_step: bool,
}

// Drives the base stepping frequency for all registered motors. Owns the
// motor array and the bitmask of motors that currently produce steps; the
// timer itself is handed in by the caller, interrupt-style.
pub struct StepTicker<P: MotorPins> {
    pins: P,
    motors: ArrayVec<StepperMotor, MAX_MOTORS>,
    pub active_motor_bm: u32,
    frequency: f32,
    period: u32,
    reset_delay: u32,
    reset_step_pins: bool,
    moves_finished: bool,
    last_duration: u32,
}

impl<P: MotorPins> StepTicker<P> {
    pub fn new(pins: P) -> Self {
        Self {
            pins,
            motors: ArrayVec::new(),
            active_motor_bm: 0,
            frequency: 0.0,
            period: 0,
            reset_delay: 0,
            reset_step_pins: false,
            moves_finished: false,
            last_duration: 0,
        }
    }

    // Set the base stepping frequency. If the counter already ran past the
    // new period the timer is restarted so no match is skipped.
    pub fn set_frequency(&mut self, timer: &mut impl MatchTimer, frequency: f32) -> Result<(), Error> {
        if frequency <= 0.0 {
            return Err(Error::TooSlow);
        }
        let period = (timer.ticks_per_second() as f32 / frequency) as u32;
        if period < 2 {
            return Err(Error::TooFast);
        }
        self.frequency = frequency;
        self.period = period;
        timer.set_match0(period);
        if timer.counter() > period {
            timer.restart();
        }
        Ok(())
    }

    // Pulse width: the MR1 match deasserts what MR0 asserted.
    pub fn set_reset_delay(&mut self, timer: &mut impl MatchTimer, seconds: f32) -> Result<(), Error> {
        let ticks = (timer.ticks_per_second() as f32 * seconds) as u32;
        if ticks == 0 {
            return Err(Error::TooFast);
        }
        self.reset_delay = ticks;
        timer.set_match1(ticks);
        Ok(())
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn reset_delay(&self) -> u32 {
        self.reset_delay
    }

    pub fn add_stepper_motor(&mut self) -> Result<usize, Error> {
        let index = self.motors.len();
        self.motors.try_push(StepperMotor::new(index)).map_err(|_| Error::TooManyMotors)?;
        Ok(index)
    }

    pub fn motor_count(&self) -> usize {
        self.motors.len()
    }

    pub fn motor(&self, index: usize) -> &StepperMotor {
        &self.motors[index]
    }

    pub fn motor_mut(&mut self, index: usize) -> &mut StepperMotor {
        &mut self.motors[index]
    }

    pub fn any_moving(&self) -> bool {
        self.motors.iter().any(|m| m.moving)
    }

    pub fn begin_move(
        &mut self,
        timer: &mut impl MatchTimer,
        index: usize,
        direction: bool,
        steps: u32,
    ) {
        self.motors[index].begin_move(&mut self.pins, direction, steps);
        if steps > 0 {
            self.add_motor_to_active_list(timer, index);
        } else {
            self.remove_motor_from_active_list(timer, index);
        }
    }

    pub fn set_speed(&mut self, index: usize, steps_per_second: f32) {
        let frequency = self.frequency;
        self.motors[index].set_speed(frequency, steps_per_second);
    }

    pub fn enable_all(&mut self, on: bool) {
        for motor in self.motors.iter_mut() {
            motor.enable(&mut self.pins, on);
        }
    }

    pub fn pause_all(&mut self) {
        for motor in self.motors.iter_mut() {
            motor.pause();
        }
    }

    pub fn unpause_all(&mut self) {
        for motor in self.motors.iter_mut() {
            motor.unpause();
        }
    }

    // Arming the first motor starts the timer; MR1's reset-and-stop is
    // cleared so the pulse train can free-run.
    pub fn add_motor_to_active_list(&mut self, timer: &mut impl MatchTimer, index: usize) {
        let reinit = self.active_motor_bm == 0;
        self.active_motor_bm |= 1 << index;
        if reinit {
            timer.set_match1_reset_and_stop(false);
            timer.restart();
        }
    }

    // Removing the last motor arms MR1 to reset and stop the timer, so the
    // final pulse is still deasserted before everything goes quiet.
    pub fn remove_motor_from_active_list(&mut self, timer: &mut impl MatchTimer, index: usize) {
        self.active_motor_bm &= !(1 << index);
        if self.active_motor_bm == 0 {
            timer.set_match1_reset_and_stop(true);
        }
    }

    // MR1 service: deassert every active step pin. Serviced before MR0 when
    // both are pending, so a late tick still unsteps before it steps again.
    pub fn reset_tick(&mut self, timer: &mut impl MatchTimer) {
        timer.set_match1_interrupt(false);
        let mut bm = self.active_motor_bm;
        while bm != 0 {
            let index = bm.trailing_zeros() as usize;
            bm &= bm - 1;
            self.motors[index].unstep(&mut self.pins);
        }
    }

    pub fn step_tick(&mut self, timer: &mut impl MatchTimer) -> StepSummary {
        self.step_tick_with(timer, |_, _| {})
    }

    // MR0 service. `on_moves_finished` runs while MR0 is parked, the window
    // in which block hand-over is allowed to overrun; the catch-up below
    // then re-arms MR0 past whatever time that work consumed.
    pub fn step_tick_with<T, F>(&mut self, timer: &mut T, on_moves_finished: F) -> StepSummary
    where
        T: MatchTimer,
        F: FnOnce(&mut Self, &mut T),
    {
        let mut summary = StepSummary::default();

        let mut bm = self.active_motor_bm;
        while bm != 0 {
            let index = bm.trailing_zeros() as usize;
            bm &= bm - 1;
            let events = self.motors[index].tick(&mut self.pins);
            if events.pulsed {
                self.reset_step_pins = true;
            }
            if events.finished {
                self.moves_finished = true;
                summary.finished_bm |= 1 << index;
            }
            if events.signal_step {
                summary.signal_step = true;
            }
        }

        // A pin went high this tick: schedule the deassert. Otherwise there
        // is nothing more this tick can have caused.
        if self.reset_step_pins {
            timer.set_match1_interrupt(true);
            self.reset_step_pins = false;
        } else {
            timer.set_match0(self.period);
            return summary;
        }

        if self.moves_finished {
            // Park MR0 until the hand-over below is nice and tidy.
            timer.set_match0(u32::MAX);
            self.finish_moves(timer);
            on_moves_finished(self, timer);

            if timer.counter() > self.period {
                self.catch_up(timer);
            } else {
                timer.set_match0(self.period);
            }

            while timer.counter() > timer.match0() {
                timer.set_match0(timer.match0() + self.period);
            }
        }

        summary
    }

    // Follow-up pass over motors that hit their target this tick: clear
    // moving and drop them from the active set. Iterates a snapshot of the
    // bitmask, so removals cannot skip a survivor.
    fn finish_moves(&mut self, timer: &mut impl MatchTimer) {
        let mut bm = self.active_motor_bm;
        while bm != 0 {
            let index = bm.trailing_zeros() as usize;
            bm &= bm - 1;
            if self.motors[index].is_move_finished {
                self.motors[index].is_move_finished = false;
                self.motors[index].moving = false;
                self.remove_motor_from_active_list(timer, index);
            }
        }
        self.moves_finished = false;
    }

    // We overran the period. Skip whole tick equivalents: every skipped
    // tick is credited to each active motor's accumulator, bounded by the
    // soonest upcoming pulse so no motor can pass one.
    fn catch_up(&mut self, timer: &mut impl MatchTimer) {
        let start_tc = timer.counter();

        let ticks_to_skip = (timer.counter() + self.last_duration) / self.period;

        let mut ticks_we_can_skip = ticks_to_skip;
        let mut bm = self.active_motor_bm;
        while bm != 0 {
            let index = bm.trailing_zeros() as usize;
            bm &= bm - 1;
            let motor = &self.motors[index];
            let headroom = whole_ticks(motor.fx_ticks_per_step - motor.fx_counter);
            ticks_we_can_skip = ticks_we_can_skip.min(headroom);
        }

        let mut bm = self.active_motor_bm;
        while bm != 0 {
            let index = bm.trailing_zeros() as usize;
            bm &= bm - 1;
            self.motors[index].fx_counter += (ticks_we_can_skip as u64) << FX_SHIFT;
        }

        // +1 because this service was itself a legitimate match
        timer.set_match0((ticks_to_skip + 1) * self.period);

        let duration = timer.counter().saturating_sub(start_tc);
        if duration > 0 {
            self.last_duration = duration;
        }
    }
}
