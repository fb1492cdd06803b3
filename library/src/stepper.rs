use log::{debug, info, trace};

use crate::block::Block;
use crate::config::{Config, ACCELERATION_TICKS_PER_SECOND, MINIMUM_STEPS_PER_MINUTE};
use crate::events::{Channel, SystemEvent};
use crate::gcode::{GcodeCommand, Mnemonic};
use crate::motor::MotorPins;
use crate::step_ticker::{StepSummary, StepTicker};
use crate::timer::MatchTimer;
use crate::MAX_AXES;

// Where the commanded rate sits in the block's velocity profile. Flushing
// overrides the positional phases: it forces a ramp down regardless of how
// far the block got.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrapezoidPhase {
    Accelerating,
    Cruising,
    Decelerating,
    Flushing,
}

// Transforms blocks with XYZ movement into actual stepper motor moves:
// configures the motors at block begin and walks the commanded rate through
// the accelerate / cruise / decelerate phases of the block's profile, one
// acceleration tick at a time.
pub struct Stepper {
    pub current_block: Option<Block>,
    main_stepper: usize,
    trapezoid_adjusted_rate: f32,
    paused: bool,
    force_speed_update: bool,
    flush: bool,
    enable_pins_status: bool,
    minimum_steps_per_second: f32,
    pub acceleration_ticks_per_second: f32,
    pub events: Channel<SystemEvent, 16>,
}

impl Stepper {
    pub fn new() -> Self {
        Self {
            current_block: None,
            main_stepper: 0,
            trapezoid_adjusted_rate: 0.0,
            paused: false,
            force_speed_update: false,
            flush: false,
            enable_pins_status: false,
            minimum_steps_per_second: 50.0,
            acceleration_ticks_per_second: 100.0,
            events: Channel::default(),
        }
    }

    pub fn on_config_reload<P: MotorPins>(&mut self, config: &Config, ticker: &mut StepTicker<P>) {
        self.acceleration_ticks_per_second =
            config.value(ACCELERATION_TICKS_PER_SECOND).by_default(100.0).as_number();
        self.minimum_steps_per_second =
            config.value(MINIMUM_STEPS_PER_MINUTE).by_default(3000.0).as_number() / 60.0;
        info!(
            "stepper configured: {} accel ticks/s, min {} steps/s",
            self.acceleration_ticks_per_second, self.minimum_steps_per_second
        );
        // steppers start off until a block needs them
        self.turn_enable_pins_off(ticker);
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn main_stepper(&self) -> usize {
        self.main_stepper
    }

    pub fn trapezoid_adjusted_rate(&self) -> f32 {
        self.trapezoid_adjusted_rate
    }

    // Flush request from the queue: drain the current block to a stop.
    pub fn set_flush(&mut self, flush: bool) {
        self.flush = flush;
    }

    pub fn on_pause<P: MotorPins>(&mut self, ticker: &mut StepTicker<P>) {
        self.paused = true;
        ticker.pause_all();
        let _ = self.events.send(SystemEvent::Pause);
    }

    pub fn on_play<P: MotorPins>(&mut self, ticker: &mut StepTicker<P>) {
        self.paused = false;
        ticker.unpause_all();
        let _ = self.events.send(SystemEvent::Play);
    }

    // M17 energizes the steppers; M18/M84 release them unless an E letter
    // asks to keep the extruder held.
    pub fn on_gcode_execute<P: MotorPins>(&mut self, gcode: &GcodeCommand, ticker: &mut StepTicker<P>) {
        if gcode.mnemonic != Mnemonic::M {
            return;
        }
        match gcode.major {
            17 => self.turn_enable_pins_on(ticker),
            18 | 84 if !gcode.has_letter('E') => self.turn_enable_pins_off(ticker),
            _ => {}
        }
    }

    pub fn turn_enable_pins_on<P: MotorPins>(&mut self, ticker: &mut StepTicker<P>) {
        ticker.enable_all(true);
        self.enable_pins_status = true;
        debug!("steppers enabled");
    }

    pub fn turn_enable_pins_off<P: MotorPins>(&mut self, ticker: &mut StepTicker<P>) {
        ticker.enable_all(false);
        self.enable_pins_status = false;
        debug!("steppers disabled");
    }

    pub fn enable_pins_status(&self) -> bool {
        self.enable_pins_status
    }

    pub fn minimum_steps_per_second(&self) -> f32 {
        self.minimum_steps_per_second
    }

    // A new block was popped from the queue.
    pub fn on_block_begin<P: MotorPins, T: MatchTimer>(
        &mut self,
        block: &Block,
        ticker: &mut StepTicker<P>,
        step_timer: &mut T,
        accel_timer: &mut T,
    ) {
        // zero-length blocks pass straight through
        if block.millimeters == 0.0 {
            return;
        }
        if block.steps.iter().all(|&s| s == 0) {
            return;
        }
        if ticker.motor_count() == 0 {
            return;
        }

        let mut block = block.clone();
        block.take();

        // we can't move with the enable pins off
        if !self.enable_pins_status {
            self.turn_enable_pins_on(ticker);
        }

        // the dominant axis is the one the speed calculations follow
        let mut main = 0;
        for axis in 1..MAX_AXES {
            if block.steps[axis] > block.steps[main] {
                main = axis;
            }
        }
        self.main_stepper = main;

        for axis in 0..MAX_AXES.min(ticker.motor_count()) {
            if block.steps[axis] > 0 {
                ticker.begin_move(step_timer, axis, block.direction(axis), block.steps[axis]);
                ticker.motor_mut(axis).rate_ratio =
                    block.steps[axis] as f32 / block.steps_event_count as f32;
            }
        }

        trace!(
            "block begin: steps {:?}, {} -> {} -> {} steps/s",
            block.steps, block.initial_rate, block.nominal_rate, block.final_rate
        );

        // reset the trapezoid: the initial rate is pushed as-is by the
        // synchronous tick below, before any step interrupt can run
        self.trapezoid_adjusted_rate = block.initial_rate;
        self.force_speed_update = true;
        self.current_block = Some(block);
        let _ = self.events.send(SystemEvent::BlockBegin);

        self.trapezoid_generator_tick(ticker, step_timer);
        self.synchronize_acceleration(ticker, step_timer, accel_timer);
    }

    // Outcomes of a serviced step edge, delivered after the tick: a hit
    // signal step re-phases the acceleration ticker at the start of
    // deceleration.
    pub fn on_step_events<P: MotorPins, T: MatchTimer>(
        &mut self,
        summary: StepSummary,
        ticker: &mut StepTicker<P>,
        step_timer: &mut T,
        accel_timer: &mut T,
    ) {
        if summary.signal_step {
            self.synchronize_acceleration(ticker, step_timer, accel_timer);
        }
    }

    // A stepper motor finished its assigned movement. Only once none is
    // still moving is the block done.
    pub fn on_moves_finished<P: MotorPins>(&mut self, ticker: &mut StepTicker<P>) {
        if ticker.any_moving() {
            return;
        }
        self.release_block();
    }

    // Idempotent: releasing with no block assigned is a no-op.
    pub fn release_block(&mut self) {
        if let Some(mut block) = self.current_block.take() {
            block.release();
            trace!("block released");
            let _ = self.events.send(SystemEvent::BlockEnd);
        }
    }

    // None without a block; the phase boundaries are step counts of the
    // dominant axis.
    pub fn trapezoid_phase(&self, current_steps_completed: u32) -> Option<TrapezoidPhase> {
        let block = self.current_block.as_ref()?;
        Some(if self.flush {
            TrapezoidPhase::Flushing
        } else if current_steps_completed <= block.accelerate_until + 1 {
            TrapezoidPhase::Accelerating
        } else if current_steps_completed > block.decelerate_after {
            TrapezoidPhase::Decelerating
        } else {
            TrapezoidPhase::Cruising
        })
    }

    // Called acceleration_ticks_per_second times per second, and once
    // synchronously at block begin to establish the initial rate.
    pub fn trapezoid_generator_tick<P: MotorPins, T: MatchTimer>(
        &mut self,
        ticker: &mut StepTicker<P>,
        step_timer: &mut T,
    ) {
        // do not do the accel math for nothing
        if self.paused || ticker.active_motor_bm == 0 {
            return;
        }
        let Some(block) = self.current_block.as_ref() else {
            return;
        };
        let rate_delta = block.rate_delta;
        let nominal_rate = block.nominal_rate;
        let final_rate = block.final_rate;
        let current_steps_completed = ticker.motor(self.main_stepper).stepped;
        let phase = match self.trapezoid_phase(current_steps_completed) {
            Some(phase) => phase,
            None => return,
        };

        if self.force_speed_update {
            // the rate was set explicitly, just push it
            self.force_speed_update = false;
        } else {
            match phase {
                TrapezoidPhase::Flushing => {
                    // drain to the floor, then stop everything and give the
                    // block back
                    if self.trapezoid_adjusted_rate > rate_delta * 1.5 {
                        self.trapezoid_adjusted_rate -= rate_delta;
                    } else if self.trapezoid_adjusted_rate <= rate_delta * 0.5 {
                        for axis in 0..MAX_AXES.min(ticker.motor_count()) {
                            let direction = ticker.motor(axis).direction;
                            ticker.begin_move(step_timer, axis, direction, 0);
                        }
                        self.release_block();
                        return;
                    } else {
                        self.trapezoid_adjusted_rate = rate_delta * 0.5;
                    }
                }
                TrapezoidPhase::Accelerating => {
                    self.trapezoid_adjusted_rate += rate_delta;
                    if self.trapezoid_adjusted_rate > nominal_rate {
                        self.trapezoid_adjusted_rate = nominal_rate;
                    }
                }
                TrapezoidPhase::Decelerating => {
                    // only reduce if the result stays above zero; small
                    // rounding errors must not leave steps hanging after the
                    // last tick
                    if self.trapezoid_adjusted_rate > rate_delta * 1.5 {
                        self.trapezoid_adjusted_rate -= rate_delta;
                    } else {
                        self.trapezoid_adjusted_rate = rate_delta * 0.5;
                    }
                    if self.trapezoid_adjusted_rate < final_rate {
                        self.trapezoid_adjusted_rate = final_rate;
                    }
                }
                TrapezoidPhase::Cruising => {
                    if self.trapezoid_adjusted_rate != nominal_rate {
                        self.trapezoid_adjusted_rate = nominal_rate;
                    }
                }
            }
        }

        self.set_step_events_per_second(self.trapezoid_adjusted_rate, ticker);
    }

    // Push a dominant-axis rate to every moving motor, scaled per axis.
    fn set_step_events_per_second<P: MotorPins>(&mut self, steps_per_second: f32, ticker: &mut StepTicker<P>) {
        let steps_per_second = steps_per_second.max(self.minimum_steps_per_second);
        for index in 0..ticker.motor_count() {
            if ticker.motor(index).moving {
                let ratio = ticker.motor(index).rate_ratio;
                ticker.set_speed(index, steps_per_second * ratio);
            }
        }
        let _ = self.events.send(SystemEvent::SpeedChange(steps_per_second));
    }

    // Keep the acceleration curve in rhythm with the stepping: pend the
    // acceleration interrupt and align its counter with the step timer, so
    // the next acceleration tick lands one period after the last step edge.
    pub fn synchronize_acceleration<P: MotorPins, T: MatchTimer>(
        &mut self,
        ticker: &mut StepTicker<P>,
        step_timer: &mut T,
        accel_timer: &mut T,
    ) {
        accel_timer.pend();
        accel_timer.set_counter(step_timer.counter());

        // at move start, ask the dominant axis to warn us when deceleration
        // begins so we can re-align right at the corner
        if ticker.motor(self.main_stepper).stepped == 0 {
            if let Some(block) = self.current_block.as_ref() {
                let steps_to_move = ticker.motor(self.main_stepper).steps_to_move;
                if block.decelerate_after > 0 && block.decelerate_after < steps_to_move {
                    ticker.motor_mut(self.main_stepper).attach_signal_step(block.decelerate_after);
                }
            }
        }
    }
}

impl Default for Stepper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Block;

    fn stepper_with_block() -> Stepper {
        let mut block = Block::with_steps([1000, 0, 0], 0);
        block.accelerate_until = 50;
        block.decelerate_after = 950;
        block.millimeters = 10.0;
        let mut stepper = Stepper::new();
        stepper.current_block = Some(block);
        stepper
    }

    #[test]
    fn phase_follows_dominant_axis_position() {
        let stepper = stepper_with_block();
        assert_eq!(stepper.trapezoid_phase(0), Some(TrapezoidPhase::Accelerating));
        assert_eq!(stepper.trapezoid_phase(51), Some(TrapezoidPhase::Accelerating));
        assert_eq!(stepper.trapezoid_phase(52), Some(TrapezoidPhase::Cruising));
        assert_eq!(stepper.trapezoid_phase(950), Some(TrapezoidPhase::Cruising));
        assert_eq!(stepper.trapezoid_phase(951), Some(TrapezoidPhase::Decelerating));
    }

    #[test]
    fn flush_overrides_position() {
        let mut stepper = stepper_with_block();
        stepper.set_flush(true);
        assert_eq!(stepper.trapezoid_phase(500), Some(TrapezoidPhase::Flushing));
        stepper.set_flush(false);
        assert_eq!(stepper.trapezoid_phase(500), Some(TrapezoidPhase::Cruising));
    }

    #[test]
    fn no_block_means_no_phase() {
        assert_eq!(Stepper::new().trapezoid_phase(0), None);
    }
}
