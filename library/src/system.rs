use crate::block::Block;
use crate::config::{Config, BASE_STEPPING_FREQUENCY, MICROSECONDS_PER_STEP_PULSE};
use crate::events::SystemEvent;
use crate::gcode::GcodeCommand;
use crate::motor::MotorPins;
use crate::step_ticker::StepTicker;
use crate::stepper::Stepper;
use crate::timer::{MatchTimer, SimTimer};
use crate::Error;

// Wires the step ticker, the trapezoid generator and the two timers
// together and plays the part of the interrupt dispatcher: the step timer's
// match flags route to the ticker, the acceleration timer's to the
// trapezoid tick. On hardware the two ISR trampolines do exactly what
// dispatch() does here.
pub struct MotionSystem<P: MotorPins, T: MatchTimer> {
    pub ticker: StepTicker<P>,
    pub stepper: Stepper,
    pub step_timer: T,
    pub accel_timer: T,
    // extra timer ticks consumed inside the next move-finish window, for
    // exercising the overrun catch-up from simulations
    pub finish_stall_ticks: u32,
}

impl<P: MotorPins, T: MatchTimer> MotionSystem<P, T> {
    pub fn new(pins: P, step_timer: T, accel_timer: T, config: &Config) -> Result<Self, Error> {
        let mut system = Self {
            ticker: StepTicker::new(pins),
            stepper: Stepper::new(),
            step_timer,
            accel_timer,
            finish_stall_ticks: 0,
        };
        system.reload_config(config)?;
        Ok(system)
    }

    pub fn reload_config(&mut self, config: &Config) -> Result<(), Error> {
        let frequency = config.value(BASE_STEPPING_FREQUENCY).by_default(100_000.0).as_number();
        self.ticker.set_frequency(&mut self.step_timer, frequency)?;
        let pulse_us = config.value(MICROSECONDS_PER_STEP_PULSE).by_default(5.0).as_number();
        self.ticker.set_reset_delay(&mut self.step_timer, pulse_us * 1e-6)?;
        self.stepper.on_config_reload(config, &mut self.ticker);

        let accel_period =
            (self.accel_timer.ticks_per_second() as f32 / self.stepper.acceleration_ticks_per_second) as u32;
        if accel_period == 0 {
            return Err(Error::TooFast);
        }
        self.accel_timer.set_match0(accel_period);
        self.accel_timer.restart();
        Ok(())
    }

    pub fn add_motor(&mut self) -> Result<usize, Error> {
        self.ticker.add_stepper_motor()
    }

    pub fn on_block_begin(&mut self, block: &Block) {
        self.stepper.on_block_begin(block, &mut self.ticker, &mut self.step_timer, &mut self.accel_timer);
    }

    pub fn on_gcode_execute(&mut self, gcode: &GcodeCommand) {
        self.stepper.on_gcode_execute(gcode, &mut self.ticker);
    }

    pub fn on_play(&mut self) {
        self.stepper.on_play(&mut self.ticker);
    }

    pub fn on_pause(&mut self) {
        self.stepper.on_pause(&mut self.ticker);
    }

    pub fn set_flush(&mut self, flush: bool) {
        self.stepper.set_flush(flush);
    }

    pub fn poll_event(&mut self) -> Option<SystemEvent> {
        self.stepper.events.receive()
    }

    // Service whatever the timers latched, MR1 strictly before MR0 so a
    // late tick unsteps before it steps again.
    pub fn dispatch(&mut self) {
        if self.step_timer.take_match1() {
            self.ticker.reset_tick(&mut self.step_timer);
        }
        if self.step_timer.take_match0() {
            let stepper = &mut self.stepper;
            let stall = &mut self.finish_stall_ticks;
            let summary = self.ticker.step_tick_with(&mut self.step_timer, |ticker, timer| {
                if *stall > 0 {
                    timer.set_counter(timer.counter() + *stall);
                    *stall = 0;
                }
                stepper.on_moves_finished(ticker);
            });
            self.stepper.on_step_events(summary, &mut self.ticker, &mut self.step_timer, &mut self.accel_timer);
        }
        if self.accel_timer.take_match0() {
            self.stepper.trapezoid_generator_tick(&mut self.ticker, &mut self.step_timer);
        }
    }
}

impl<P: MotorPins> MotionSystem<P, SimTimer> {
    // Simulated time: one tick on both timers, then service the flags.
    pub fn run(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.step_timer.advance(1);
            self.accel_timer.advance(1);
            self.dispatch();
        }
    }
}
