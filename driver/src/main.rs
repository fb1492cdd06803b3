mod pins;

use std::collections::VecDeque;

use motion::{
    Block, Config, GcodeCommand, MotionSystem, SimTimer, SystemEvent, ACCELERATION_TICKS_PER_SECOND,
    BASE_STEPPING_FREQUENCY, MICROSECONDS_PER_STEP_PULSE, MINIMUM_STEPS_PER_MINUTE,
};
use pins::CountingPins;
use tracing::{debug, info, warn};

const SIM_TICKS_PER_SECOND: u32 = 1_000_000;
// bail out of the simulation loop after this much simulated time
const MAX_SIM_TICKS: u64 = 20_000_000;

fn demo_blocks() -> VecDeque<Block> {
    let mut trapezoid = Block::with_steps([800, 0, 0], 0);
    trapezoid.initial_rate = 200.0;
    trapezoid.nominal_rate = 2000.0;
    trapezoid.final_rate = 200.0;
    trapezoid.rate_delta = 200.0;
    trapezoid.accelerate_until = 80;
    trapezoid.decelerate_after = 720;
    trapezoid.millimeters = 10.0;

    let mut diagonal = Block::with_steps([300, 400, 0], 0b01);
    diagonal.initial_rate = 1500.0;
    diagonal.nominal_rate = 1500.0;
    diagonal.final_rate = 1500.0;
    diagonal.rate_delta = 150.0;
    diagonal.accelerate_until = 0;
    diagonal.decelerate_after = 400;
    diagonal.millimeters = 5.0;

    let mut plunge = Block::with_steps([0, 0, 120], 0b100);
    plunge.initial_rate = 600.0;
    plunge.nominal_rate = 600.0;
    plunge.final_rate = 600.0;
    plunge.rate_delta = 60.0;
    plunge.accelerate_until = 0;
    plunge.decelerate_after = 120;
    plunge.millimeters = 1.5;

    VecDeque::from([trapezoid, diagonal, plunge])
}

fn main() {
    tracing_subscriber::fmt().init();

    let mut config = Config::new();
    config.set(BASE_STEPPING_FREQUENCY, 50_000.0).unwrap();
    config.set(MICROSECONDS_PER_STEP_PULSE, 5.0).unwrap();
    config.set(ACCELERATION_TICKS_PER_SECOND, 100.0).unwrap();
    config.set(MINIMUM_STEPS_PER_MINUTE, 3000.0).unwrap();

    let pins = CountingPins::default();
    let mut system = MotionSystem::new(
        pins.clone(),
        SimTimer::new(SIM_TICKS_PER_SECOND),
        SimTimer::new(SIM_TICKS_PER_SECOND),
        &config,
    )
    .expect("motion core configuration");
    for _ in 0..3 {
        system.add_motor().expect("motor registration");
    }

    system.on_gcode_execute(&GcodeCommand::m(17));
    info!("steppers energized (M17)");

    let mut queue = demo_blocks();
    let total_blocks = queue.len();
    let mut finished_blocks = 0usize;
    if let Some(block) = queue.pop_front() {
        info!(steps = ?block.steps, "block begin");
        system.on_block_begin(&block);
    }

    let mut elapsed: u64 = 0;
    while finished_blocks < total_blocks && elapsed < MAX_SIM_TICKS {
        system.run(1000);
        elapsed += 1000;
        while let Some(event) = system.poll_event() {
            match event {
                SystemEvent::BlockEnd => {
                    finished_blocks += 1;
                    info!(
                        elapsed_ms = elapsed / 1000,
                        x = pins.pulses(0),
                        y = pins.pulses(1),
                        z = pins.pulses(2),
                        "block end"
                    );
                    if let Some(block) = queue.pop_front() {
                        info!(steps = ?block.steps, "block begin");
                        system.on_block_begin(&block);
                    }
                }
                SystemEvent::SpeedChange(rate) => debug!(rate, "speed change"),
                SystemEvent::BlockBegin | SystemEvent::Play | SystemEvent::Pause => {}
            }
        }
    }

    if finished_blocks < total_blocks {
        warn!("simulation hit the time limit with blocks outstanding");
    }

    system.on_gcode_execute(&GcodeCommand::m(84));
    info!(enabled = pins.enabled(0), "steppers released (M84)");
    info!(
        x = pins.pulses(0),
        y = pins.pulses(1),
        z = pins.pulses(2),
        z_dir = pins.direction(2),
        "total pulses"
    );
}
