// Q32.32 arithmetic for the step tickers. The integer half counts whole
// step-ticker ticks, the fractional half carries the Bresenham remainder.

pub const FX_SHIFT: u32 = 32;
pub const FX_ONE: u64 = 1 << FX_SHIFT;

// Ticks between two pulses for a given rate, never less than one whole tick
// so a motor can never ask for more than one pulse per tick.
pub fn ticks_per_step(timer_hz: f32, steps_per_second: f32) -> u64 {
    let fx = ((timer_hz as f64 / steps_per_second as f64) * FX_ONE as f64 + 0.5) as u64;
    fx.max(FX_ONE)
}

pub fn whole_ticks(fx: u64) -> u32 {
    (fx >> FX_SHIFT) as u32
}
