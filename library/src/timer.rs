// Match-register timer abstraction. Semantics follow the usual MCU timer
// block: a free-running counter compared against two match registers, with
// per-match interrupt, reset and stop controls. MR0 paces step edges, MR1
// schedules the pulse deassert.
pub trait MatchTimer {
    fn ticks_per_second(&self) -> u32;
    fn counter(&self) -> u32;
    fn set_counter(&mut self, ticks: u32);
    fn match0(&self) -> u32;
    fn set_match0(&mut self, ticks: u32);
    fn set_match1(&mut self, ticks: u32);
    fn set_match1_interrupt(&mut self, on: bool);
    // when armed, a MR1 match resets the counter and stops the timer
    fn set_match1_reset_and_stop(&mut self, on: bool);
    // enable the timer with a fresh counter
    fn restart(&mut self);
    // force the match interrupt to fire at the next dispatch
    fn pend(&mut self);
    // read-and-clear the latched match flags, in the manner of an IR register
    fn take_match0(&mut self) -> bool;
    fn take_match1(&mut self) -> bool;
}

// Software model of the timer block, one tick at a time. Backs the test
// suite and the simulator binary; on hardware an implementation of
// MatchTimer maps straight onto the peripheral registers.
pub struct SimTimer {
    ticks_per_second: u32,
    tc: u32,
    mr0: u32,
    mr1: u32,
    mr0_interrupt: bool,
    mr1_interrupt: bool,
    mr0_reset: bool,
    mr1_reset_and_stop: bool,
    enabled: bool,
    ir0: bool,
    ir1: bool,
}

impl SimTimer {
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            ticks_per_second,
            tc: 0,
            mr0: u32::MAX,
            mr1: u32::MAX,
            mr0_interrupt: true,
            mr1_interrupt: false,
            mr0_reset: true,
            mr1_reset_and_stop: false,
            enabled: false,
            ir0: false,
            ir1: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn advance(&mut self, ticks: u32) {
        for _ in 0..ticks {
            if !self.enabled {
                return;
            }
            self.tc = self.tc.wrapping_add(1);
            if self.tc == self.mr0 {
                if self.mr0_interrupt {
                    self.ir0 = true;
                }
                if self.mr0_reset {
                    self.tc = 0;
                }
            }
            if self.tc == self.mr1 {
                if self.mr1_interrupt {
                    self.ir1 = true;
                }
                if self.mr1_reset_and_stop {
                    self.tc = 0;
                    self.enabled = false;
                }
            }
        }
    }
}

impl MatchTimer for SimTimer {
    fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }

    fn counter(&self) -> u32 {
        self.tc
    }

    fn set_counter(&mut self, ticks: u32) {
        self.tc = ticks;
    }

    fn match0(&self) -> u32 {
        self.mr0
    }

    fn set_match0(&mut self, ticks: u32) {
        self.mr0 = ticks;
    }

    fn set_match1(&mut self, ticks: u32) {
        self.mr1 = ticks;
    }

    fn set_match1_interrupt(&mut self, on: bool) {
        self.mr1_interrupt = on;
    }

    fn set_match1_reset_and_stop(&mut self, on: bool) {
        self.mr1_reset_and_stop = on;
    }

    fn restart(&mut self) {
        self.tc = 0;
        self.enabled = true;
    }

    fn pend(&mut self) {
        self.ir0 = true;
    }

    fn take_match0(&mut self) -> bool {
        let fired = self.ir0;
        self.ir0 = false;
        fired
    }

    fn take_match1(&mut self) -> bool {
        let fired = self.ir1;
        self.ir1 = false;
        fired
    }
}
