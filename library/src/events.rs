use arrayvec::ArrayVec;

// Notifications published by the motion core for other modules to consume.
// Publishing happens in the caller's context, so handlers drain the queue
// from the main loop, never from an interrupt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SystemEvent {
    BlockBegin,
    BlockEnd,
    SpeedChange(f32),
    Play,
    Pause,
}

// Bounded single-producer queue. When full the publish is dropped rather
// than blocking; consumers that care drain every dispatch.
pub struct Channel<T, const SIZE: usize> {
    buffer: ArrayVec<T, SIZE>,
}

impl<T, const SIZE: usize> Default for Channel<T, SIZE> {
    fn default() -> Self {
        Self { buffer: ArrayVec::new() }
    }
}

impl<T, const SIZE: usize> Channel<T, SIZE> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, item: T) -> Result<(), T> {
        if self.buffer.remaining_capacity() != 0 {
            self.buffer.push(item);
            Ok(())
        } else {
            Err(item)
        }
    }

    pub fn receive(&mut self) -> Option<T> {
        if self.buffer.is_empty() {
            None
        } else {
            self.buffer.drain(0..1).next()
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
