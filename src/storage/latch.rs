//! Reader/writer latch with explicit lock and unlock
//!
//! B+tree latch coupling releases ancestor latches from a different scope
//! than the one that acquired them, so RAII guards do not fit. The latch is
//! a condition-variable protected counter: positive = reader count, -1 = a
//! writer.

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct RwLatch {
    state: Mutex<i32>,
    cv: Condvar,
}

impl RwLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_read(&self) {
        let mut state = self.state.lock().unwrap();
        while *state < 0 {
            state = self.cv.wait(state).unwrap();
        }
        *state += 1;
    }

    pub fn unlock_read(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(*state > 0);
        *state -= 1;
        if *state == 0 {
            self.cv.notify_all();
        }
    }

    pub fn lock_write(&self) {
        let mut state = self.state.lock().unwrap();
        while *state != 0 {
            state = self.cv.wait(state).unwrap();
        }
        *state = -1;
    }

    pub fn unlock_write(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert_eq!(*state, -1);
        *state = 0;
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_readers_share_writer_excludes() {
        let latch = Arc::new(RwLatch::new());
        let counter = Arc::new(AtomicI32::new(0));

        latch.lock_read();
        latch.lock_read();
        latch.unlock_read();

        // A writer must wait for the remaining reader.
        let t = {
            let latch = Arc::clone(&latch);
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                latch.lock_write();
                counter.store(1, Ordering::SeqCst);
                latch.unlock_write();
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        latch.unlock_read();
        t.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
