//! Counting semaphore on std `Mutex` + `Condvar`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use duocore_hal::{Semaphore, TakeError, Timeout};

#[derive(Default)]
pub struct StdSemaphore {
    count: Mutex<u32>,
    ready: Condvar,
    waiters: AtomicUsize,
}

impl StdSemaphore {
    fn lock(&self) -> MutexGuard<'_, u32> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_until(&self, mut count: MutexGuard<'_, u32>, deadline: Option<Instant>) -> Result<(), TakeError> {
        while *count == 0 {
            count = match deadline {
                None => self
                    .ready
                    .wait(count)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TakeError::TimedOut);
                    }
                    self.ready
                        .wait_timeout(count, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        *count -= 1;
        Ok(())
    }
}

impl Semaphore for StdSemaphore {
    fn give(&self) {
        *self.lock() += 1;
        self.ready.notify_one();
    }

    fn take(&self, timeout: Timeout) -> Result<(), TakeError> {
        let mut count = self.lock();
        let deadline = match timeout {
            Timeout::NoWait => {
                if *count == 0 {
                    return Err(TakeError::Busy);
                }
                *count -= 1;
                return Ok(());
            }
            Timeout::Forever => None,
            Timeout::Millis(ms) => Some(Instant::now() + Duration::from_millis(ms.ticks().into())),
        };

        self.waiters.fetch_add(1, Ordering::SeqCst);
        let result = self.wait_until(count, deadline);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn count(&self) -> u32 {
        *self.lock()
    }

    fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        *self.lock() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn no_wait_on_zero_is_busy() {
        let sem = StdSemaphore::default();
        assert_eq!(sem.take(Timeout::NoWait), Err(TakeError::Busy));
        sem.give();
        assert_eq!(sem.count(), 1);
        assert_eq!(sem.take(Timeout::NoWait), Ok(()));
    }

    #[test]
    fn bounded_wait_expires() {
        let sem = StdSemaphore::default();
        assert_eq!(sem.take(Timeout::millis(5)), Err(TakeError::TimedOut));
        assert_eq!(sem.waiters(), 0);
    }

    #[test]
    fn give_wakes_blocked_taker() {
        let sem = Arc::new(StdSemaphore::default());
        let taker = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.take(Timeout::Forever))
        };
        while sem.waiters() == 0 {
            thread::yield_now();
        }
        sem.give();
        assert_eq!(taker.join().unwrap(), Ok(()));
        assert_eq!(sem.count(), 0);
    }
}
