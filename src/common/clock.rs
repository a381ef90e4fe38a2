// Copyright (c) 2026 MCU-Debug Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Injectable sleeping and cooperative cancellation.
//!
//! Every wait in the crate (simulated target work, retry backoff, poll intervals, fixed delays)
//! goes through a [`Sleeper`], so tests can run whole command sequences without wall-clock delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Longest single sleep slice when a wait must stay responsive to cancellation.
pub const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(100);

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
    }
}

/// Shared abort flag. Clones observe the same flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep for `duration` in slices, giving up early once `cancel` fires.
/// Returns `false` if the wait was cancelled.
pub fn sleep_cancellable(sleeper: &dyn Sleeper, duration: Duration, cancel: &CancelToken) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let slice = remaining.min(CANCEL_CHECK_SLICE);
        sleeper.sleep(slice);
        remaining -= slice;
    }
    !cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellable_sleep_is_sliced() {
        let sleeper = RecordingSleeper::new();
        let cancel = CancelToken::new();
        assert!(sleep_cancellable(&sleeper, Duration::from_millis(250), &cancel));
        assert_eq!(
            sleeper.sleeps(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(100),
                Duration::from_millis(50)
            ]
        );
    }

    #[test]
    fn cancelled_sleep_stops_early() {
        let sleeper = RecordingSleeper::new();
        let cancel = CancelToken::new();
        cancel.clone().cancel();
        assert!(!sleep_cancellable(&sleeper, Duration::from_secs(5), &cancel));
        assert!(sleeper.sleeps().is_empty());
    }
}
