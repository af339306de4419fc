use std::thread;
use std::time::Duration;

// One strategy per resource type; apply is a pure function of tries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStrategy {
    Spin,
    Yield,
    IncrementalBackoff {
        spin_tries: u64,
        yield_tries: u64,
        max_sleep_micros: u64,
    },
    ConstantSleep {
        micros: u64,
    },
}

impl WaitStrategy {
    pub const SPIN_TRIES: u64 = 100;
    pub const YIELD_TRIES: u64 = 1_000;
    pub const BASE_SLEEP_MICROS: u64 = 50;
    pub const MAX_SLEEP_MICROS: u64 = 1_000;

    pub const fn incremental_backoff() -> Self {
        WaitStrategy::IncrementalBackoff {
            spin_tries: Self::SPIN_TRIES,
            yield_tries: Self::YIELD_TRIES,
            max_sleep_micros: Self::MAX_SLEEP_MICROS,
        }
    }

    pub fn apply(&self, tries: u64) {
        match *self {
            WaitStrategy::Spin => std::hint::spin_loop(),
            WaitStrategy::Yield => thread::yield_now(),
            WaitStrategy::IncrementalBackoff {
                spin_tries,
                yield_tries,
                max_sleep_micros,
            } => {
                if tries < spin_tries {
                    std::hint::spin_loop();
                } else if tries < yield_tries {
                    thread::yield_now();
                } else {
                    let micros = backoff_micros(tries - yield_tries, max_sleep_micros);
                    thread::sleep(Duration::from_micros(micros));
                }
            }
            WaitStrategy::ConstantSleep { micros } => thread::sleep(Duration::from_micros(micros)),
        }
    }
}

impl Default for WaitStrategy {
    fn default() -> Self {
        Self::incremental_backoff()
    }
}

fn backoff_micros(sleeps: u64, max_sleep_micros: u64) -> u64 {
    let shift = sleeps.min(31) as u32;
    WaitStrategy::BASE_SLEEP_MICROS
        .saturating_mul(1_u64 << shift)
        .min(max_sleep_micros.max(WaitStrategy::BASE_SLEEP_MICROS))
}
