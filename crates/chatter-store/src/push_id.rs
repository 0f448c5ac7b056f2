use std::sync::Mutex;

use chrono::Utc;
use rand::Rng;

/// Store key alphabet, ordered by ASCII value so generated keys sort
/// lexicographically in generation order.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

struct GenState {
    last_ts: i64,
    tail: [usize; 12],
}

/// Generates 20-character store keys: 8 characters of base-64 epoch
/// milliseconds followed by 12 characters of entropy. Within a single
/// millisecond the entropy tail is incremented instead of re-rolled, keeping
/// keys unique and ordered under bursts.
pub struct PushIdGenerator {
    state: Mutex<GenState>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GenState {
                last_ts: -1,
                tail: [0; 12],
            }),
        }
    }

    pub fn generate(&self) -> String {
        self.generate_at(Utc::now().timestamp_millis())
    }

    pub(crate) fn generate_at(&self, now: i64) -> String {
        // A poisoned lock only means another thread panicked mid-generate;
        // the counter state itself is always valid.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if now != state.last_ts {
            state.last_ts = now;
            let mut rng = rand::rng();
            for slot in state.tail.iter_mut() {
                *slot = rng.random_range(0..64);
            }
        } else {
            for i in (0..state.tail.len()).rev() {
                if state.tail[i] < 63 {
                    state.tail[i] += 1;
                    break;
                }
                state.tail[i] = 0;
            }
        }

        let mut id = [0u8; 20];
        let mut ts = now;
        for slot in id[..8].iter_mut().rev() {
            *slot = PUSH_CHARS[(ts % 64) as usize];
            ts /= 64;
        }
        for (slot, &idx) in id[8..].iter_mut().zip(state.tail.iter()) {
            *slot = PUSH_CHARS[idx];
        }

        String::from_utf8_lossy(&id).into_owned()
    }
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_20_chars_from_the_key_alphabet() {
        let generator = PushIdGenerator::new();
        let id = generator.generate();
        assert_eq!(id.len(), 20);
        assert!(id.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn later_timestamps_sort_after_earlier_ones() {
        let generator = PushIdGenerator::new();
        let a = generator.generate_at(1_700_000_000_000);
        let b = generator.generate_at(1_700_000_000_001);
        assert!(a < b);
    }

    #[test]
    fn same_millisecond_stays_unique_and_ordered() {
        let generator = PushIdGenerator::new();
        let ts = 1_700_000_000_000;
        let mut previous = generator.generate_at(ts);
        for _ in 0..100 {
            let next = generator.generate_at(ts);
            assert!(previous < next, "{previous} !< {next}");
            previous = next;
        }
    }

    #[test]
    fn timestamp_prefix_round_trips() {
        let generator = PushIdGenerator::new();
        let ts = 1_700_000_000_000_i64;
        let id = generator.generate_at(ts);

        let mut decoded = 0i64;
        for b in id.bytes().take(8) {
            let pos = PUSH_CHARS.iter().position(|&c| c == b).unwrap() as i64;
            decoded = decoded * 64 + pos;
        }
        assert_eq!(decoded, ts);
    }
}
