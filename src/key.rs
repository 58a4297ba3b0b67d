//! Record identities.
//!
//! Every record in a list lives under a unique [`Key`]. Keys are either
//! supplied by the caller (for keyed writes) or produced by a
//! [`KeyGenerator`], which emits push-style keys: eight characters of
//! millisecond timestamp followed by twelve random characters. Keys from a
//! single generator sort in the order they were generated, even when many
//! are produced within the same millisecond.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rand_core::OsRng;
use rand_core::RngCore;
use serde::Deserialize;
use serde::Serialize;

/// The alphabet used by generated keys, in ascending ASCII order.
pub const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Number of characters encoding the timestamp.
const TIME_CHARS: usize = 8;

/// Number of random characters after the timestamp.
const RANDOM_CHARS: usize = 12;

/// The identity of a record. Stable across moves and changes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Wrap an existing identity.
    pub fn new(key: impl Into<String>) -> Key {
        return Key(key.into());
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        return &self.0;
    }

    /// Consume the key, returning the underlying string.
    pub fn into_string(self) -> String {
        return self.0;
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Key {
        return Key(key.to_string());
    }
}

impl From<String> for Key {
    fn from(key: String) -> Key {
        return Key(key);
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "Key({})", self.0);
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f.write_str(&self.0);
    }
}

/// Produces chronologically ordered push keys.
///
/// When two keys are requested within the same millisecond, the random
/// suffix of the previous key is incremented instead of redrawn, so the
/// second key still sorts after the first.
#[derive(Clone, Debug, Default)]
pub struct KeyGenerator {
    last_time: u64,
    last_random: [u8; RANDOM_CHARS],
}

impl KeyGenerator {
    /// Create a generator with no history.
    pub fn new() -> KeyGenerator {
        return KeyGenerator::default();
    }

    /// Generate a key stamped with the current wall clock.
    pub fn generate(&mut self) -> Key {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        return self.generate_at(now);
    }

    /// Generate a key stamped with the given millisecond timestamp.
    pub fn generate_at(&mut self, millis: u64) -> Key {
        // A clock that steps backwards must not break ordering.
        let millis = millis.max(self.last_time);

        if millis == self.last_time && self.last_time != 0 {
            increment(&mut self.last_random);
        } else {
            let mut bytes = [0u8; RANDOM_CHARS];
            OsRng.fill_bytes(&mut bytes);
            for (slot, byte) in self.last_random.iter_mut().zip(bytes) {
                *slot = byte % 64;
            }
        }
        self.last_time = millis;

        let mut out = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
        let mut time_chars = [0u8; TIME_CHARS];
        let mut time = millis;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(time % 64) as usize];
            time /= 64;
        }
        for c in time_chars {
            out.push(c as char);
        }
        for digit in self.last_random {
            out.push(PUSH_CHARS[digit as usize] as char);
        }
        return Key(out);
    }
}

/// Increment a base-64 digit string by one, carrying to the left.
fn increment(digits: &mut [u8; RANDOM_CHARS]) {
    for digit in digits.iter_mut().rev() {
        if *digit < 63 {
            *digit += 1;
            return;
        }
        *digit = 0;
    }
}
