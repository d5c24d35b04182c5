//! Random identifiers for newly created records.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The alphabet identifiers are drawn from: 52 ASCII letters, no digits or symbols.
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of the identifiers assigned to stored records.
pub const ID_LENGTH: usize = 24;

/// Generates letter-only identifiers from an owned pseudo-random source.
///
/// Identifiers are unique enough for a test run (52^24 possibilities) but are not
/// cryptographically secure.
///
/// ```rust
/// use graylog_mock::IdGenerator;
///
/// let ids = IdGenerator::with_seed(7);
/// let id = ids.generate(24);
/// assert_eq!(id.len(), 24);
/// assert!(id.chars().all(|c| c.is_ascii_alphabetic()));
/// ```
#[derive(Debug)]
pub struct IdGenerator {
    rng: Mutex<StdRng>,
}

impl IdGenerator {
    /// Creates a generator seeded once from the current time.
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(nanos)
    }

    /// Creates a generator with a fixed seed, for reproducible identifiers.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns a string of `len` letters drawn uniformly from the 52-letter alphabet.
    pub fn generate(&self, len: usize) -> String {
        // A poisoned generator still holds a usable RNG state.
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        (0..len)
            .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
            .collect()
    }

    /// Returns a record identifier of [`ID_LENGTH`] letters.
    pub fn generate_id(&self) -> String {
        self.generate(ID_LENGTH)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
