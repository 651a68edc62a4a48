//! Room code generation.
//!
//! Codes are 12 base62 characters, each drawn uniformly from CSPRNG bytes by
//! rejection sampling (about 71 bits per code). Collisions are rare; the
//! lifecycle manager still retries on the store's uniqueness violation.

use crate::errors::RoomError;
use ring::rand::{SecureRandom, SystemRandom};

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of generated room codes.
pub const ROOM_CODE_LENGTH: usize = 12;

/// Bytes at or above this value are discarded: 248 = 4 * 62, so every
/// accepted byte maps onto the alphabet with equal weight.
const ACCEPT_BELOW: u8 = 248;

/// Random bytes drawn per refill. Enough for one code almost always.
const RANDOM_BATCH: usize = 16;

/// Source of candidate room codes.
pub trait RoomCodeSource: Send + Sync {
    fn next_code(&self) -> Result<String, RoomError>;
}

/// Codes from the system CSPRNG.
#[derive(Debug)]
pub struct RandomRoomCodes {
    rng: SystemRandom,
}

impl RandomRoomCodes {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for RandomRoomCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCodeSource for RandomRoomCodes {
    fn next_code(&self) -> Result<String, RoomError> {
        let mut code = String::with_capacity(ROOM_CODE_LENGTH);
        let mut batch = [0u8; RANDOM_BATCH];
        while code.len() < ROOM_CODE_LENGTH {
            self.rng.fill(&mut batch).map_err(|e| {
                tracing::error!(target: "room.coordinator", error = %e, "Failed to generate random bytes for room code");
                RoomError::Internal("RNG failure".to_string())
            })?;
            push_uniform_chars(&mut code, &batch);
        }
        Ok(code)
    }
}

/// Append one alphabet character per accepted byte until `code` is full.
fn push_uniform_chars(code: &mut String, bytes: &[u8]) {
    for &b in bytes {
        if code.len() == ROOM_CODE_LENGTH {
            return;
        }
        if b >= ACCEPT_BELOW {
            continue;
        }
        // b % 62 < 62, always a valid alphabet position
        if let Some(&ch) = ALPHABET.get(usize::from(b % 62)) {
            code.push(char::from(ch));
        }
    }
}

/// Whether a string has the shape of a generated room code.
pub fn looks_like_room_code(candidate: &str) -> bool {
    candidate.len() == ROOM_CODE_LENGTH && candidate.bytes().all(|b| b.is_ascii_alphanumeric())
}
