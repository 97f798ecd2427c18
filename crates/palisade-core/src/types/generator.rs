use crate::types::IdError;
use std::{
    sync::{LazyLock, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};
use ulid::Ulid;

///
/// GENERATOR is lazily initiated with a Mutex
/// it has to keep state to make sure key order is maintained
///

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generate a ULID using the global monotonic generator.
pub(crate) fn generate() -> Result<Ulid, IdError> {
    let mut generator = GENERATOR.lock().expect("ULID generator mutex poisoned");

    generator.generate()
}

///
/// Generator
///
/// Monotonic ULID source. The `ulid` crate's own generator needs an
/// external RNG, so randomness comes from a splitmix64 stream seeded
/// from the clock at first use.
///

struct Generator {
    previous: Ulid,
    stream: u64,
}

impl Generator {
    fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.subsec_nanos().into());

        Self {
            previous: Ulid::nil(),
            stream: seed ^ 0x9e37_79b9_7f4a_7c15,
        }
    }

    /// Monotonic ULID generation; increments within the same millisecond.
    fn generate(&mut self) -> Result<Ulid, IdError> {
        let last_ts = self.previous.timestamp_ms();
        let ts = now_millis();

        // maybe time went backward, or it is the same ms.
        // increment instead of generating a new random so that it is monotonic
        if ts <= last_ts {
            if let Some(next) = self.previous.increment() {
                self.previous = next;

                return Ok(self.previous);
            }

            return Err(IdError::GeneratorOverflow);
        }

        let rand = self.next_u128();
        let ulid = Ulid::from_parts(ts, rand);

        self.previous = ulid;

        Ok(ulid)
    }

    // splitmix64, widened to the 80 random bits a ULID carries
    fn next_u64(&mut self) -> u64 {
        self.stream = self.stream.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.stream;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn next_u128(&mut self) -> u128 {
        (u128::from(self.next_u64()) << 64) | u128::from(self.next_u64())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ulids_are_strictly_increasing() {
        let mut generator = Generator::new();
        let mut prev = generator.generate().unwrap();

        for _ in 0..1000 {
            let next = generator.generate().unwrap();
            assert!(next > prev);
            prev = next;
        }
    }
}
