
use rand::{thread_rng, Rng};

const RUNES_ALPHANUMERIC: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random string over the given rune table, drawn from the thread CSPRNG.
pub fn generate_crypto_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = thread_rng();

    (0..n)
        .map(|_| {
            let idx = rng.gen_range(0..runes.len());
            runes[idx] as char
        })
        .collect()
}

/// Alphanumeric ufrag material; the caller is responsible for collision
/// checking against its registry.
pub fn generate_ufrag_material(n: usize) -> String {
    generate_crypto_random_string(n, RUNES_ALPHANUMERIC)
}

/// Tiebreaker value for the ICE-CONTROLLING attribute.
pub(crate) fn generate_tie_breaker() -> u64 {
    thread_rng().gen()
}
