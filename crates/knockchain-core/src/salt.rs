use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::env::Environment;

/// Characters a generated salt is drawn from: ASCII letters, digits and
/// punctuation except `"` and `\`, so the salt can be quoted in shell and
/// config files unescaped.
pub const SALT_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&'()*+,-./:;<=>?@[]^_`{|}~";

/// Generate a random salt of `len` characters.
pub fn generate_salt(len: usize, env: &impl Environment) -> String {
    let mut rng = StdRng::from_seed(env.random_seed());
    (0..len).map(|_| char::from(SALT_ALPHABET[rng.gen_range(0..SALT_ALPHABET.len())])).collect()
}
