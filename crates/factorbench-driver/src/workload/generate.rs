//! Synthetic workload generation.
//!
//! A generated workload mixes primes (the slowest inputs for trial division)
//! with semiprimes, all within `[10^8, 10^16]`. One fifth of the numbers are
//! prime. Each number is drawn from a "small" branch with probability
//! [`SMALL_BRANCH_PROBABILITY`] so the latency distribution has a fast mode
//! and a slow mode.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::{fmt::Write as _, io, path::Path};

/// Lower bound of every generated number.
pub const LOWER_BOUND: i64 = 100_000_000;
/// Upper bound of every generated number.
pub const UPPER_BOUND: i64 = 10_000_000_000_000_000;
/// Probability of drawing from the smaller range.
pub const SMALL_BRANCH_PROBABILITY: f64 = 0.3;

const SMALL_PRIMES: (i64, i64) = (100_000_000, 1_000_000_000_000);
const LARGE_PRIMES: (i64, i64) = (1_000_000_000_000, UPPER_BOUND);
const FACTOR_LOWER: i64 = 10_000;
const SMALL_FACTOR_UPPER: i64 = 1_000_000;
const LARGE_FACTOR_UPPER: i64 = 100_000_000;

// Deterministic Miller-Rabin witnesses for every 64-bit integer.
const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Generates `count` numbers, reproducibly for a given `seed`.
pub fn generate(count: usize, seed: u64) -> Vec<i64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let num_prime = count / 5;
    let mut numbers = Vec::with_capacity(count);

    while numbers.len() < num_prime {
        let (lower, upper) = if rng.random_bool(SMALL_BRANCH_PROBABILITY) {
            SMALL_PRIMES
        } else {
            LARGE_PRIMES
        };
        numbers.push(random_prime(&mut rng, lower, upper));
    }

    while numbers.len() < count {
        let upper = if rng.random_bool(SMALL_BRANCH_PROBABILITY) {
            SMALL_FACTOR_UPPER
        } else {
            LARGE_FACTOR_UPPER
        };
        let p = random_prime(&mut rng, FACTOR_LOWER, upper);
        let q = random_prime(&mut rng, FACTOR_LOWER, upper);
        let composite = p * q;
        if (LOWER_BOUND..=UPPER_BOUND).contains(&composite) {
            numbers.push(composite);
        }
    }

    numbers.shuffle(&mut rng);
    numbers
}

/// Writes `numbers` to `path`, one per line.
pub async fn write(path: impl AsRef<Path>, numbers: &[i64]) -> io::Result<()> {
    let mut out = String::with_capacity(numbers.len() * 17);
    for number in numbers {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{number}");
    }
    tokio::fs::write(path, out).await
}

/// Draws a uniformly random odd prime from `[lower, upper)`.
fn random_prime(rng: &mut StdRng, lower: i64, upper: i64) -> i64 {
    loop {
        let candidate = rng.random_range(lower..upper) | 1;
        if candidate < upper && is_prime(candidate as u64) {
            return candidate;
        }
    }
}

/// Deterministic primality test for 64-bit integers.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

const fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}
