//! Trial-division prime factorization.

use crate::{
    Error, Result,
    types::{FactorList, MIN_FACTORIZABLE},
};

/// Returns the prime factors of `n` with multiplicity, smallest first.
///
/// Divides by every candidate `i` while `i * i <= n`, then appends whatever
/// cofactor is left if it is greater than one. Inputs below
/// [`MIN_FACTORIZABLE`] produce an empty list; callers are expected to reject
/// them with [`parse_number`] first.
pub fn prime_factors(mut n: i64) -> FactorList {
    let mut factors = Vec::new();
    let mut i = 2_i64;
    // `i <= n / i` is `i * i <= n` without the overflow near `i64::MAX`.
    while i <= n / i {
        while n % i == 0 {
            factors.push(i);
            n /= i;
        }
        i += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Parses the raw `number` query parameter of a factorize request.
///
/// # Errors
///
/// Returns [`Error::InvalidNumber`] when the value is missing, is not a
/// base-10 signed 64-bit integer, or is smaller than [`MIN_FACTORIZABLE`].
pub fn parse_number(raw: Option<&str>) -> Result<i64> {
    let input = raw.unwrap_or_default();
    match input.parse::<i64>() {
        Ok(n) if n >= MIN_FACTORIZABLE => Ok(n),
        _ => Err(Error::InvalidNumber {
            input: input.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors_small_composites() {
        assert_eq!(prime_factors(6), vec![2, 3]);
        assert_eq!(prime_factors(9), vec![3, 3]);
        assert_eq!(prime_factors(10), vec![2, 5]);
        assert_eq!(prime_factors(360), vec![2, 2, 2, 3, 3, 5]);
    }

    #[test]
    fn smallest_valid_input_is_its_own_factor() {
        assert_eq!(prime_factors(2), vec![2]);
        assert_eq!(prime_factors(3), vec![3]);
    }

    #[test]
    fn primes_and_semiprimes() {
        assert_eq!(prime_factors(1_000_000_007), vec![1_000_000_007]);
        assert_eq!(
            prime_factors(10_007 * 1_000_003),
            vec![10_007, 1_000_003]
        );
        assert_eq!(prime_factors(49), vec![7, 7]);
    }

    #[test]
    fn does_not_overflow_near_max() {
        assert_eq!(
            prime_factors(i64::MAX),
            vec![7, 7, 73, 127, 337, 92_737, 649_657]
        );
    }

    #[test]
    fn product_of_factors_is_input() {
        for n in 2..2_000_i64 {
            let factors = prime_factors(n);
            assert_eq!(factors.iter().product::<i64>(), n, "n = {n}");
            assert!(factors.windows(2).all(|w| w[0] <= w[1]), "n = {n}");
        }
    }

    #[test]
    fn parse_accepts_valid_numbers() {
        assert_eq!(parse_number(Some("2")), Ok(2));
        assert_eq!(parse_number(Some("9223372036854775807")), Ok(i64::MAX));
    }

    #[test]
    fn parse_rejects_invalid_numbers() {
        for raw in [None, Some(""), Some("1"), Some("0"), Some("-12"), Some("abc"), Some(" 6")] {
            let err = parse_number(raw).unwrap_err();
            assert!(matches!(err, Error::InvalidNumber { .. }), "{raw:?}");
        }
        assert_eq!(
            parse_number(Some("1")).unwrap_err().to_string(),
            "please provide a valid number (>= 2)"
        );
    }
}
