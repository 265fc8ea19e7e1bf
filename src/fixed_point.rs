//! Signed 17.14 fixed-point arithmetic for the MLFQS policy.
//!
//! The format devotes 1 sign bit, 17 integer bits and 14 fractional bits to
//! a 32-bit word. It exists purely so `recent_cpu` and `load_avg` can carry
//! fractional precision without floating point, matching the source this
//! policy is derived from.

/// A signed 17.14 fixed-point value.
pub type Fp = i32;

const FRACTION_BITS: u32 = 14;
const F: i64 = 1 << FRACTION_BITS;

/// Convert an integer to fixed-point.
pub const fn from_int(n: i32) -> Fp {
    (n as i64 * F) as Fp
}

/// Truncate a fixed-point value toward zero.
pub const fn to_int_trunc(x: Fp) -> i32 {
    (x as i64 / F) as i32
}

/// Round a fixed-point value to the nearest integer.
///
/// Ties round away from zero: add half before truncating for non-negative
/// values, subtract half for negative ones.
pub const fn to_int_round(x: Fp) -> i32 {
    let x = x as i64;
    let rounded = if x >= 0 { x + F / 2 } else { x - F / 2 };
    (rounded / F) as i32
}

/// Add two fixed-point values.
pub const fn add(a: Fp, b: Fp) -> Fp {
    a + b
}

/// Subtract two fixed-point values.
pub const fn sub(a: Fp, b: Fp) -> Fp {
    a - b
}

/// Add an integer to a fixed-point value.
pub const fn add_int(x: Fp, n: i32) -> Fp {
    x + from_int(n)
}

/// Subtract an integer from a fixed-point value.
pub const fn sub_int(x: Fp, n: i32) -> Fp {
    x - from_int(n)
}

/// Multiply two fixed-point values.
pub fn mul(a: Fp, b: Fp) -> Fp {
    ((a as i64 * b as i64) / F) as Fp
}

/// Divide two fixed-point values.
pub fn div(a: Fp, b: Fp) -> Fp {
    ((a as i64 * F) / b as i64) as Fp
}

/// Multiply a fixed-point value by an integer.
pub const fn mul_int(x: Fp, n: i32) -> Fp {
    x * n
}

/// Divide a fixed-point value by an integer.
pub const fn div_int(x: Fp, n: i32) -> Fp {
    x / n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        assert_eq!(to_int_trunc(from_int(5)), 5);
        assert_eq!(to_int_trunc(from_int(-5)), -5);
    }

    #[test]
    fn round_nearest() {
        let half = from_int(1) / 2; // 0.5 in fixed point
        assert_eq!(to_int_round(half), 1);
        assert_eq!(to_int_round(-half), -1);
        assert_eq!(to_int_round(from_int(3)), 3);
    }

    #[test]
    fn mul_div_identity() {
        let a = from_int(10);
        let b = from_int(4);
        let product = mul(a, b);
        assert_eq!(to_int_trunc(product), 40);
        let quotient = div(a, b);
        assert_eq!(to_int_round(quotient), 3); // 10/4 = 2.5, rounds to 3
    }

    #[test]
    fn mixed_ops() {
        let a = from_int(10);
        assert_eq!(to_int_trunc(add_int(a, 5)), 15);
        assert_eq!(to_int_trunc(sub_int(a, 5)), 5);
        assert_eq!(to_int_trunc(mul_int(a, 3)), 30);
        assert_eq!(to_int_trunc(div_int(a, 2)), 5);
    }

    #[test]
    fn load_avg_formula_shape() {
        // (59/60)*load_avg + (1/60)*ready_threads, starting load_avg = 0, 1 ready thread
        let fifty_nine_sixtieths = div(from_int(59), from_int(60));
        let one_sixtieth = div(from_int(1), from_int(60));
        let load_avg = add(mul(fifty_nine_sixtieths, 0), mul_int(one_sixtieth, 1));
        // should be close to 1/60 = 0.01666...
        assert!(to_int_round(mul_int(load_avg, 100)) == 2 || to_int_round(mul_int(load_avg, 100)) == 1);
    }
}
