//! Arbitrary-precision integers stored as digit value blocks.
//!
//! The magnitude is a little-endian run of base-256 digits, one digit per
//! block, so a node like `[INT][LEN][SIGN][D0]...[DN][LEN][INT]` stays
//! navigable in both directions without a separate length table. The digit
//! count is capped: operations whose result would exceed the cap report
//! overflow and the caller materializes an `Undefined` node instead.

use crate::block::Type;

/// Maximum number of magnitude digits. Results beyond this are overflow.
pub const MAX_DIGITS: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigInt {
    pub negative: bool,
    /// Little-endian base-256 magnitude, without leading (most significant)
    /// zero digits. Zero is the empty magnitude with `negative == false`.
    pub digits: Vec<u8>,
}

impl BigInt {
    pub fn zero() -> BigInt {
        BigInt {
            negative: false,
            digits: Vec::new(),
        }
    }

    pub fn from_i64(value: i64) -> BigInt {
        let negative = value < 0;
        let mut magnitude = value.unsigned_abs();
        let mut digits = Vec::new();
        while magnitude > 0 {
            digits.push((magnitude & 0xFF) as u8);
            magnitude >>= 8;
        }
        BigInt { negative, digits }
    }

    /// Decode from the digit blocks of an integer node.
    pub fn from_blocks(negative: bool, digits: &[u8]) -> BigInt {
        let mut digits = digits.to_vec();
        while digits.last() == Some(&0) {
            digits.pop();
        }
        let negative = negative && !digits.is_empty();
        BigInt { negative, digits }
    }

    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn is_one(&self) -> bool {
        !self.negative && self.digits == [1]
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.digits.len() > 8 {
            return None;
        }
        let mut magnitude: u128 = 0;
        for (i, digit) in self.digits.iter().enumerate() {
            magnitude |= (*digit as u128) << (8 * i);
        }
        if self.negative {
            if magnitude > i64::MAX as u128 + 1 {
                return None;
            }
            Some((magnitude as i128).wrapping_neg() as i64)
        } else {
            if magnitude > i64::MAX as u128 {
                return None;
            }
            Some(magnitude as i64)
        }
    }

    pub fn to_f64(&self) -> f64 {
        let mut value = 0.0;
        for digit in self.digits.iter().rev() {
            value = value * 256.0 + *digit as f64;
        }
        if self.negative {
            -value
        } else {
            value
        }
    }

    pub fn negated(&self) -> BigInt {
        BigInt {
            negative: !self.negative && !self.is_zero(),
            digits: self.digits.clone(),
        }
    }

    /// Compare magnitudes only.
    fn magnitude_cmp(&self, other: &BigInt) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match self.digits.len().cmp(&other.digits.len()) {
            Ordering::Equal => {}
            order => return order,
        }
        for (a, b) in self.digits.iter().rev().zip(other.digits.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                order => return order,
            }
        }
        Ordering::Equal
    }

    fn magnitude_add(a: &[u8], b: &[u8]) -> Vec<u8> {
        let mut digits = Vec::with_capacity(a.len().max(b.len()) + 1);
        let mut carry = 0u16;
        for i in 0..a.len().max(b.len()) {
            let da = *a.get(i).unwrap_or(&0) as u16;
            let db = *b.get(i).unwrap_or(&0) as u16;
            let sum = da + db + carry;
            digits.push((sum & 0xFF) as u8);
            carry = sum >> 8;
        }
        if carry > 0 {
            digits.push(carry as u8);
        }
        digits
    }

    /// Subtract the smaller magnitude from the larger one; the caller
    /// guarantees `a >= b`.
    fn magnitude_sub(a: &[u8], b: &[u8]) -> Vec<u8> {
        let mut digits = Vec::with_capacity(a.len());
        let mut borrow = 0i16;
        for i in 0..a.len() {
            let da = a[i] as i16;
            let db = *b.get(i).unwrap_or(&0) as i16;
            let mut diff = da - db - borrow;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            digits.push(diff as u8);
        }
        debug_assert_eq!(borrow, 0);
        while digits.last() == Some(&0) {
            digits.pop();
        }
        digits
    }

    /// Signed addition. `None` on overflow of the digit cap.
    pub fn checked_add(&self, other: &BigInt) -> Option<BigInt> {
        use std::cmp::Ordering;
        let result = if self.negative == other.negative {
            BigInt {
                negative: self.negative,
                digits: BigInt::magnitude_add(&self.digits, &other.digits),
            }
        } else {
            match self.magnitude_cmp(other) {
                Ordering::Equal => BigInt::zero(),
                Ordering::Greater => BigInt {
                    negative: self.negative,
                    digits: BigInt::magnitude_sub(&self.digits, &other.digits),
                },
                Ordering::Less => BigInt {
                    negative: other.negative,
                    digits: BigInt::magnitude_sub(&other.digits, &self.digits),
                },
            }
        };
        result.capped()
    }

    pub fn checked_mul(&self, other: &BigInt) -> Option<BigInt> {
        if self.is_zero() || other.is_zero() {
            return Some(BigInt::zero());
        }
        if self.digits.len() + other.digits.len() > MAX_DIGITS + 1 {
            return None;
        }
        let mut digits = vec![0u8; self.digits.len() + other.digits.len()];
        for (i, a) in self.digits.iter().enumerate() {
            let mut carry = 0u32;
            for (j, b) in other.digits.iter().enumerate() {
                let cell = digits[i + j] as u32 + (*a as u32) * (*b as u32) + carry;
                digits[i + j] = (cell & 0xFF) as u8;
                carry = cell >> 8;
            }
            let mut k = i + other.digits.len();
            while carry > 0 {
                let cell = digits[k] as u32 + carry;
                digits[k] = (cell & 0xFF) as u8;
                carry = cell >> 8;
                k += 1;
            }
        }
        while digits.last() == Some(&0) {
            digits.pop();
        }
        BigInt {
            negative: self.negative != other.negative,
            digits,
        }
        .capped()
    }

    /// Exponentiation by a non-negative exponent, by squaring.
    pub fn checked_pow(&self, exponent: u32) -> Option<BigInt> {
        let mut result = BigInt::from_i64(1);
        let mut base = self.clone();
        let mut exponent = exponent;
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result.checked_mul(&base)?;
            }
            exponent >>= 1;
            if exponent > 0 {
                base = base.checked_mul(&base)?;
            }
        }
        Some(result)
    }

    /// Exact division, when the remainder is zero. Division by zero is the
    /// caller's problem (it maps to an `Undefined` node before reaching
    /// this point).
    pub fn checked_exact_div(&self, other: &BigInt) -> Option<BigInt> {
        debug_assert!(!other.is_zero());
        // Digit counts are capped, so going through i64 never loses range
        // worth keeping: a non-i64 quotient either keeps the node symbolic
        // or overflows anyway.
        let a = self.to_i64()?;
        let b = other.to_i64()?;
        if b == 0 || a % b != 0 {
            return None;
        }
        Some(BigInt::from_i64(a / b))
    }

    fn capped(self) -> Option<BigInt> {
        if self.digits.len() > MAX_DIGITS {
            None
        } else {
            Some(self)
        }
    }

    /// The node encoding: `[INT][LEN][SIGN][digits...][LEN][INT]`.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.digits.len() as u8;
        let mut blocks = Vec::with_capacity(self.digits.len() + 5);
        blocks.push(Type::Integer.block());
        blocks.push(len);
        blocks.push(self.negative as u8);
        blocks.extend_from_slice(&self.digits);
        blocks.push(len);
        blocks.push(Type::Integer.block());
        blocks
    }
}

impl std::fmt::Display for BigInt {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.to_i64() {
            Some(value) => write!(f, "{}", value),
            None => {
                // Repeated division by 10 on the digit vector
                let mut digits = self.digits.clone();
                let mut decimal = Vec::new();
                while !digits.is_empty() {
                    let mut remainder = 0u32;
                    for digit in digits.iter_mut().rev() {
                        let cell = remainder * 256 + *digit as u32;
                        *digit = (cell / 10) as u8;
                        remainder = cell % 10;
                    }
                    decimal.push((b'0' + remainder as u8) as char);
                    while digits.last() == Some(&0) {
                        digits.pop();
                    }
                }
                if self.negative {
                    write!(f, "-")?;
                }
                for c in decimal.iter().rev() {
                    write!(f, "{}", c)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod specs {
    use super::*;

    #[test]
    fn i64_round_trip() {
        for value in [0i64, 1, -1, 255, 256, -257, 65_535, 1 << 40, -(1 << 40)] {
            let big = BigInt::from_i64(value);
            assert_eq!(big.to_i64(), Some(value));
        }
    }

    #[test]
    fn zero_is_canonical() {
        let zero = BigInt::from_i64(0);
        assert!(zero.is_zero());
        assert!(!zero.negative);
        assert!(zero.digits.is_empty());
        assert_eq!(zero.negated(), zero);
    }

    #[test]
    fn addition_mixed_signs() {
        let a = BigInt::from_i64(300);
        let b = BigInt::from_i64(-44);
        assert_eq!(a.checked_add(&b).unwrap().to_i64(), Some(256));
        assert_eq!(b.checked_add(&a).unwrap().to_i64(), Some(256));
        let c = BigInt::from_i64(-300);
        assert_eq!(a.checked_add(&c).unwrap().to_i64(), Some(0));
    }

    #[test]
    fn multiplication_carries() {
        let a = BigInt::from_i64(1_000_003);
        let b = BigInt::from_i64(-999_983);
        assert_eq!(
            a.checked_mul(&b).unwrap().to_i64(),
            Some(1_000_003 * -999_983)
        );
    }

    #[test]
    fn power_of_two() {
        let two = BigInt::from_i64(2);
        assert_eq!(two.checked_pow(10).unwrap().to_i64(), Some(1024));
        assert_eq!(two.checked_pow(0).unwrap().to_i64(), Some(1));
    }

    #[test]
    fn overflow_is_reported() {
        let two = BigInt::from_i64(2);
        // 2^(8*MAX_DIGITS) takes MAX_DIGITS+1 digits
        assert!(two.checked_pow(8 * MAX_DIGITS as u32).is_none());
        assert!(two.checked_pow(8 * MAX_DIGITS as u32 - 1).is_some());
    }

    #[test]
    fn display_beyond_i64() {
        let two = BigInt::from_i64(2);
        let big = two.checked_pow(70).unwrap();
        assert_eq!(big.to_i64(), None);
        assert_eq!(big.to_string(), "1180591620717411303424");
        assert_eq!(big.negated().to_string(), "-1180591620717411303424");
    }

    #[test]
    fn exact_division() {
        let a = BigInt::from_i64(84);
        let b = BigInt::from_i64(-4);
        assert_eq!(a.checked_exact_div(&b).unwrap().to_i64(), Some(-21));
        let c = BigInt::from_i64(5);
        assert!(a.checked_exact_div(&c).is_none());
    }

    #[test]
    fn encode_layout() {
        let big = BigInt::from_i64(-258);
        let blocks = big.encode();
        assert_eq!(
            blocks,
            vec![Type::Integer.block(), 2, 1, 2, 1, 2, Type::Integer.block()]
        );
    }
}
