//! Numeric substrate for the DSP engine.
//!
//! Every runtime component is generic over [`DspNum`]. The default build uses
//! [`Fixed`], a Q4.28 fixed-point number, with [`Wide`] as its 64-bit
//! accumulator. `f32` implements the same trait for the float build.
//!
//! Floating-point conversions exist for design time and tests only; nothing in
//! the per-sample path calls them.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Number of fractional bits in a [`Fixed`].
pub const POINT: u32 = 28;

/// Arithmetic interface shared by the fixed-point and float builds.
pub trait DspNum:
    Copy
    + Debug
    + Default
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + Send
    + Sync
    + 'static
{
    /// Accumulator wide enough to sum several products without rounding.
    type Wide: Copy
        + Debug
        + Default
        + Add<Output = Self::Wide>
        + Sub<Output = Self::Wide>
        + AddAssign;

    const ZERO: Self;
    const ONE: Self;

    /// Product, rounded back to normal width.
    fn mul(self, rhs: Self) -> Self;

    /// Quotient. Panics on a zero denominator in the fixed-point build.
    fn div(self, rhs: Self) -> Self;

    /// Quotient, or `None` when `rhs` is zero.
    fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs == Self::ZERO {
            None
        } else {
            Some(self.div(rhs))
        }
    }

    /// Un-rounded product for deferred compaction.
    fn mul_wide(self, rhs: Self) -> Self::Wide;

    /// The single rounding step from accumulator back to normal width.
    fn compact(acc: Self::Wide) -> Self;

    /// Lift into the accumulator without changing the value.
    fn widen(self) -> Self::Wide {
        self.mul_wide(Self::ONE)
    }

    fn abs(self) -> Self;

    /// Multiply by `2^n`.
    fn shl(self, n: u32) -> Self;

    /// Divide by `2^n`.
    fn shr(self, n: u32) -> Self;

    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;

    /// Map a raw 32-bit word onto `[-1.0, 1.0)`.
    fn from_unit_bits(bits: i32) -> Self;

    /// `self - floor(self)`, in `[0, 1)`.
    fn wrap_unit(self) -> Self;

    /// Replace subnormal values with exact zero.
    fn flush_denormal(self) -> Self {
        self
    }
}

// ── Fixed point ─────────────────────────────────────────────

/// A signed Q4.28 number: raw value `v` stands for `v / 2^28`.
///
/// The representable range is `[-8.0, 8.0)`; the engine keeps signals inside
/// `(-4.0, 4.0)` so that sums of a few products still fit. Nothing checks for
/// overflow at runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Fixed(i32);

impl Fixed {
    /// Build from the raw representation.
    pub const fn from_bits(bits: i32) -> Self {
        Fixed(bits)
    }

    /// The raw representation.
    pub const fn to_bits(self) -> i32 {
        self.0
    }

    /// Smallest positive step.
    pub const EPSILON: Fixed = Fixed(1);
}

impl Add<Self> for Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Fixed(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<Self> for Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Fixed(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Fixed(self.0.wrapping_neg())
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl From<f64> for Fixed {
    fn from(value: f64) -> Self {
        <Fixed as DspNum>::from_f64(value)
    }
}

impl From<Fixed> for f64 {
    fn from(value: Fixed) -> Self {
        value.to_f64()
    }
}

/// Accumulator for [`Fixed`] products, holding 56 fractional bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Wide(i64);

impl Wide {
    pub const fn to_bits(self) -> i64 {
        self.0
    }
}

impl Add<Self> for Wide {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Wide(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<Self> for Wide {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Wide(self.0.wrapping_sub(rhs.0))
    }
}

impl AddAssign for Wide {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl DspNum for Fixed {
    type Wide = Wide;

    const ZERO: Self = Fixed(0);
    const ONE: Self = Fixed(1 << POINT);

    /// Truncates toward negative infinity.
    fn mul(self, rhs: Self) -> Self {
        Self::compact(self.mul_wide(rhs))
    }

    /// Truncates toward zero and saturates to the representable range.
    fn div(self, rhs: Self) -> Self {
        let num = (self.0 as i64) << POINT;
        let quotient = num / rhs.0 as i64;
        Fixed(quotient.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    fn mul_wide(self, rhs: Self) -> Wide {
        Wide(self.0 as i64 * rhs.0 as i64)
    }

    fn compact(acc: Wide) -> Self {
        Fixed((acc.0 >> POINT) as i32)
    }

    fn widen(self) -> Wide {
        Wide((self.0 as i64) << POINT)
    }

    /// `i32::MIN` wraps to itself; it lies far outside the usable range.
    fn abs(self) -> Self {
        Fixed(self.0.wrapping_abs())
    }

    fn shl(self, n: u32) -> Self {
        Fixed(self.0 << n)
    }

    fn shr(self, n: u32) -> Self {
        Fixed(self.0 >> n)
    }

    /// Truncates toward zero; out-of-range values saturate.
    fn from_f64(value: f64) -> Self {
        Fixed((value * (1u64 << POINT) as f64) as i32)
    }

    fn to_f64(self) -> f64 {
        self.0 as f64 / (1u64 << POINT) as f64
    }

    fn from_unit_bits(bits: i32) -> Self {
        Fixed(bits >> (31 - POINT))
    }

    /// Keeps the fraction bits; two's complement makes this a floor.
    fn wrap_unit(self) -> Self {
        Fixed(self.0 & (Self::ONE.0 - 1))
    }
}

// ── Float ───────────────────────────────────────────────────

impl DspNum for f32 {
    type Wide = f32;

    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn mul(self, rhs: Self) -> Self {
        self * rhs
    }

    fn div(self, rhs: Self) -> Self {
        self / rhs
    }

    fn mul_wide(self, rhs: Self) -> f32 {
        self * rhs
    }

    fn compact(acc: f32) -> Self {
        acc
    }

    fn widen(self) -> f32 {
        self
    }

    fn abs(self) -> Self {
        f32::abs(self)
    }

    fn shl(self, n: u32) -> Self {
        self * (1u64 << n) as f32
    }

    fn shr(self, n: u32) -> Self {
        self / (1u64 << n) as f32
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_unit_bits(bits: i32) -> Self {
        (bits as f64 / 2147483648.0) as f32
    }

    fn wrap_unit(self) -> Self {
        let f = self - self.floor();
        // Tiny negative inputs round up to exactly 1.0.
        if f >= 1.0 { 0.0 } else { f }
    }

    fn flush_denormal(self) -> Self {
        if f32::abs(self) < f32::MIN_POSITIVE {
            0.0
        } else {
            self
        }
    }
}
