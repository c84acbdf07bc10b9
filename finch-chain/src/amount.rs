//! Monetary amounts, denominated in satoshis, with typestate range checking.
//!
//! Most of the library deals in `Amount<NonNegative>`: every persisted or
//! accepted output value must be in `0..=MAX_MONEY`. Fee arithmetic uses
//! `Amount<NegativeAllowed>` so that deficits are representable while still
//! being range checked.

use std::{
    convert::TryFrom,
    marker::PhantomData,
    ops::RangeInclusive,
};

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// One bitcoin, in satoshis.
pub const COIN: i64 = 100_000_000;

/// The maximum number of satoshis that can ever exist.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// A monetary amount in satoshis, range checked by the constraint `C`.
#[derive(Serialize, Deserialize)]
#[serde(try_from = "i64")]
#[serde(into = "i64")]
#[serde(bound = "C: Constraint")]
pub struct Amount<C = NonNegative>(i64, PhantomData<C>);

impl<C> std::fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple(&format!("Amount<{}>", std::any::type_name::<C>()))
            .field(&self.0)
            .finish()
    }
}

impl<C> Clone for Amount<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Amount<C> {}

impl<C> PartialEq for Amount<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<C> Eq for Amount<C> {}

impl<C> PartialOrd for Amount<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.0.cmp(&other.0))
    }
}

impl<C> Ord for Amount<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<C> std::hash::Hash for Amount<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<C> Amount<C> {
    /// The zero amount.
    pub fn zero() -> Amount<C> {
        Amount(0, PhantomData)
    }

    /// Convert this amount into a different constraint, checking the new
    /// constraint's range.
    pub fn constrain<C2: Constraint>(self) -> Result<Amount<C2>, Error> {
        Amount::try_from(self.0)
    }

    /// Checked addition, rejecting results outside the constraint's range.
    pub fn checked_add(self, rhs: Amount<C>) -> Result<Amount<C>, Error>
    where
        C: Constraint,
    {
        // i64 overflow is impossible: both operands are within `C`'s range.
        Amount::try_from(self.0 + rhs.0)
    }

    /// Checked subtraction, rejecting results outside the constraint's range.
    pub fn checked_sub(self, rhs: Amount<C>) -> Result<Amount<C>, Error>
    where
        C: Constraint,
    {
        Amount::try_from(self.0 - rhs.0)
    }
}

impl<C> From<Amount<C>> for i64 {
    fn from(amount: Amount<C>) -> Self {
        amount.0
    }
}

impl<C: Constraint> TryFrom<i64> for Amount<C> {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        C::validate(value).map(|v| Amount(v, PhantomData))
    }
}

#[derive(thiserror::Error, Debug, displaydoc::Display, Clone, PartialEq, Eq)]
/// Errors that can be returned when validating `Amount`s
pub enum Error {
    /// input {value} is outside of valid range for amounts, {range:?}
    Contains {
        range: RangeInclusive<i64>,
        value: i64,
    },
}

/// Marker type for `Amount` that restricts the values to `0..=MAX_MONEY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NonNegative {}

/// Marker type for `Amount` that allows negative values, bounded by
/// `-MAX_MONEY..=MAX_MONEY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NegativeAllowed {}

/// The constraint applied to amount values, as a range of valid satoshi
/// counts.
pub trait Constraint {
    /// The range of values that are valid under this constraint.
    fn valid_range() -> RangeInclusive<i64>;

    /// Check that `value` is within the valid range.
    fn validate(value: i64) -> Result<i64, Error> {
        let range = Self::valid_range();
        if !range.contains(&value) {
            Err(Error::Contains { range, value })
        } else {
            Ok(value)
        }
    }
}

impl Constraint for NonNegative {
    fn valid_range() -> RangeInclusive<i64> {
        0..=MAX_MONEY
    }
}

impl Constraint for NegativeAllowed {
    fn valid_range() -> RangeInclusive<i64> {
        -MAX_MONEY..=MAX_MONEY
    }
}

impl<C> BitcoinSerialize for Amount<C> {
    fn bitcoin_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl<C: Constraint> BitcoinDeserialize for Amount<C> {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Amount::try_from(i64::bitcoin_deserialize(reader)?)
            .map_err(|_| SerializationError::Parse("amount out of range"))
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl<C: Constraint + std::fmt::Debug + 'static> proptest::arbitrary::Arbitrary for Amount<C> {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        C::valid_range()
            .prop_map(|v| Amount(v, PhantomData))
            .boxed()
    }

    type Strategy = proptest::strategy::BoxedStrategy<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_within_range() {
        let one: Amount = Amount::try_from(1).unwrap();
        let two = one.checked_add(one).unwrap();
        assert_eq!(i64::from(two), 2);
    }

    #[test]
    fn add_beyond_max_money_fails() {
        let max: Amount = Amount::try_from(MAX_MONEY).unwrap();
        let one: Amount = Amount::try_from(1).unwrap();
        assert!(max.checked_add(one).is_err());
    }

    #[test]
    fn non_negative_rejects_negatives() {
        assert!(Amount::<NonNegative>::try_from(-1).is_err());
        assert!(Amount::<NegativeAllowed>::try_from(-1).is_ok());
    }
}
