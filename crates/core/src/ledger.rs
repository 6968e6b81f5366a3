use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Direction;

/// Reasons a movement cannot be applied to a stock balance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("quantity must be greater than zero (got {0})")]
    NonPositiveQuantity(Decimal),
    #[error("quantity is out of range for the current stock")]
    Overflow,
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },
}

/// Rejects zero and negative quantities regardless of direction.
pub fn validate_quantity(quantity: Decimal) -> Result<(), LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveQuantity(quantity));
    }
    Ok(())
}

/// Computes the balance after applying a movement to `stock`.
///
/// The result is never negative: an outbound movement larger than the current
/// balance yields [`LedgerError::InsufficientStock`].
pub fn next_balance(
    stock: Decimal,
    direction: Direction,
    quantity: Decimal,
) -> Result<Decimal, LedgerError> {
    validate_quantity(quantity)?;

    let next = match direction {
        Direction::In => stock.checked_add(quantity),
        Direction::Out => stock.checked_sub(quantity),
    }
    .ok_or(LedgerError::Overflow)?;

    if next < Decimal::ZERO {
        return Err(LedgerError::InsufficientStock {
            available: stock,
            requested: quantity,
        });
    }

    Ok(next.normalize())
}

/// Trims a free-text note, mapping blank input to `None`.
pub fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn inbound_adds_and_outbound_subtracts() {
        assert_eq!(next_balance(dec!(10), Direction::In, dec!(5)), Ok(dec!(15)));
        assert_eq!(next_balance(dec!(15), Direction::Out, dec!(15)), Ok(dec!(0)));
        assert_eq!(
            next_balance(dec!(1.25), Direction::Out, dec!(0.75)),
            Ok(dec!(0.5))
        );
    }

    #[test]
    fn outbound_beyond_balance_is_rejected() {
        let err = next_balance(dec!(15), Direction::Out, dec!(20)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                available: dec!(15),
                requested: dec!(20),
            }
        );
    }

    #[test]
    fn non_positive_quantities_are_rejected_in_both_directions() {
        for direction in [Direction::In, Direction::Out] {
            assert!(matches!(
                next_balance(dec!(10), direction, dec!(0)),
                Err(LedgerError::NonPositiveQuantity(_))
            ));
            assert!(matches!(
                next_balance(dec!(10), direction, dec!(-3)),
                Err(LedgerError::NonPositiveQuantity(_))
            ));
        }
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(
            next_balance(Decimal::MAX, Direction::In, dec!(1)),
            Err(LedgerError::Overflow)
        );
    }

    #[test]
    fn blank_notes_become_none() {
        assert_eq!(normalize_note(None), None);
        assert_eq!(normalize_note(Some("   ")), None);
        assert_eq!(
            normalize_note(Some("  restock from supplier ")),
            Some("restock from supplier".to_string())
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn direction() -> impl Strategy<Value = Direction> {
            prop_oneof![Just(Direction::In), Just(Direction::Out)]
        }

        proptest! {
            /// Property: every accepted movement shifts the balance by exactly its quantity
            /// and the balance never drops below zero.
            #[test]
            fn balance_tracks_accepted_movements(
                initial in 0u32..10_000,
                steps in prop::collection::vec((direction(), 1u32..5_000), 1..64),
            ) {
                let mut stock = Decimal::from(initial);
                for (direction, raw_quantity) in steps {
                    let quantity = Decimal::from(raw_quantity);
                    match next_balance(stock, direction, quantity) {
                        Ok(next) => {
                            let expected = match direction {
                                Direction::In => stock + quantity,
                                Direction::Out => stock - quantity,
                            };
                            prop_assert_eq!(next, expected);
                            prop_assert!(next >= Decimal::ZERO);
                            stock = next;
                        }
                        Err(LedgerError::InsufficientStock { available, requested }) => {
                            prop_assert_eq!(direction, Direction::Out);
                            prop_assert!(requested > available);
                            prop_assert_eq!(available, stock);
                        }
                        Err(other) => prop_assert!(false, "unexpected error: {other}"),
                    }
                }
            }
        }
    }
}
