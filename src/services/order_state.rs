//! Order lifecycle state machine.
//!
//! Pure decision logic: `next` maps (current status, event) to the next
//! status plus the side effects the caller must execute transactionally
//! with the status write. It performs no I/O. Illegal pairs come back as
//! `IllegalTransition` and must be rejected by the caller, never clamped;
//! out-of-order webhook replays are handled by idempotency upstream, not
//! by loosening this table.

use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    pub fn parse(s: &str) -> Result<Self, ServiceError> {
        s.parse()
            .map_err(|_| ServiceError::InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Events that drive order status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OrderEvent {
    PaymentSucceeded,
    PaymentFailed,
    Ship,
    Deliver,
    Cancel,
    /// Reservation lease lapsed without payment.
    Expire,
    Refund,
}

/// Side effects the ledger must execute together with the status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Convert the reservation into a permanent stock decrement.
    CommitReservation,
    /// Return reserved stock to the available pool.
    ReleaseReservation,
    /// Compensating restock after a permanent decrement.
    Restock,
    /// Ask the gateway to refund the captured payment.
    RequestRefund,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: OrderStatus,
    pub effects: Vec<SideEffect>,
}

/// Computes the next legal status for `(current, event)`.
pub fn next(
    order_id: Uuid,
    current: OrderStatus,
    event: OrderEvent,
) -> Result<Transition, ServiceError> {
    use OrderEvent as E;
    use OrderStatus as S;
    use SideEffect as Fx;

    let transition = match (current, event) {
        // Payment confirmation: paid orders move straight into fulfillment.
        (S::Pending, E::PaymentSucceeded) => Transition {
            next: S::Processing,
            effects: vec![Fx::CommitReservation],
        },
        // A failed charge leaves the order pending with its reservation
        // intact; the customer may retry until the lease lapses.
        (S::Pending, E::PaymentFailed) => Transition {
            next: S::Pending,
            effects: vec![],
        },

        // Fulfillment happy path.
        (S::Processing, E::Ship) => Transition {
            next: S::Shipped,
            effects: vec![],
        },
        (S::Shipped, E::Deliver) => Transition {
            next: S::Delivered,
            effects: vec![],
        },

        // Cancellation from any pre-delivery state. Before payment the
        // reservation is released; after payment the decrement is undone.
        (S::Pending, E::Cancel) => Transition {
            next: S::Cancelled,
            effects: vec![Fx::ReleaseReservation],
        },
        (S::Processing, E::Cancel) | (S::Shipped, E::Cancel) => Transition {
            next: S::Cancelled,
            effects: vec![Fx::Restock, Fx::RequestRefund],
        },

        // Expiry is only meaningful for unpaid pending orders.
        (S::Pending, E::Expire) => Transition {
            next: S::Cancelled,
            effects: vec![Fx::ReleaseReservation],
        },

        // Refunds after fulfillment started.
        (S::Processing, E::Refund) | (S::Shipped, E::Refund) | (S::Delivered, E::Refund) => {
            Transition {
                next: S::Refunded,
                effects: vec![Fx::Restock, Fx::RequestRefund],
            }
        }

        (from, event) => {
            return Err(ServiceError::IllegalTransition {
                order_id,
                from: from.to_string(),
                event: event.to_string(),
            })
        }
    };

    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn oid() -> Uuid {
        Uuid::new_v4()
    }

    #[rstest]
    #[case(OrderStatus::Pending, OrderEvent::PaymentSucceeded, OrderStatus::Processing)]
    #[case(OrderStatus::Processing, OrderEvent::Ship, OrderStatus::Shipped)]
    #[case(OrderStatus::Shipped, OrderEvent::Deliver, OrderStatus::Delivered)]
    #[case(OrderStatus::Pending, OrderEvent::Cancel, OrderStatus::Cancelled)]
    #[case(OrderStatus::Pending, OrderEvent::Expire, OrderStatus::Cancelled)]
    #[case(OrderStatus::Processing, OrderEvent::Refund, OrderStatus::Refunded)]
    #[case(OrderStatus::Delivered, OrderEvent::Refund, OrderStatus::Refunded)]
    fn legal_transitions(
        #[case] from: OrderStatus,
        #[case] event: OrderEvent,
        #[case] expected: OrderStatus,
    ) {
        let t = next(oid(), from, event).unwrap();
        assert_eq!(t.next, expected);
    }

    #[rstest]
    #[case(OrderStatus::Delivered, OrderEvent::PaymentSucceeded)]
    #[case(OrderStatus::Delivered, OrderEvent::Cancel)]
    #[case(OrderStatus::Cancelled, OrderEvent::PaymentSucceeded)]
    #[case(OrderStatus::Cancelled, OrderEvent::Refund)]
    #[case(OrderStatus::Refunded, OrderEvent::Refund)]
    #[case(OrderStatus::Processing, OrderEvent::PaymentSucceeded)]
    #[case(OrderStatus::Processing, OrderEvent::Expire)]
    #[case(OrderStatus::Shipped, OrderEvent::Ship)]
    #[case(OrderStatus::Pending, OrderEvent::Deliver)]
    fn illegal_transitions_are_rejected(#[case] from: OrderStatus, #[case] event: OrderEvent) {
        assert_matches!(
            next(oid(), from, event),
            Err(ServiceError::IllegalTransition { .. })
        );
    }

    #[test]
    fn payment_success_commits_the_reservation() {
        let t = next(oid(), OrderStatus::Pending, OrderEvent::PaymentSucceeded).unwrap();
        assert_eq!(t.effects, vec![SideEffect::CommitReservation]);
    }

    #[test]
    fn expiry_releases_the_reservation() {
        let t = next(oid(), OrderStatus::Pending, OrderEvent::Expire).unwrap();
        assert_eq!(t.effects, vec![SideEffect::ReleaseReservation]);
    }

    #[test]
    fn post_payment_cancel_restocks_and_refunds() {
        let t = next(oid(), OrderStatus::Processing, OrderEvent::Cancel).unwrap();
        assert_eq!(t.effects, vec![SideEffect::Restock, SideEffect::RequestRefund]);
    }

    #[test]
    fn failed_payment_keeps_order_pending_with_no_effects() {
        let t = next(oid(), OrderStatus::Pending, OrderEvent::PaymentFailed).unwrap();
        assert_eq!(t.next, OrderStatus::Pending);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(OrderStatus::parse("pending").unwrap(), OrderStatus::Pending);
        assert_eq!(OrderStatus::Processing.to_string(), "processing");
        assert_matches!(
            OrderStatus::parse("bogus"),
            Err(ServiceError::InvalidStatus(_))
        );
    }
}
