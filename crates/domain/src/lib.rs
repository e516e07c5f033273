//! Pure storefront domain.
//!
//! This crate holds the storefront's invariant-bearing logic with no I/O:
//! - Exact-decimal money arithmetic with settlement rounding rules
//! - Cart snapshots and subtotal computation
//! - The promo code evaluator (validation order, discount math, caps)
//! - Orders, the status state machine, and its role-gated edge table
//! - The settlement planner that freezes a cart into a committable draft
//!
//! Persistence and concurrency guards live in the `store` crate; this crate
//! only decides what a correct settlement looks like.

pub mod cart;
pub mod money;
pub mod order;
pub mod product;
pub mod promo;
pub mod settlement;
pub mod status;

pub use cart::{Cart, CartLine, CartSnapshot};
pub use money::Money;
pub use order::{InvalidStatusValue, Order, OrderItem, OrderStatus};
pub use product::{MAX_STOCK, NewProduct, Product, ProductValidationError};
pub use promo::{
    DiscountKind, PromoCode, PromoCodeInput, PromoRejection, PromoValidationError,
    UnknownDiscountKind, generate_code, normalize_code,
};
pub use settlement::{
    DraftItem, PromoUse, SettlementDraft, SettlementPlanError, plan_settlement,
};
pub use status::{ForbiddenTransition, authorize_transition, transition_allowed};
