//! Promo code records and the discount evaluator.
//!
//! Evaluation is pure: it never touches `used_count`. Redemption accounting
//! happens inside the settlement transaction, guarded against concurrent
//! checkouts racing for the last use.

use chrono::{DateTime, Utc};
use common::PromoCodeId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::money::Money;

/// How a promo code's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// `value` is a percentage of the subtotal.
    Percentage,

    /// `value` is a flat amount, capped at the subtotal.
    Fixed,
}

impl DiscountKind {
    /// Returns the kind name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DiscountKind {
    type Err = UnknownDiscountKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountKind::Percentage),
            "fixed" => Ok(DiscountKind::Fixed),
            other => Err(UnknownDiscountKind(other.to_string())),
        }
    }
}

/// A stored discount kind that is neither `percentage` nor `fixed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown discount kind: {0}")]
pub struct UnknownDiscountKind(pub String);

/// A promotional discount code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Unique identifier.
    pub id: PromoCodeId,

    /// The redeemable code, stored uppercase.
    pub code: String,

    /// Percentage or fixed discount.
    pub kind: DiscountKind,

    /// Percentage points or flat amount, depending on `kind`.
    pub value: Decimal,

    /// Minimum subtotal required to redeem, if any.
    pub min_purchase: Option<Money>,

    /// Maximum number of successful redemptions, if any.
    pub usage_limit: Option<u32>,

    /// Successful redemptions so far. Never decremented.
    pub used_count: u32,

    /// Instant the code stops being redeemable, if any.
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether the code is currently enabled.
    pub is_active: bool,

    /// When the code was created.
    pub created_at: DateTime<Utc>,
}

/// Why a promo code cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PromoRejection {
    /// No promo code with the given code exists.
    #[error("Promo code not found")]
    NotFound,

    /// The code exists but is disabled.
    #[error("Promo code is not active")]
    Inactive,

    /// The code's expiry timestamp has passed.
    #[error("Promo code has expired")]
    Expired,

    /// The code's usage limit has been reached.
    #[error("Promo code has reached its usage limit")]
    Exhausted,

    /// The subtotal does not meet the code's minimum purchase.
    #[error("Minimum purchase of {minimum} required")]
    BelowMinimum { minimum: Money },
}

impl PromoCode {
    /// Evaluates this code against a subtotal at a given instant.
    ///
    /// Checks run in a fixed order and the first failure wins: active,
    /// expiry, usage limit, minimum purchase. On success returns the
    /// discount amount, rounded to cents half away from zero and clamped
    /// to `[0, subtotal]` so a total can never fall outside that range.
    pub fn evaluate(&self, subtotal: Money, now: DateTime<Utc>) -> Result<Money, PromoRejection> {
        if !self.is_active {
            return Err(PromoRejection::Inactive);
        }
        if let Some(expires_at) = self.expires_at
            && now >= expires_at
        {
            return Err(PromoRejection::Expired);
        }
        if let Some(limit) = self.usage_limit
            && self.used_count >= limit
        {
            return Err(PromoRejection::Exhausted);
        }
        if let Some(minimum) = self.min_purchase
            && subtotal < minimum
        {
            return Err(PromoRejection::BelowMinimum { minimum });
        }

        let discount = match self.kind {
            DiscountKind::Percentage => subtotal.percentage(self.value),
            DiscountKind::Fixed => Money::new(self.value).min(subtotal),
        };
        Ok(discount.round_to_cents().max(Money::zero()).min(subtotal))
    }

    /// Returns true if the usage limit has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.used_count >= limit)
    }
}

/// Normalizes a user-supplied code for lookup and storage.
///
/// Codes are case-insensitive; the uppercase form is canonical.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Generates a random eight-character uppercase code.
pub fn generate_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..8].to_uppercase()
}

/// Fields accepted when creating or updating a promo code.
///
/// On create, an omitted `code` gets a generated one; on update, an omitted
/// `code` keeps the existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCodeInput {
    #[serde(default)]
    pub code: Option<String>,
    pub kind: DiscountKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_purchase: Option<Money>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PromoCodeInput {
    /// Validates the fields before they reach a store.
    pub fn validate(&self) -> Result<(), PromoValidationError> {
        if let Some(code) = &self.code
            && code.trim().is_empty()
        {
            return Err(PromoValidationError::EmptyCode);
        }
        if self.value.is_sign_negative() {
            return Err(PromoValidationError::NegativeValue);
        }
        if self.kind == DiscountKind::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(PromoValidationError::PercentageOverLimit);
        }
        if let Some(minimum) = self.min_purchase
            && minimum.is_negative()
        {
            return Err(PromoValidationError::NegativeMinimum);
        }
        if self.usage_limit == Some(0) {
            return Err(PromoValidationError::ZeroUsageLimit);
        }
        if let Some(limit) = self.usage_limit
            && limit > i32::MAX as u32
        {
            return Err(PromoValidationError::UsageLimitTooLarge);
        }
        Ok(())
    }
}

/// Validation failures for promo code input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromoValidationError {
    /// A supplied code must contain at least one non-whitespace character.
    #[error("Promo code must not be empty")]
    EmptyCode,

    /// The discount value must be zero or positive.
    #[error("Discount value must not be negative")]
    NegativeValue,

    /// A percentage discount cannot exceed 100%.
    #[error("Percentage discount cannot exceed 100")]
    PercentageOverLimit,

    /// The minimum purchase must be zero or positive.
    #[error("Minimum purchase must not be negative")]
    NegativeMinimum,

    /// A usage limit must allow at least one redemption.
    #[error("Usage limit must be at least 1")]
    ZeroUsageLimit,

    /// A usage limit must fit the storage column.
    #[error("Usage limit cannot exceed {}", i32::MAX)]
    UsageLimitTooLarge,
}
