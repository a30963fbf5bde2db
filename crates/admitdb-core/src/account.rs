//! Saved Account Data
//!
//! Addresses and payment-method summaries kept on the user document.
//! Only the card network and the last four digits are ever stored.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Something kept in a list where at most one entry is the default
pub trait DefaultFlag {
    fn id(&self) -> &str;
    fn is_default(&self) -> bool;
    fn set_default(&mut self, value: bool);
}

/// Make `id` the only default entry in `items`.
///
/// Returns `false` if no entry has that id, in which case nothing changes.
pub fn make_sole_default<T: DefaultFlag>(items: &mut [T], id: &str) -> bool {
    if !items.iter().any(|item| item.id() == id) {
        return false;
    }
    for item in items.iter_mut() {
        let is_target = item.id() == id;
        item.set_default(is_target);
    }
    true
}

fn new_entry_id(requested: Option<String>) -> String {
    requested
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// A saved postal address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: String,
    pub name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Address fields as submitted by the client
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    /// Client-generated id; generated here when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl Address {
    pub fn from_input(input: AddressInput) -> Result<Self> {
        required("name", &input.name)?;
        required("line1", &input.line1)?;
        required("city", &input.city)?;
        required("postalCode", &input.postal_code)?;
        required("country", &input.country)?;

        Ok(Self {
            id: new_entry_id(input.id),
            name: input.name.trim().to_string(),
            line1: input.line1.trim().to_string(),
            line2: input.line2.filter(|l| !l.trim().is_empty()),
            city: input.city.trim().to_string(),
            state: input.state.trim().to_string(),
            postal_code: input.postal_code.trim().to_string(),
            country: input.country.trim().to_uppercase(),
            phone: input.phone.filter(|p| !p.trim().is_empty()),
            is_default: input.is_default,
        })
    }

    /// Replace the editable fields, keeping the id
    pub fn apply(&mut self, input: AddressInput) -> Result<()> {
        let id = self.id.clone();
        *self = Self::from_input(AddressInput {
            id: Some(id),
            ..input
        })?;
        Ok(())
    }
}

impl DefaultFlag for Address {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_default(&self) -> bool {
        self.is_default
    }

    fn set_default(&mut self, value: bool) {
        self.is_default = value;
    }
}

/// Card network label derived from the number prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    Visa,
    Mastercard,
    #[serde(rename = "American Express")]
    Amex,
    Discover,
    Unknown,
}

impl CardType {
    pub fn detect(digits: &str) -> Self {
        let prefix = |n: usize| digits.get(..n).and_then(|p| p.parse::<u32>().ok());

        if digits.starts_with('4') {
            Self::Visa
        } else if matches!(prefix(2), Some(34 | 37)) {
            Self::Amex
        } else if matches!(prefix(2), Some(51..=55)) || matches!(prefix(4), Some(2221..=2720)) {
            Self::Mastercard
        } else if digits.starts_with("6011") || digits.starts_with("65") {
            Self::Discover
        } else {
            Self::Unknown
        }
    }
}

/// Luhn checksum over an all-digit string
fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

/// Card details as submitted by the client. The full number is only used to
/// derive the summary and is dropped immediately.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodInput {
    #[serde(default)]
    pub id: Option<String>,
    pub card_number: String,
    pub cardholder_name: String,
    /// `MM/YY`
    pub expiry_date: String,
    #[serde(default)]
    pub is_default: bool,
}

impl std::fmt::Debug for PaymentMethodInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentMethodInput")
            .field("id", &self.id)
            .field("card_number", &"[redacted]")
            .field("cardholder_name", &self.cardholder_name)
            .field("expiry_date", &self.expiry_date)
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// A saved card, reduced to what can be displayed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodSummary {
    pub id: String,
    pub card_type: CardType,
    pub last_four_digits: String,
    pub cardholder_name: String,
    pub expiry_date: String,
    #[serde(default)]
    pub is_default: bool,
}

impl PaymentMethodSummary {
    pub fn from_input(input: PaymentMethodInput) -> Result<Self> {
        let digits: String = input
            .card_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        if !(12..=19).contains(&digits.len()) || !luhn_valid(&digits) {
            return Err(CoreError::Validation("Invalid card number".into()));
        }
        required("cardholderName", &input.cardholder_name)?;
        let expiry_date = parse_expiry(&input.expiry_date)?;

        Ok(Self {
            id: new_entry_id(input.id),
            card_type: CardType::detect(&digits),
            last_four_digits: digits[digits.len() - 4..].to_string(),
            cardholder_name: input.cardholder_name.trim().to_string(),
            expiry_date,
            is_default: input.is_default,
        })
    }
}

/// Normalize `M/YY`, `MM/YY` or `MM/YYYY` to `MM/YY`
fn parse_expiry(raw: &str) -> Result<String> {
    let invalid = || CoreError::Validation("Expiry date must be MM/YY".into());
    let (month, year) = raw.trim().split_once('/').ok_or_else(invalid)?;
    let month: u32 = month.trim().parse().map_err(|_| invalid())?;
    let year = year.trim();
    if !(1..=12).contains(&month) || !year.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let year = match year.len() {
        2 => year,
        4 => &year[2..],
        _ => return Err(invalid()),
    };
    Ok(format!("{month:02}/{year}"))
}

impl PaymentMethodSummary {
    /// Replace the card details, keeping the id
    pub fn apply(&mut self, input: PaymentMethodInput) -> Result<()> {
        let id = self.id.clone();
        *self = Self::from_input(PaymentMethodInput {
            id: Some(id),
            ..input
        })?;
        Ok(())
    }
}

impl DefaultFlag for PaymentMethodSummary {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_default(&self) -> bool {
        self.is_default
    }

    fn set_default(&mut self, value: bool) {
        self.is_default = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(id: &str, is_default: bool) -> Address {
        Address::from_input(AddressInput {
            id: Some(id.into()),
            name: "Ada Lovelace".into(),
            line1: "1 Main St".into(),
            city: "Boston".into(),
            state: "MA".into(),
            postal_code: "02115".into(),
            country: "us".into(),
            is_default,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_make_sole_default() {
        let mut items = vec![address("a", true), address("b", false), address("c", false)];
        assert!(make_sole_default(&mut items, "c"));
        let defaults: Vec<_> = items.iter().filter(|a| a.is_default).map(|a| a.id.as_str()).collect();
        assert_eq!(defaults, vec!["c"]);

        assert!(!make_sole_default(&mut items, "missing"));
        assert!(items[2].is_default);
    }

    #[test]
    fn test_address_requires_fields() {
        let result = Address::from_input(AddressInput {
            name: "No Street".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_card_summary_keeps_only_last_four() {
        let summary = PaymentMethodSummary::from_input(PaymentMethodInput {
            id: None,
            card_number: "4242 4242 4242 4242".into(),
            cardholder_name: "Ada Lovelace".into(),
            expiry_date: "4/2029".into(),
            is_default: true,
        })
        .unwrap();

        assert_eq!(summary.card_type, CardType::Visa);
        assert_eq!(summary.last_four_digits, "4242");
        assert_eq!(summary.expiry_date, "04/29");

        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("4242424242424242"));
    }

    #[test]
    fn test_card_number_checksum() {
        let result = PaymentMethodSummary::from_input(PaymentMethodInput {
            card_number: "4242 4242 4242 4241".into(),
            cardholder_name: "Ada".into(),
            expiry_date: "12/30".into(),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_card_network_detection() {
        assert_eq!(CardType::detect("5555555555554444"), CardType::Mastercard);
        assert_eq!(CardType::detect("2223003122003222"), CardType::Mastercard);
        assert_eq!(CardType::detect("378282246310005"), CardType::Amex);
        assert_eq!(CardType::detect("6011111111111117"), CardType::Discover);
        assert_eq!(CardType::detect("3056930009020004"), CardType::Unknown);
    }
}
