use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::policy::Cooldown;
use crate::store::WithdrawalRequest;

/// Accepts `"10"` as well as `10` / `10.5`; parsing and validation
/// happen in the engine.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn as_text(&self) -> String {
        match self {
            AmountInput::Text(s) => s.clone(),
            AmountInput::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub amount: AmountInput,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub withdrawal: WithdrawalRequest,
    pub credits: Decimal,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub eligible: bool,
    pub cooldown: Cooldown,
    pub wait: Option<String>,
}
