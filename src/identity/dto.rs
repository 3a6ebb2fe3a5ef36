use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::ExternalIdentity;

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub identity: ExternalIdentity,
    pub credits: Decimal,
}
