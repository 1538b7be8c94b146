use serde::{Deserialize, Serialize};

pub mod assets;
pub mod currencies;
pub mod deposits;
pub mod investments;
pub mod methods;
pub mod notifications;
pub mod pairs;
pub mod plans;
pub mod platform;
pub mod tokens;
pub mod transfers;
pub mod users;
pub mod withdrawals;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    #[default]
    Live,
    Demo,
}

/// Balance bucket a movement touches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Main,
    Bonus,
    Referral,
    Demo,
}

impl AccountType {
    pub fn balance_field(&self) -> &'static str {
        match self {
            AccountType::Main => "balances.main",
            AccountType::Bonus => "balances.bonus",
            AccountType::Referral => "balances.referral",
            AccountType::Demo => "balances.demo",
        }
    }
}

/// Paging and environment parameters shared by list endpoints.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub environment: Option<Environment>,
}
