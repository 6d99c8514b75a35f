use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role. Fixed at signup; administrators are only created by the
/// server bootstrap and never own a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Contractor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Contractor => "contractor",
            Self::Admin => "admin",
        }
    }

    pub fn is_farmer(&self) -> bool {
        matches!(self, Self::Farmer)
    }

    pub fn is_contractor(&self) -> bool {
        matches!(self, Self::Contractor)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Roles that carry a verifiable profile record.
    pub fn has_profile(&self) -> bool {
        !self.is_admin()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "farmer" => Ok(Self::Farmer),
            "contractor" => Ok(Self::Contractor),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmerProfile {
    pub user: User,
    pub name: String,
    pub address: String,
    pub phoneno: String,
    pub image: Option<String>,
    pub screenshot: Option<String>,
    pub aadhar_image: Option<String>,
    pub signature: Option<String>,
    pub qr_code_image: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractorProfile {
    pub user: User,
    pub name: String,
    pub address: String,
    pub phoneno: String,
    pub image: Option<String>,
    pub gstin: String,
    pub aadhar_image: Option<String>,
    pub signature: Option<String>,
    pub is_verified: bool,
}

/// Role-specific extended user record. Serialized without a tag; the role
/// travels next to it in responses.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Profile {
    Farmer(FarmerProfile),
    Contractor(ContractorProfile),
}

impl Profile {
    pub fn name(&self) -> &str {
        match self {
            Self::Farmer(p) => &p.name,
            Self::Contractor(p) => &p.name,
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            Self::Farmer(p) => p.image.as_deref(),
            Self::Contractor(p) => p.image.as_deref(),
        }
    }

    pub fn is_verified(&self) -> bool {
        match self {
            Self::Farmer(p) => p.is_verified,
            Self::Contractor(p) => p.is_verified,
        }
    }
}

/// Short profile embedded in listings and chat room views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub name: String,
    pub address: String,
    pub phoneno: String,
    pub image: Option<String>,
    pub is_verified: bool,
}

/// Payment state of a contract: the sum of its transactions against
/// `nego_price × quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProgress {
    pub contract_id: Uuid,
    pub total_price: i64,
    pub total_paid: i64,
    pub remaining_amount: i64,
    pub payment_complete: bool,
}

impl PaymentProgress {
    pub fn compute(contract_id: Uuid, nego_price: i64, quantity: i64, total_paid: i64) -> Self {
        let total_price = nego_price.saturating_mul(quantity);
        let remaining_amount = total_price.saturating_sub(total_paid);
        Self {
            contract_id,
            total_price,
            total_paid,
            remaining_amount,
            payment_complete: remaining_amount <= 0,
        }
    }
}
