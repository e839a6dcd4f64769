//! Customer model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Known/unknown marker used on customers and enquiry line items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    #[default]
    Known,
    Unknown,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Known => "known",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "known" => Some(Self::Known),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// A customer record.
///
/// Email is unique when present — the ingestion path uses it as the lookup key
/// for get-or-create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: Uuid,
    pub name: String,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub landline: Option<String>,
    pub address: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub tag: Option<String>,
    pub flag: Flag,
    /// Source channel the contact came in through (e.g. "email", "portal").
    pub contact_owner: Option<String>,
}

/// Fields for creating a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub landline: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub flag: Flag,
    #[serde(default)]
    pub contact_owner: Option<String>,
}

/// Partial-field customer update. `None` = leave unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub landline: Option<String>,
    pub address: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub tag: Option<String>,
    pub flag: Option<Flag>,
    pub contact_owner: Option<String>,
}
