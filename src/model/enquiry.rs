//! Enquiry aggregate: header plus ordered line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::customer::Flag;

/// Enquiry lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnquiryStatus {
    #[default]
    Open,
    Processed,
    Closed,
}

impl EnquiryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Processed => "processed",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "processed" => Some(Self::Processed),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Which entry point the enquiry came in through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnquiryChannel {
    #[default]
    Email,
    Portal,
}

impl EnquiryChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::Portal => "Portal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Email" => Some(Self::Email),
            "Portal" => Some(Self::Portal),
            _ => None,
        }
    }
}

/// Requested compendial standard for a line item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Standards {
    #[default]
    #[serde(rename = "USA")]
    Usa,
    #[serde(rename = "UK")]
    Uk,
}

impl Standards {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usa => "USA",
            Self::Uk => "UK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USA" => Some(Self::Usa),
            "UK" => Some(Self::Uk),
            _ => None,
        }
    }
}

/// An enquiry with its line items, as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enquiry {
    pub enquiry_id: Uuid,
    /// Human-readable sequential name, `ENQ-` + zero-padded sequence.
    pub enquiry_name: String,
    pub customer_id: Uuid,
    pub enquiry_datetime: DateTime<Utc>,
    pub status: EnquiryStatus,
    pub is_active: bool,
    pub channel: EnquiryChannel,
    pub lines: Vec<EnquiryLine>,
}

/// One product request within an enquiry.
///
/// Product attributes are duplicated here on purpose: the line item records what
/// the customer said at enquiry time, which may differ from the catalog record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnquiryLine {
    pub line_id: i64,
    pub enquiry_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub chemical_name: Option<String>,
    pub price: Option<Decimal>,
    pub cas_number: Option<String>,
    pub cat_number: Option<String>,
    pub molecular_weight: Option<Decimal>,
    /// Packaging form, e.g. "25kg Drum".
    pub variant: Option<String>,
    pub standards: Standards,
    pub flag: Flag,
    pub attachment_ref: Option<String>,
}

/// Header fields for creating an enquiry. The store allocates `enquiry_name`.
#[derive(Debug, Clone)]
pub struct NewEnquiry {
    pub enquiry_id: Uuid,
    pub customer_id: Uuid,
    pub enquiry_datetime: DateTime<Utc>,
    pub status: EnquiryStatus,
    pub is_active: bool,
    pub channel: EnquiryChannel,
}

/// Partial-field enquiry update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnquiryPatch {
    pub status: Option<EnquiryStatus>,
    pub is_active: Option<bool>,
}
