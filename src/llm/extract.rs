//! Email-to-enquiry extraction.
//!
//! Builds the structured-extraction prompt, sends it through an
//! [`LlmProvider`], and parses the reply defensively: models wrap JSON in
//! markdown fences, truncate literals mid-word, and append commentary, so the
//! parser strips, repairs, and retries before giving up.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::LlmProvider;

/// Emails longer than this are truncated before prompting.
const MAX_EMAIL_CHARS: usize = 10_000;

// ── Extracted payload types ─────────────────────────────────────────

/// The structured payload the model is asked to produce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedPayload {
    #[serde(default)]
    pub customer_details: ExtractedCustomer,
    #[serde(default)]
    pub enquiry_details: ExtractedEnquiry,
}

/// Customer fields pulled out of the email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedCustomer {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "de_stringish")]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Enquiry fields pulled out of the email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEnquiry {
    #[serde(default)]
    pub enquiry_date: Option<String>,
    #[serde(default)]
    pub enquiry_time: Option<String>,
    #[serde(default)]
    pub products: Vec<ExtractedProduct>,
}

/// One product line as the model reported it. Everything optional — the
/// email path coerces rather than rejects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedProduct {
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub chemical_name: Option<String>,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub cat_number: Option<String>,
    #[serde(default)]
    pub molecular_weight: Option<Decimal>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub standards: Option<String>,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

/// Accept strings or bare numbers (models report phone numbers both ways).
fn de_stringish<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

// ── Extractor ───────────────────────────────────────────────────────

/// Turns raw email text into an [`ExtractedPayload`] via the LLM.
pub struct EnquiryExtractor {
    provider: Arc<dyn LlmProvider>,
}

impl EnquiryExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Extract customer and enquiry details from an email.
    ///
    /// `reference` is the email's receive time; it prefills the enquiry
    /// date/time in the prompt so the model anchors on it.
    pub async fn extract(
        &self,
        email_text: &str,
        reference: DateTime<Utc>,
    ) -> Result<ExtractedPayload, LlmError> {
        let mut text = email_text;
        let truncated;
        if text.chars().count() > MAX_EMAIL_CHARS {
            warn!(
                len = text.len(),
                max = MAX_EMAIL_CHARS,
                "Email content too long, truncating"
            );
            truncated = text.chars().take(MAX_EMAIL_CHARS).collect::<String>();
            text = &truncated;
        }

        let prompt = build_extraction_prompt(text, reference);
        let reply = self.provider.complete(&prompt).await?;
        debug!(reply_len = reply.len(), "Extraction reply received");

        parse_payload(&reply)
    }
}

/// Build the extraction prompt with the expected JSON shape inline.
fn build_extraction_prompt(email_text: &str, reference: DateTime<Utc>) -> String {
    format!(
        r#"Extract the customer details and enquiry details from the following email and format the response as a JSON object with this structure:
{{
  "customer_details": {{
    "customer_name": "",
    "email": "",
    "phone": "",
    "company_name": null,
    "address": null
  }},
  "enquiry_details": {{
    "enquiry_date": "{date}",
    "enquiry_time": "{time}",
    "products": [
      {{
        "quantity": 0.0,
        "chemical_name": null,
        "cas_number": null,
        "cat_number": null,
        "molecular_weight": null,
        "variant": null,
        "standards": null,
        "flag": "known",
        "attachment_ref": null
      }}
    ]
  }}
}}
Return ONLY valid JSON, with all missing values written as null. Do not include markdown, code blocks, or explanatory text.
Include every product mentioned in the email, even if some fields are missing. Set "flag" to "known" if the product is identified, "unknown" otherwise. Use the email date for "enquiry_date" and "enquiry_time". Put packaging or standards requirements into "variant" or "standards" if applicable.
Email content:
{email}"#,
        date = reference.format("%Y-%m-%d"),
        time = reference.format("%H:%M"),
        email = email_text,
    )
}

// ── Response parsing ────────────────────────────────────────────────

static TRUNCATED_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\s*)n\b").expect("valid regex"));
static TRUNCATED_TRUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\s*)tru\b").expect("valid regex"));
static TRUNCATED_FALSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\s*)fal\b").expect("valid regex"));

/// Parse a model reply into an [`ExtractedPayload`].
pub(crate) fn parse_payload(raw: &str) -> Result<ExtractedPayload, LlmError> {
    let json_str = extract_json_object(raw);
    if !json_str.starts_with('{') {
        return Err(LlmError::InvalidResponse(
            "no JSON object found in model reply".to_string(),
        ));
    }

    let repaired = repair_truncated_literals(&json_str);

    match serde_json::from_str(&repaired) {
        Ok(payload) => Ok(payload),
        Err(first_err) => {
            // Last resort: cut at the final closing brace and try again —
            // models sometimes trail off mid-array.
            if let Some(last_brace) = repaired.rfind('}') {
                if let Ok(payload) = serde_json::from_str(&repaired[..=last_brace]) {
                    debug!("Extraction JSON parsed after truncating to last brace");
                    return Ok(payload);
                }
            }
            Err(LlmError::InvalidResponse(format!(
                "failed to parse extraction JSON: {first_err}"
            )))
        }
    }
}

/// Fix literals the model cut short: `: n` → `: null`, `: tru` → `: true`,
/// `: fal` → `: false`. Quoted values are untouched.
fn repair_truncated_literals(json: &str) -> String {
    let json = TRUNCATED_NULL.replace_all(json, ":${1}null");
    let json = TRUNCATED_TRUE.replace_all(&json, ":${1}true");
    TRUNCATED_FALSE.replace_all(&json, ":${1}false").into_owned()
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    const CLEAN_REPLY: &str = r#"{
        "customer_details": {
            "customer_name": "Jane Doe",
            "email": "jane@acme.com",
            "phone": 5551234567,
            "company_name": "Acme Corp",
            "address": null
        },
        "enquiry_details": {
            "enquiry_date": "2025-09-25",
            "enquiry_time": "01:53",
            "products": [
                {
                    "quantity": 100.0,
                    "chemical_name": "Propan-2-one",
                    "cas_number": "67-64-1",
                    "cat_number": null,
                    "molecular_weight": 58.08,
                    "variant": "25kg Drum",
                    "standards": "USA",
                    "flag": "known",
                    "attachment_ref": null
                }
            ]
        }
    }"#;

    #[test]
    fn parses_clean_json() {
        let payload = parse_payload(CLEAN_REPLY).unwrap();
        assert_eq!(payload.customer_details.email.as_deref(), Some("jane@acme.com"));
        // Numeric phone coerced to a string.
        assert_eq!(payload.customer_details.phone.as_deref(), Some("5551234567"));
        assert_eq!(payload.enquiry_details.products.len(), 1);
        assert_eq!(
            payload.enquiry_details.products[0].quantity,
            Some(dec!(100.0))
        );
        assert_eq!(
            payload.enquiry_details.products[0].molecular_weight,
            Some(dec!(58.08))
        );
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("Here is the extraction:\n```json\n{CLEAN_REPLY}\n```\nDone.");
        let payload = parse_payload(&fenced).unwrap();
        assert_eq!(
            payload.customer_details.customer_name.as_deref(),
            Some("Jane Doe")
        );
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let wrapped = format!("Sure! {CLEAN_REPLY} Let me know if you need anything else.");
        let payload = parse_payload(&wrapped).unwrap();
        assert_eq!(payload.enquiry_details.products.len(), 1);
    }

    #[test]
    fn repairs_truncated_null_literal() {
        let broken = r#"{"customer_details": {"customer_name": "Jane", "email": "j@a.com"},
            "enquiry_details": {"products": [{"quantity": 5, "standards": n, "flag": "known"}]}}"#;
        let payload = parse_payload(broken).unwrap();
        assert!(payload.enquiry_details.products[0].standards.is_none());
        // Quoted short strings survive the repair.
        assert_eq!(
            payload.enquiry_details.products[0].flag.as_deref(),
            Some("known")
        );
    }

    #[test]
    fn missing_fields_default() {
        let minimal = r#"{"enquiry_details": {"products": [{}]}}"#;
        let payload = parse_payload(minimal).unwrap();
        assert!(payload.customer_details.email.is_none());
        assert!(payload.enquiry_details.products[0].quantity.is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_payload("I couldn't find any enquiry in this email.").is_err());
        assert!(parse_payload("").is_err());
    }

    #[test]
    fn prompt_carries_reference_date() {
        let reference = DateTime::parse_from_rfc3339("2025-09-25T01:53:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let prompt = build_extraction_prompt("need acetone", reference);
        assert!(prompt.contains("2025-09-25"));
        assert!(prompt.contains("01:53"));
        assert!(prompt.contains("need acetone"));
    }
}
