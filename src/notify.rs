//! Outbound acknowledgment emails.
//!
//! Sent after an enquiry is created from an inbound email. A send failure is
//! the caller's problem to log — it never rolls back the enquiry.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::MailerConfig;
use crate::error::Error;
use crate::model::{Customer, Enquiry};

/// Sends acknowledgment emails over SMTP.
pub struct AckMailer {
    config: MailerConfig,
    enquiry_base_url: String,
}

impl AckMailer {
    pub fn new(config: MailerConfig, enquiry_base_url: String) -> Self {
        Self {
            config,
            enquiry_base_url,
        }
    }

    /// Send an acknowledgment for a freshly created enquiry.
    pub fn send_acknowledgment(
        &self,
        enquiry: &Enquiry,
        customer: &Customer,
        to: &str,
        cc: &[String],
    ) -> Result<(), Error> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| Error::Notify(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let subject = format!("Acknowledgment: Enquiry {}", enquiry.enquiry_name);
        let body = build_ack_body(enquiry, customer, &self.enquiry_base_url);

        let mut builder = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| Error::Notify(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| Error::Notify(format!("Invalid to address: {e}")))?)
            .subject(subject);
        for addr in cc {
            builder = builder.cc(addr
                .parse()
                .map_err(|e| Error::Notify(format!("Invalid cc address: {e}")))?);
        }

        let email = builder
            .body(body)
            .map_err(|e| Error::Notify(format!("Failed to build email: {e}")))?;

        transport
            .send(&email)
            .map_err(|e| Error::Notify(format!("SMTP send failed: {e}")))?;

        info!(
            enquiry_name = %enquiry.enquiry_name,
            to = %to,
            "Acknowledgment sent"
        );
        Ok(())
    }
}

/// Render the acknowledgment body.
fn build_ack_body(enquiry: &Enquiry, customer: &Customer, base_url: &str) -> String {
    let edit_url = format!("{base_url}/enquiries/{}", enquiry.enquiry_id);
    format!(
        "Dear {name},\n\n\
         Thank you for your enquiry. We have received your request and it is being processed. \
         Below are the details:\n\n\
         - Enquiry ID: {id}\n\
         - Enquiry Name: {enquiry_name}\n\
         - Customer Name: {name}\n\
         - Company Name: {company}\n\
         - Date & Time: {datetime}\n\
         - Edit Enquiry: {edit_url}\n\n\
         We will get back to you soon with further details.\n\n\
         Best regards,\n\
         The Sales Team\n",
        name = customer.name,
        id = enquiry.enquiry_id,
        enquiry_name = enquiry.enquiry_name,
        company = customer.company_name.as_deref().unwrap_or("N/A"),
        datetime = enquiry.enquiry_datetime.format("%Y-%m-%d %H:%M"),
    )
}
