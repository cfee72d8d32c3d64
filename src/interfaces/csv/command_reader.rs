use super::batch::REFERENCE_KEY;
use crate::domain::payment::{NewPayment, PaymentMethod};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Create,
    Capture,
    Refund,
}

/// One row of a command file.
///
/// `reference` is the caller's alias for a payment; `create` binds it to the
/// generated id and later rows refer to it.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct PaymentCommand {
    pub op: CommandType,
    pub reference: String,
    pub amount: Option<u64>,
    pub currency: Option<String>,
    pub method: Option<String>,
    /// JSON object with payment method details.
    pub details: Option<String>,
    /// `key=value` pairs separated by `;`.
    pub metadata: Option<String>,
}

impl PaymentCommand {
    pub fn amount(&self) -> Result<u64> {
        self.amount.ok_or_else(|| {
            PaymentError::Validation(format!("{:?} requires an amount", self.reference))
        })
    }

    /// Builds the creation request for a `create` row.
    pub fn to_new_payment(&self) -> Result<NewPayment> {
        let currency = self.currency.as_deref().ok_or_else(|| {
            PaymentError::Validation(format!("{:?} requires a currency", self.reference))
        })?;
        let kind = self.method.as_deref().ok_or_else(|| {
            PaymentError::Validation(format!("{:?} requires a payment method", self.reference))
        })?;

        let mut method = PaymentMethod::new(kind);
        if let Some(raw) = self.details.as_deref().filter(|d| !d.trim().is_empty()) {
            method.details = serde_json::from_str(raw).map_err(|e| {
                PaymentError::Validation(format!("details must be a JSON object: {}", e))
            })?;
        }

        let mut request = NewPayment::new(self.amount()?, currency, method)?;
        for pair in self
            .metadata
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .filter(|p| !p.trim().is_empty())
        {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                PaymentError::Validation(format!("metadata entry {:?} is not key=value", pair))
            })?;
            let key = key.trim();
            if key == REFERENCE_KEY {
                return Err(PaymentError::Validation(format!(
                    "metadata key {:?} is reserved for the row reference",
                    REFERENCE_KEY
                )));
            }
            request = request.with_metadata(key, value.trim());
        }
        Ok(request.with_metadata(REFERENCE_KEY, self.reference.clone()))
    }
}

/// Reads payment commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<PaymentCommand>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<PaymentCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
