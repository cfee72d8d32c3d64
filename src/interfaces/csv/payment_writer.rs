use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct PaymentRow<'a> {
    reference: &'a str,
    id: String,
    status: PaymentStatus,
    amount: u64,
    currency: &'a str,
    captured: u64,
    refunded: u64,
    external_id: &'a str,
}

/// Writes the final state of each payment as one CSV row.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes a header followed by one row per `(reference, payment)` pair.
    pub fn write_payments<'a, I>(&mut self, payments: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a PaymentRecord)>,
    {
        let mut wrote_any = false;
        for (reference, payment) in payments {
            self.writer.serialize(PaymentRow {
                reference,
                id: payment.id().to_string(),
                status: payment.status(),
                amount: payment.amount().value(),
                currency: payment.currency().as_str(),
                captured: payment.captured_amount(),
                refunded: payment.refunded_amount(),
                external_id: payment.external_id().unwrap_or_default(),
            })?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "reference",
                "id",
                "status",
                "amount",
                "currency",
                "captured",
                "refunded",
                "external_id",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{NewPayment, PaymentMethod};
    use chrono::Utc;

    #[test]
    fn test_writes_header_and_rows() {
        let request = NewPayment::new(1000, "usd", PaymentMethod::new("wallet")).unwrap();
        let payment = PaymentRecord::new(request, Utc::now());

        let mut out = Vec::new();
        PaymentWriter::new(&mut out)
            .write_payments([("order-1", &payment)])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("reference,id,status,amount,currency,captured,refunded,external_id")
        );
        assert_eq!(
            lines.next(),
            Some(format!("order-1,{},pending,1000,USD,0,0,", payment.id()).as_str())
        );
    }

    #[test]
    fn test_empty_output_still_has_header() {
        let mut out = Vec::new();
        PaymentWriter::new(&mut out)
            .write_payments(Vec::<(&str, &PaymentRecord)>::new())
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "reference,id,status,amount,currency,captured,refunded,external_id\n"
        );
    }
}
