// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Receipt layouts.
//
// The queue treats payloads as opaque JSON; this module is where they get a
// shape.  Three layouts are known, selected by the payload's `type` field:
//
//   basic        -- itemised sale with total and discount
//   installment  -- hire-purchase sale: down payment, monthly installment,
//                   remaining balance
//   detailed     -- payment history for an account
//
// Anything else prints as `basic`.  POS front ends send amounts as numbers or
// numeric strings interchangeably, so both are accepted everywhere.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::warn;

use quittung_core::AppConfig;
use quittung_core::error::{QuittungError, Result};
use quittung_core::types::PrinterType;

use crate::escpos::{Align, CommandBuilder};

// ---------------------------------------------------------------------------
// Lenient scalar types
// ---------------------------------------------------------------------------

/// A money amount; missing or `null` reads as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawAmount")]
pub struct Amount(pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(f64),
    Text(String),
    Null(()),
}

impl TryFrom<RawAmount> for Amount {
    type Error = String;

    fn try_from(raw: RawAmount) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawAmount::Number(n) => Ok(Self(n)),
            RawAmount::Text(s) if s.trim().is_empty() => Ok(Self(0.0)),
            RawAmount::Text(s) => s
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| format!("not a number: {s:?}")),
            RawAmount::Null(()) => Ok(Self(0.0)),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Free text that some front ends send as a number (phone, account number).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawText")]
pub struct Text(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null(()),
}

impl From<RawText> for Text {
    fn from(raw: RawText) -> Self {
        match raw {
            RawText::Text(s) => Self(s),
            RawText::Number(n) => Self(n.to_string()),
            RawText::Bool(b) => Self(b.to_string()),
            RawText::Null(()) => Self(String::new()),
        }
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Receipt models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub name: Text,
    #[serde(default)]
    pub quantity: Option<Text>,
    #[serde(default)]
    pub price: Amount,
    #[serde(default)]
    pub discount: Option<Amount>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicReceipt {
    pub customer_name: Option<Text>,
    pub employee_name: Option<Text>,
    pub products: Option<Vec<Product>>,
    /// Older front ends send `items` instead of `products`.
    pub items: Option<Vec<Product>>,
    #[serde(default)]
    pub total_amount: Amount,
    #[serde(default)]
    pub discount: Option<Amount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentReceipt {
    pub khata_number: Option<Text>,
    pub customer_name: Option<Text>,
    pub customer_phone: Option<Text>,
    pub employee_name: Option<Text>,
    pub cnic: Option<Text>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub down_payment: Amount,
    #[serde(default)]
    pub monthly_installment: Amount,
    #[serde(default)]
    pub total_amount: Amount,
    #[serde(default)]
    pub discount: Option<Amount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(default)]
    pub sale_date: String,
    #[serde(default)]
    pub paid_amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedReceipt {
    pub customer_name: Option<Text>,
    pub employee_name: Option<Text>,
    #[serde(default)]
    pub total_payments: Vec<Payment>,
    #[serde(default)]
    pub total_amount: Amount,
    #[serde(default)]
    pub remaining_amount: Amount,
}

/// Typed view of a print payload.
#[derive(Debug, Clone)]
pub enum ReceiptRequest {
    Basic(BasicReceipt),
    Installment(InstallmentReceipt),
    Detailed(DetailedReceipt),
}

impl ReceiptRequest {
    /// Interpret a payload by its `type` field.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self> {
        let kind = payload.get("type").and_then(|t| t.as_str());
        let parse_err = |e: serde_json::Error| QuittungError::Format(format!("{} receipt: {e}", kind.unwrap_or("basic")));
        match kind {
            Some("installment") => Ok(Self::Installment(
                InstallmentReceipt::deserialize(payload).map_err(parse_err)?,
            )),
            Some("detailed") => Ok(Self::Detailed(
                DetailedReceipt::deserialize(payload).map_err(parse_err)?,
            )),
            other => {
                if other != Some("basic") {
                    warn!(kind = ?other, "unknown receipt type; defaulting to basic layout");
                }
                Ok(Self::Basic(BasicReceipt::deserialize(payload).map_err(parse_err)?))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Turns payloads into printer command bytes.
#[derive(Debug, Clone)]
pub struct ReceiptFormatter {
    pub printer_type: PrinterType,
    pub width: usize,
    pub store_name: String,
    /// Printed under the title of installment and detailed receipts.
    pub contacts: Vec<String>,
}

impl From<&AppConfig> for ReceiptFormatter {
    fn from(config: &AppConfig) -> Self {
        Self {
            printer_type: config.printer_type,
            width: config.printer_width,
            store_name: config.store_name.clone(),
            contacts: config.store_contacts.clone(),
        }
    }
}

impl ReceiptFormatter {
    /// Render a payload to printer bytes.
    pub fn render(&self, payload: &serde_json::Value) -> Result<Vec<u8>> {
        let request = ReceiptRequest::from_payload(payload)?;
        let mut out = CommandBuilder::new(self.printer_type, self.width);

        out.align(Align::Center)
            .bold(true)
            .println(&self.store_name)
            .bold(false)
            .new_line()
            .draw_line();

        match &request {
            ReceiptRequest::Basic(r) => basic(&mut out, r),
            ReceiptRequest::Installment(r) => self.installment(&mut out, r),
            ReceiptRequest::Detailed(r) => self.detailed(&mut out, r),
        }

        out.new_line().cut();
        Ok(out.build())
    }

    fn contacts(&self, out: &mut CommandBuilder) {
        if self.contacts.is_empty() {
            return;
        }
        out.align(Align::Center);
        for line in &self.contacts {
            out.println(line);
        }
        out.new_line();
    }

    fn installment(&self, out: &mut CommandBuilder, r: &InstallmentReceipt) {
        out.align(Align::Left)
            .println("Installment Purchase Receipt")
            .new_line();
        self.contacts(out);

        out.align(Align::Left)
            .println(&format!("Khata Number: {}", text_or_blank(&r.khata_number)))
            .println(&format!("Customer: {}", text_or_blank(&r.customer_name)))
            .println(&format!("Phone: {}", text_or_blank(&r.customer_phone)))
            .println(&format!("Employee: {}", text_or_blank(&r.employee_name)));
        if let Some(cnic) = &r.cnic {
            out.println(&format!("CNIC: {cnic}"));
        }
        out.new_line().draw_line();

        for product in &r.products {
            let mut line = format!(
                "{} (Qty: {}) - {} Rs",
                product.name,
                text_or_blank(&product.quantity),
                product.price
            );
            if let Some(color) = &product.color {
                line.push_str(&format!(" [Color: {color}]"));
            }
            if let Some(discount) = positive(product.discount) {
                line.push_str(&format!(" (Discount: {discount}) Rs"));
            }
            out.println(&line);
        }
        out.draw_line().new_line();

        out.align(Align::Left)
            .println(&format!("Down Payment: {} Rs", r.down_payment))
            .println(&format!("Monthly Installment: {} Rs", r.monthly_installment))
            .println(&format!("Total Amount: {} Rs", r.total_amount));
        if let Some(discount) = positive(r.discount) {
            out.println(&format!("Discount: {discount} Rs"));
        }
        out.new_line();

        let discount = r.discount.unwrap_or_default().0;
        let remaining = Amount(r.total_amount.0 - discount - r.down_payment.0);
        out.align(Align::Right)
            .bold(true)
            .println(&format!("Remaining Total Amount: {remaining} Rs"))
            .bold(false)
            .new_line();

        out.align(Align::Center)
            .println("Thank you for your business!");
    }

    fn detailed(&self, out: &mut CommandBuilder, r: &DetailedReceipt) {
        out.align(Align::Left)
            .println("Payment Detailed Receipt")
            .new_line();
        self.contacts(out);

        out.align(Align::Left)
            .println(&format!("Customer: {}", text_or_blank(&r.customer_name)))
            .println(&format!("Employee: {}", text_or_blank(&r.employee_name)))
            .new_line()
            .draw_line();

        out.println("Payment History:").draw_line();
        for (index, payment) in r.total_payments.iter().enumerate() {
            out.println(&format!(
                "#{}: {} - {} Rs",
                index + 1,
                sale_date(&payment.sale_date),
                payment.paid_amount
            ));
        }
        out.draw_line().new_line();

        let total_paid = Amount(r.total_payments.iter().map(|p| p.paid_amount.0).sum());
        out.align(Align::Left)
            .println(&format!("Total Amount: {} Rs", r.total_amount))
            .println(&format!("Total Paid: {total_paid} Rs"))
            .println(&format!("Remaining Amount: {} Rs", r.remaining_amount))
            .new_line();

        out.align(Align::Center)
            .println("Thank you for your payment!");
    }
}

fn basic(out: &mut CommandBuilder, r: &BasicReceipt) {
    out.align(Align::Left);
    if let Some(customer) = &r.customer_name {
        out.println(&format!("Customer: {customer}"));
    }
    if let Some(employee) = &r.employee_name {
        out.println(&format!("Employee: {employee}"));
    }
    out.new_line();

    out.println("Purchased Items:").draw_line();
    let products = r.products.as_ref().or(r.items.as_ref());
    for product in products.into_iter().flatten() {
        let mut line = format!(
            "{} ({} x ${})",
            product.name,
            text_or_blank(&product.quantity),
            product.price
        );
        if let Some(discount) = positive(product.discount) {
            line.push_str(&format!(" (-${discount})"));
        }
        out.println(&line);
    }
    out.draw_line();

    out.align(Align::Right)
        .bold(true)
        .println(&format!("Total: ${}", r.total_amount))
        .bold(false);
    if let Some(discount) = positive(r.discount) {
        out.println(&format!("Discount: ${discount}"));
    }
}

fn positive(amount: Option<Amount>) -> Option<Amount> {
    amount.filter(|a| a.0 > 0.0)
}

fn text_or_blank(text: &Option<Text>) -> &str {
    text.as_ref().map(|t| t.0.as_str()).unwrap_or_default()
}

/// RFC 3339 timestamps and plain dates print as `YYYY-MM-DD`; anything else
/// is printed verbatim.
fn sale_date(raw: &str) -> String {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.format("%Y-%m-%d").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn formatter() -> ReceiptFormatter {
        ReceiptFormatter {
            printer_type: PrinterType::Epson,
            width: 32,
            store_name: "Corner Shop".into(),
            contacts: vec!["Counter: 555-0100".into()],
        }
    }

    fn render_text(payload: serde_json::Value) -> String {
        let bytes = formatter().render(&payload).expect("render");
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn amounts_accept_numbers_strings_and_null() {
        let p: Product =
            serde_json::from_value(json!({"name": "x", "price": "12.5", "discount": null}))
                .expect("parse");
        assert_eq!(p.price, Amount(12.5));
        assert_eq!(p.discount, None);

        let p: Product = serde_json::from_value(json!({"name": "x", "price": 3})).expect("parse");
        assert_eq!(p.price.to_string(), "3.00");

        assert!(serde_json::from_value::<Product>(json!({"name": "x", "price": "abc"})).is_err());
    }

    #[test]
    fn basic_receipt_lines() {
        let text = render_text(json!({
            "type": "basic",
            "customerName": "Ayesha",
            "employeeName": "Bilal",
            "products": [
                {"name": "Kettle", "quantity": 2, "price": "15", "discount": "1.5"},
                {"name": "Mug", "quantity": 1, "price": 4}
            ],
            "totalAmount": 32.5,
            "discount": 0
        }));
        assert!(text.contains("Corner Shop\n"));
        assert!(text.contains("Customer: Ayesha\n"));
        assert!(text.contains("Employee: Bilal\n"));
        assert!(text.contains("Kettle (2 x $15.00) (-$1.50)\n"));
        assert!(text.contains("Mug (1 x $4.00)\n"));
        assert!(text.contains("Total: $32.50\n"));
        assert!(!text.contains("Discount:"));
    }

    #[test]
    fn basic_receipt_falls_back_to_items() {
        let text = render_text(json!({
            "items": [{"name": "Tea", "quantity": "3", "price": 1}],
            "totalAmount": "3"
        }));
        assert!(text.contains("Tea (3 x $1.00)\n"));
        assert!(text.contains("Total: $3.00\n"));
    }

    #[test]
    fn unknown_type_prints_basic_layout() {
        let text = render_text(json!({"type": "gift", "totalAmount": 10}));
        assert!(text.contains("Purchased Items:\n"));
        assert!(text.contains("Total: $10.00\n"));
    }

    #[test]
    fn installment_remaining_total() {
        let text = render_text(json!({
            "type": "installment",
            "khataNumber": 42,
            "customerName": "Ayesha",
            "customerPhone": "0300-1234567",
            "employeeName": "Bilal",
            "products": [{"name": "Fridge", "quantity": 1, "price": 900, "color": "White"}],
            "downPayment": 100,
            "monthlyInstallment": "50",
            "totalAmount": 900,
            "discount": 50
        }));
        assert!(text.contains("Counter: 555-0100\n"));
        assert!(text.contains("Khata Number: 42\n"));
        assert!(text.contains("Fridge (Qty: 1) - 900.00 Rs [Color: White]\n"));
        assert!(text.contains("Discount: 50.00 Rs\n"));
        assert!(text.contains("Remaining Total Amount: 750.00 Rs\n"));
        assert!(!text.contains("CNIC"));
    }

    #[test]
    fn detailed_sums_payment_history() {
        let text = render_text(json!({
            "type": "detailed",
            "customerName": "Ayesha",
            "employeeName": "Bilal",
            "totalPayments": [
                {"saleDate": "2026-03-01T10:00:00Z", "paidAmount": 100},
                {"saleDate": "2026-04-01", "paidAmount": "150.5"}
            ],
            "totalAmount": 900,
            "remainingAmount": 649.5
        }));
        assert!(text.contains("#1: 2026-03-01 - 100.00 Rs\n"));
        assert!(text.contains("#2: 2026-04-01 - 150.50 Rs\n"));
        assert!(text.contains("Total Paid: 250.50 Rs\n"));
        assert!(text.contains("Remaining Amount: 649.50 Rs\n"));
    }

    #[test]
    fn malformed_layout_is_a_format_error() {
        let err = formatter()
            .render(&json!({"type": "detailed", "totalPayments": "lots"}))
            .unwrap_err();
        assert!(matches!(err, QuittungError::Format(_)));
    }

    #[test]
    fn null_and_numeric_display_fields_still_print() {
        let text = render_text(json!({
            "customerName": null,
            "employeeName": 42,
            "products": [
                {"name": null, "quantity": 1, "price": 3},
                {"name": 1001, "quantity": 2, "price": "1.5"}
            ],
            "totalAmount": 6
        }));
        assert!(text.contains("Employee: 42\n"));
        assert!(!text.contains("Customer:"));
        assert!(text.contains(" (1 x $3.00)\n"));
        assert!(text.contains("1001 (2 x $1.50)\n"));
    }

    #[test]
    fn receipt_ends_with_cut() {
        let bytes = formatter().render(&json!({"totalAmount": 1})).expect("render");
        assert!(bytes.ends_with(&[0x1D, b'V', 66, 3]));
    }
}
