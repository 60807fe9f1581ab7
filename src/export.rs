// src/export.rs

use crate::record::{OrderField, OrderRecord};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write CSV row: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to finish CSV buffer: {0}")]
    Buffer(String),

    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),
}

/// Export columns, in order. The flag marks columns wrapped in double quotes.
const COLUMNS: [(&str, OrderField, bool); 18] = [
    ("Laundry Service", OrderField::LaundryService, true),
    ("Date", OrderField::Date, false),
    ("Customer Name", OrderField::CustomerName, true),
    ("Address", OrderField::Address, true),
    ("Order #", OrderField::OrderNumber, false),
    ("Item Desc", OrderField::ItemDescription, true),
    ("Quantity", OrderField::ItemQuantity, false),
    ("Weight", OrderField::Weight, false),
    ("Client Paid", OrderField::ClientTotalPaid, false),
    ("Shipping", OrderField::ShippingPrice, false),
    ("Discount Amt", OrderField::DiscountAmount, false),
    ("Discount %", OrderField::DiscountPercentage, false),
    ("Shopify Payout", OrderField::ShopifyPayout, false),
    ("Shopify Fee", OrderField::ShopifyFee, false),
    ("Payout Date", OrderField::PayoutDate, false),
    ("Wash Deduction", OrderField::WashDeductionKgs, false),
    ("Others Ded.", OrderField::OthersDeduction, false),
    ("Total Ded.", OrderField::TotalDeduction, false),
];

/// Render records as comma-separated text: one header row, then one row per
/// record in the given order, `\n` between rows and none after the last.
///
/// Text columns are wrapped in double quotes as-is. Quotes inside a value
/// are not escaped, so such a value produces a broken row.
pub fn serialize(records: &[OrderRecord]) -> Result<String, ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);

    wtr.write_record(COLUMNS.iter().map(|(header, _, _)| *header))?;

    for record in records {
        wtr.write_record(COLUMNS.iter().map(|&(_, field, quoted)| {
            let value = record.field(field);
            if quoted {
                format!("\"{value}\"")
            } else {
                value.to_string()
            }
        }))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))?;
    let mut text = String::from_utf8(bytes).map_err(|e| ExportError::Buffer(e.to_string()))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Serialize and write to `path`, replacing any existing file.
pub fn write_export(path: impl AsRef<Path>, records: &[OrderRecord]) -> Result<(), ExportError> {
    let path = path.as_ref();
    let content = serialize(records)?;
    fs::write(path, content)?;
    info!(path = %path.display(), rows = records.len(), "Export written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RawOrder, normalize_with_date};
    use pretty_assertions::assert_eq;

    const HEADER: &str = "Laundry Service,Date,Customer Name,Address,Order #,Item Desc,Quantity,Weight,\
Client Paid,Shipping,Discount Amt,Discount %,Shopify Payout,Shopify Fee,Payout Date,\
Wash Deduction,Others Ded.,Total Ded.";

    #[test]
    fn test_no_records_is_header_only() {
        assert_eq!(serialize(&[]).unwrap(), HEADER);
    }

    #[test]
    fn test_row_quoting_and_order() {
        let record = normalize_with_date(
            RawOrder {
                customer_name: Some("Anna de Vries".to_string()),
                address: Some("Kerkstraat 1".to_string()),
                order_number: Some("#1015".to_string()),
                laundry_service: Some("WasBaas".to_string()),
                item_description: Some("36kg".to_string()),
                client_total_paid: Some("€119.80".to_string()),
                discount_percentage: Some("3.97%".to_string()),
                payout_date: Some("21-07-2025".to_string()),
                ..Default::default()
            },
            "14/07/2025",
        );

        let out = serialize(std::slice::from_ref(&record)).unwrap();
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], HEADER);
        assert_eq!(
            lines[1],
            "\"WasBaas\",14/07/2025,\"Anna de Vries\",\"Kerkstraat 1\",#1015,\"36kg\",1,36kg,\
€119.80,0.00,0.00,3.97%,0.00,0.00,21-07-2025,0.00,0.00,0.00"
        );
    }

    #[test]
    fn test_rows_follow_input_order() {
        let make = |name: &str| {
            normalize_with_date(
                RawOrder {
                    customer_name: Some(name.to_string()),
                    ..Default::default()
                },
                "01/01/2025",
            )
        };
        let records = vec![make("Bram"), make("Anna")];
        let out = serialize(&records).unwrap();
        let rows: Vec<&str> = out.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("\"Bram\""));
        assert!(rows[1].contains("\"Anna\""));
        assert!(!out.ends_with('\n'));
    }

    #[test]
    fn test_embedded_quotes_are_not_escaped() {
        let mut record = normalize_with_date(RawOrder::default(), "01/01/2025");
        record.customer_name = "Anna \"the boss\"".to_string();
        let out = serialize(&[record]).unwrap();
        assert!(out.contains(",\"Anna \"the boss\"\","));
    }

    #[test]
    fn test_write_export_to_file() {
        let path = std::env::temp_dir().join(format!(
            "laundry_ledger_export_{}.csv",
            std::process::id()
        ));
        write_export(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), HEADER);
        fs::remove_file(&path).unwrap();
    }
}
