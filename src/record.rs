// src/record.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

/// One order line as returned by the inference service.
///
/// Nothing here is trusted: every field may be missing, `null`, empty or of
/// the wrong JSON type. It only becomes usable after [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOrder {
    #[serde(deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub customer_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub address: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub order_number: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub weight: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub laundry_service: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub client_total_paid: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub shipping_price: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub payout_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub shopify_payout: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub shopify_fee: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub discount_amount: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub discount_percentage: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub wash_deduction_kgs: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub others_deduction: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub total_deduction: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub item_quantity: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub item_description: Option<String>,
}

impl RawOrder {
    /// How many fields carry a non-empty value, out of all of them.
    pub fn coverage(&self) -> (usize, usize) {
        let fields = [
            &self.date,
            &self.customer_name,
            &self.address,
            &self.order_number,
            &self.weight,
            &self.laundry_service,
            &self.client_total_paid,
            &self.shipping_price,
            &self.payout_date,
            &self.shopify_payout,
            &self.shopify_fee,
            &self.discount_amount,
            &self.discount_percentage,
            &self.wash_deduction_kgs,
            &self.others_deduction,
            &self.total_deduction,
            &self.item_quantity,
            &self.item_description,
        ];
        let filled = fields
            .iter()
            .filter(|f| f.as_deref().is_some_and(|s| !s.is_empty()))
            .count();
        (filled, fields.len())
    }
}

/// Models sometimes answer `"weight": 36` instead of `"weight": "36kg"`.
/// Scalars are kept as text; arrays and objects count as missing.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// A normalized laundry order. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: String,
    pub date: String,
    pub customer_name: String,
    pub address: String,
    pub order_number: String,
    pub weight: String,
    pub laundry_service: String,

    // Financials
    pub client_total_paid: String,
    pub shipping_price: String,
    pub payout_date: String,
    pub shopify_payout: String,
    pub shopify_fee: String,
    pub discount_amount: String,
    pub discount_percentage: String,

    // Deductions
    pub wash_deduction_kgs: String,
    pub others_deduction: String,
    pub total_deduction: String,

    // Item details
    pub item_quantity: String,
    pub item_description: String,
}

impl OrderRecord {
    pub fn field(&self, field: OrderField) -> &str {
        match field {
            OrderField::Date => &self.date,
            OrderField::CustomerName => &self.customer_name,
            OrderField::Address => &self.address,
            OrderField::OrderNumber => &self.order_number,
            OrderField::Weight => &self.weight,
            OrderField::LaundryService => &self.laundry_service,
            OrderField::ClientTotalPaid => &self.client_total_paid,
            OrderField::ShippingPrice => &self.shipping_price,
            OrderField::PayoutDate => &self.payout_date,
            OrderField::ShopifyPayout => &self.shopify_payout,
            OrderField::ShopifyFee => &self.shopify_fee,
            OrderField::DiscountAmount => &self.discount_amount,
            OrderField::DiscountPercentage => &self.discount_percentage,
            OrderField::WashDeductionKgs => &self.wash_deduction_kgs,
            OrderField::OthersDeduction => &self.others_deduction,
            OrderField::TotalDeduction => &self.total_deduction,
            OrderField::ItemQuantity => &self.item_quantity,
            OrderField::ItemDescription => &self.item_description,
        }
    }

    pub fn field_mut(&mut self, field: OrderField) -> &mut String {
        match field {
            OrderField::Date => &mut self.date,
            OrderField::CustomerName => &mut self.customer_name,
            OrderField::Address => &mut self.address,
            OrderField::OrderNumber => &mut self.order_number,
            OrderField::Weight => &mut self.weight,
            OrderField::LaundryService => &mut self.laundry_service,
            OrderField::ClientTotalPaid => &mut self.client_total_paid,
            OrderField::ShippingPrice => &mut self.shipping_price,
            OrderField::PayoutDate => &mut self.payout_date,
            OrderField::ShopifyPayout => &mut self.shopify_payout,
            OrderField::ShopifyFee => &mut self.shopify_fee,
            OrderField::DiscountAmount => &mut self.discount_amount,
            OrderField::DiscountPercentage => &mut self.discount_percentage,
            OrderField::WashDeductionKgs => &mut self.wash_deduction_kgs,
            OrderField::OthersDeduction => &mut self.others_deduction,
            OrderField::TotalDeduction => &mut self.total_deduction,
            OrderField::ItemQuantity => &mut self.item_quantity,
            OrderField::ItemDescription => &mut self.item_description,
        }
    }
}

/// Editable fields of an [`OrderRecord`]. The `id` is not editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
    Date,
    CustomerName,
    Address,
    OrderNumber,
    Weight,
    LaundryService,
    ClientTotalPaid,
    ShippingPrice,
    PayoutDate,
    ShopifyPayout,
    ShopifyFee,
    DiscountAmount,
    DiscountPercentage,
    WashDeductionKgs,
    OthersDeduction,
    TotalDeduction,
    ItemQuantity,
    ItemDescription,
}

impl OrderField {
    pub const ALL: [OrderField; 18] = [
        OrderField::Date,
        OrderField::CustomerName,
        OrderField::Address,
        OrderField::OrderNumber,
        OrderField::Weight,
        OrderField::LaundryService,
        OrderField::ClientTotalPaid,
        OrderField::ShippingPrice,
        OrderField::PayoutDate,
        OrderField::ShopifyPayout,
        OrderField::ShopifyFee,
        OrderField::DiscountAmount,
        OrderField::DiscountPercentage,
        OrderField::WashDeductionKgs,
        OrderField::OthersDeduction,
        OrderField::TotalDeduction,
        OrderField::ItemQuantity,
        OrderField::ItemDescription,
    ];

    /// Wire name, as used in the inference schema and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderField::Date => "date",
            OrderField::CustomerName => "customerName",
            OrderField::Address => "address",
            OrderField::OrderNumber => "orderNumber",
            OrderField::Weight => "weight",
            OrderField::LaundryService => "laundryService",
            OrderField::ClientTotalPaid => "clientTotalPaid",
            OrderField::ShippingPrice => "shippingPrice",
            OrderField::PayoutDate => "payoutDate",
            OrderField::ShopifyPayout => "shopifyPayout",
            OrderField::ShopifyFee => "shopifyFee",
            OrderField::DiscountAmount => "discountAmount",
            OrderField::DiscountPercentage => "discountPercentage",
            OrderField::WashDeductionKgs => "washDeductionKgs",
            OrderField::OthersDeduction => "othersDeduction",
            OrderField::TotalDeduction => "totalDeduction",
            OrderField::ItemQuantity => "itemQuantity",
            OrderField::ItemDescription => "itemDescription",
        }
    }
}

impl fmt::Display for OrderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order field: {0}")]
pub struct UnknownField(pub String);

impl FromStr for OrderField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

pub const DEFAULT_CUSTOMER: &str = "Unknown";
pub const DEFAULT_SERVICE: &str = "General";
pub const DEFAULT_AMOUNT: &str = "0.00";
pub const DEFAULT_WEIGHT: &str = "0kg";
pub const DEFAULT_PERCENTAGE: &str = "0%";
pub const DEFAULT_QUANTITY: &str = "1";

/// Today's date as `DD/MM/YYYY`, in local time when the offset is known.
pub fn local_today() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[day]/[month]/[year]"))
        .unwrap_or_default()
}

/// Turn a raw extraction result into a complete record with a fresh id,
/// using today's date when the model found none.
pub fn normalize(raw: RawOrder) -> OrderRecord {
    normalize_with_date(raw, &local_today())
}

/// Same as [`normalize`] but with the fallback date supplied by the caller.
pub fn normalize_with_date(raw: RawOrder, default_date: &str) -> OrderRecord {
    fn present(value: Option<String>) -> Option<String> {
        value.filter(|s| !s.is_empty())
    }
    fn or(value: Option<String>, default: &str) -> String {
        present(value).unwrap_or_else(|| default.to_string())
    }

    // Ledgers often put the weight in the description column ("36kg"), so
    // the description doubles as the weight when no weight was read.
    let weight = present(raw.weight)
        .or_else(|| present(raw.item_description.clone()))
        .unwrap_or_else(|| DEFAULT_WEIGHT.to_string());

    OrderRecord {
        id: Uuid::new_v4().to_string(),
        date: or(raw.date, default_date),
        customer_name: or(raw.customer_name, DEFAULT_CUSTOMER),
        address: or(raw.address, ""),
        order_number: or(raw.order_number, ""),
        weight,
        laundry_service: or(raw.laundry_service, DEFAULT_SERVICE),
        client_total_paid: or(raw.client_total_paid, DEFAULT_AMOUNT),
        shipping_price: or(raw.shipping_price, DEFAULT_AMOUNT),
        payout_date: or(raw.payout_date, ""),
        shopify_payout: or(raw.shopify_payout, DEFAULT_AMOUNT),
        shopify_fee: or(raw.shopify_fee, DEFAULT_AMOUNT),
        discount_amount: or(raw.discount_amount, DEFAULT_AMOUNT),
        discount_percentage: or(raw.discount_percentage, DEFAULT_PERCENTAGE),
        wash_deduction_kgs: or(raw.wash_deduction_kgs, DEFAULT_AMOUNT),
        others_deduction: or(raw.others_deduction, DEFAULT_AMOUNT),
        total_deduction: or(raw.total_deduction, DEFAULT_AMOUNT),
        item_quantity: or(raw.item_quantity, DEFAULT_QUANTITY),
        item_description: or(raw.item_description, ""),
    }
}
