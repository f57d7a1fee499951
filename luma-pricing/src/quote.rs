use serde::{Deserialize, Serialize};

use crate::catalog::{lookup_item, WEIGHTED_BLANKET_CODE};

const PERSONAL_WASH_RATE: f64 = 2.00;
const REQUEST_WASH_RATE: f64 = 2.25;
const WASH_MINIMUM_LBS: f64 = 20.0;
const LARGE_BEDDING_MINIMUM: f64 = 50.0;
const WEIGHTED_BLANKET_RATE: f64 = 2.85;

/// Wash-and-fold rate class for an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PricingType {
    #[default]
    Personal,
    Request,
}

impl PricingType {
    pub fn wash_rate(self) -> f64 {
        match self {
            PricingType::Personal => PERSONAL_WASH_RATE,
            PricingType::Request => REQUEST_WASH_RATE,
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("request") {
            PricingType::Request
        } else {
            PricingType::Personal
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteItemInput {
    pub item_code: String,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub weight_lbs: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteInput {
    pub pricing_type: PricingType,
    pub wash_fold_weight_lbs: Option<f64>,
    pub weighted_blanket_weight_lbs: Option<f64>,
    #[serde(default)]
    pub items: Vec<QuoteItemInput>,
    /// Customer's up-front estimate in dollars; takes precedence over the
    /// minor-unit form when both are present.
    pub estimated_total_dollars: Option<f64>,
    pub estimated_amount_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteLineItem {
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub total: f64,
    pub total_cents: i64,
    pub applied_minimum: f64,
    pub applied_minimum_cents: i64,
    pub requires_approval: bool,
    pub line_items: Vec<QuoteLineItem>,
}

impl Quote {
    pub fn line_items_json(&self) -> String {
        serde_json::to_string(&self.line_items).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Round-half-away-from-zero at two decimal places, in minor units.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn fmt_lbs(weight: f64) -> String {
    let s = format!("{:.2}", weight);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Turn a weight/item-count input into a priced line-item list, a total,
/// and an approval flag. Pure and deterministic: identical input yields
/// identical output, including line-item ordering.
pub fn calculate(input: &QuoteInput) -> Quote {
    let mut line_items = Vec::new();
    let mut subtotal = 0.0_f64;

    let wash_rate = input.pricing_type.wash_rate();
    let wash_weight = input.wash_fold_weight_lbs.unwrap_or(0.0).max(0.0);

    if wash_weight > 0.0 {
        let billable = wash_weight.max(WASH_MINIMUM_LBS);
        let amount = billable * wash_rate;
        subtotal += amount;
        line_items.push(QuoteLineItem {
            description: format!(
                "Wash & Fold ({} lbs @ ${:.2}/lb)",
                fmt_lbs(billable),
                wash_rate
            ),
            amount,
        });

        if wash_weight < WASH_MINIMUM_LBS {
            line_items.push(QuoteLineItem {
                description: "20 lb minimum applied".to_string(),
                amount: 0.0,
            });
        }
    }

    let mut has_large_bedding_or_weighted = false;

    for item in &input.items {
        let code = item.item_code.trim();
        if code.is_empty() || code.eq_ignore_ascii_case(WEIGHTED_BLANKET_CODE) {
            continue;
        }

        let Some(catalog_item) = lookup_item(code) else {
            continue;
        };

        let quantity = item.quantity.max(0);
        if quantity <= 0 {
            continue;
        }

        let amount = quantity as f64 * catalog_item.unit_price;
        subtotal += amount;
        line_items.push(QuoteLineItem {
            description: format!("{} x{}", catalog_item.description, quantity),
            amount,
        });

        if catalog_item.counts_toward_large_minimum {
            has_large_bedding_or_weighted = true;
        }
    }

    let mut weighted_weight = input.weighted_blanket_weight_lbs.unwrap_or(0.0).max(0.0);
    weighted_weight += input
        .items
        .iter()
        .filter(|i| i.item_code.trim().eq_ignore_ascii_case(WEIGHTED_BLANKET_CODE))
        .map(|i| i.weight_lbs.unwrap_or(0.0).max(0.0))
        .sum::<f64>();

    if weighted_weight > 0.0 {
        let amount = weighted_weight * WEIGHTED_BLANKET_RATE;
        subtotal += amount;
        has_large_bedding_or_weighted = true;
        line_items.push(QuoteLineItem {
            description: format!(
                "Weighted Blanket ({} lbs @ ${:.2}/lb)",
                fmt_lbs(weighted_weight),
                WEIGHTED_BLANKET_RATE
            ),
            amount,
        });
    }

    let wash_minimum = if wash_weight > 0.0 {
        WASH_MINIMUM_LBS * wash_rate
    } else {
        0.0
    };
    let large_minimum = if has_large_bedding_or_weighted {
        LARGE_BEDDING_MINIMUM
    } else {
        0.0
    };
    let applied_minimum = wash_minimum.max(large_minimum);

    if applied_minimum > 0.0 && subtotal < applied_minimum {
        line_items.push(QuoteLineItem {
            description: "Minimum pricing adjustment".to_string(),
            amount: applied_minimum - subtotal,
        });
        subtotal = applied_minimum;
    }

    let total_cents = to_cents(subtotal);
    let applied_minimum_cents = to_cents(applied_minimum);

    let estimated = resolve_estimated_total(input);
    let estimated_cents = to_cents(estimated);
    // Compared in minor units so float noise cannot flip the policy.
    let requires_approval = total_cents > applied_minimum_cents
        || (estimated_cents > 0 && total_cents > to_cents(estimated * 1.20));

    Quote {
        total: subtotal,
        total_cents,
        applied_minimum,
        applied_minimum_cents,
        requires_approval,
        line_items,
    }
}

fn resolve_estimated_total(input: &QuoteInput) -> f64 {
    if let Some(dollars) = input.estimated_total_dollars {
        if dollars > 0.0 {
            return dollars;
        }
    }
    if let Some(cents) = input.estimated_amount_cents {
        if cents > 0 {
            return cents as f64 / 100.0;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wash_input(weight: f64) -> QuoteInput {
        QuoteInput {
            wash_fold_weight_lbs: Some(weight),
            ..QuoteInput::default()
        }
    }

    fn item(code: &str, quantity: i32) -> QuoteItemInput {
        QuoteItemInput {
            item_code: code.to_string(),
            quantity,
            weight_lbs: None,
        }
    }

    #[test]
    fn applies_twenty_pound_wash_minimum() {
        let quote = calculate(&wash_input(10.0));

        assert_eq!(quote.total_cents, 4000);
        assert_eq!(quote.applied_minimum_cents, 4000);
        assert!(!quote.requires_approval);
        assert_eq!(
            quote.line_items[0].description,
            "Wash & Fold (20 lbs @ $2.00/lb)"
        );
        assert_eq!(quote.line_items[1].description, "20 lb minimum applied");
        assert_eq!(quote.line_items[1].amount, 0.0);
    }

    #[test]
    fn request_pricing_uses_higher_rate() {
        let mut input = wash_input(20.0);
        input.pricing_type = PricingType::Request;
        let quote = calculate(&input);

        assert_eq!(quote.total_cents, 4500);
        assert_eq!(quote.applied_minimum_cents, 4500);
        assert!(!quote.requires_approval);
    }

    #[test]
    fn applies_large_bedding_minimum_with_adjustment_line() {
        let quote = calculate(&QuoteInput {
            items: vec![item("blanket", 1)],
            ..QuoteInput::default()
        });

        assert_eq!(quote.total_cents, 5000);
        assert_eq!(quote.applied_minimum_cents, 5000);
        assert!(!quote.requires_approval);

        let adjustment = quote
            .line_items
            .iter()
            .find(|l| l.description == "Minimum pricing adjustment")
            .expect("adjustment line present");
        assert_eq!(to_cents(adjustment.amount), 3201);
    }

    #[test]
    fn weighted_blanket_is_priced_by_weight() {
        let quote = calculate(&QuoteInput {
            items: vec![QuoteItemInput {
                item_code: "weighted_blanket".to_string(),
                quantity: 0,
                weight_lbs: Some(25.0),
            }],
            ..QuoteInput::default()
        });

        assert_eq!(quote.total_cents, 7125);
        assert_eq!(quote.applied_minimum_cents, 5000);
        assert!(quote.requires_approval);
        assert_eq!(
            quote.line_items[0].description,
            "Weighted Blanket (25 lbs @ $2.85/lb)"
        );
    }

    #[test]
    fn explicit_weighted_weight_adds_to_item_rows() {
        let quote = calculate(&QuoteInput {
            weighted_blanket_weight_lbs: Some(5.0),
            items: vec![QuoteItemInput {
                item_code: "weighted_blanket".to_string(),
                quantity: 1,
                weight_lbs: Some(10.0),
            }],
            ..QuoteInput::default()
        });

        // 15 lbs at 2.85 = 42.75, raised to the 50.00 large-bedding minimum.
        assert_eq!(quote.total_cents, 5000);
        assert!(!quote.requires_approval);
    }

    #[test]
    fn estimate_overrun_requires_approval() {
        let mut input = wash_input(20.0);
        input.estimated_total_dollars = Some(30.0);
        let quote = calculate(&input);

        assert_eq!(quote.total_cents, 4000);
        // 40.00 > 30.00 * 1.20 = 36.00
        assert!(quote.requires_approval);
    }

    #[test]
    fn estimate_in_cents_is_honored_when_dollars_absent() {
        let mut input = wash_input(20.0);
        input.estimated_amount_cents = Some(3000);
        let quote = calculate(&input);
        assert!(quote.requires_approval);

        input.estimated_amount_cents = Some(4000);
        let quote = calculate(&input);
        assert!(!quote.requires_approval);
    }

    #[test]
    fn subtotal_above_minimum_requires_approval() {
        let quote = calculate(&wash_input(30.0));
        assert_eq!(quote.total_cents, 6000);
        assert_eq!(quote.applied_minimum_cents, 4000);
        assert!(quote.requires_approval);
    }

    #[test]
    fn unknown_and_zero_quantity_items_are_skipped() {
        let quote = calculate(&QuoteInput {
            items: vec![
                item("dry_cleaning", 3),
                item("pillow_sham", 0),
                item("", 2),
                item("standard_pillow", -1),
            ],
            ..QuoteInput::default()
        });

        assert_eq!(quote.total_cents, 0);
        assert_eq!(quote.applied_minimum_cents, 0);
        assert!(quote.line_items.is_empty());
        assert!(!quote.requires_approval);
    }

    #[test]
    fn wash_plus_items_keeps_ordering_and_is_deterministic() {
        let input = QuoteInput {
            wash_fold_weight_lbs: Some(22.0),
            items: vec![item("pillow_sham", 2), item("comforter_queen", 1)],
            ..QuoteInput::default()
        };

        let first = calculate(&input);
        let second = calculate(&input);
        assert_eq!(first.line_items, second.line_items);
        assert_eq!(first.total_cents, second.total_cents);

        let descriptions: Vec<&str> = first
            .line_items
            .iter()
            .map(|l| l.description.as_str())
            .collect();
        assert_eq!(
            descriptions,
            vec![
                "Wash & Fold (22 lbs @ $2.00/lb)",
                "Pillow Sham x2",
                "Comforter (Queen) x1",
            ]
        );
        // 44.00 + 7.98 + 34.99
        assert_eq!(first.total_cents, 8697);
        assert!(first.requires_approval);
    }

    #[test]
    fn total_never_below_billable_wash_weight_times_rate() {
        for w in [0.5, 5.0, 19.9, 20.0, 27.3, 60.0] {
            let quote = calculate(&wash_input(w));
            let floor = to_cents(w.max(20.0) * 2.00);
            assert!(quote.total_cents >= floor, "weight {w}");
        }
    }

    #[test]
    fn line_items_serialize_to_json() {
        let quote = calculate(&wash_input(10.0));
        let json = quote.line_items_json();
        assert!(json.contains("20 lb minimum applied"));
        let parsed: Vec<QuoteLineItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), quote.line_items.len());
    }
}
