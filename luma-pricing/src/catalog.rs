/// Fixed bedding price list. Item codes arrive from the scheduling form and
/// the admin quoting screen; unknown codes are skipped by the calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogItem {
    pub code: &'static str,
    pub description: &'static str,
    pub unit_price: f64,
    /// Comforters, duvet covers, and blankets count toward the $50
    /// large-bedding minimum.
    pub counts_toward_large_minimum: bool,
}

/// Weighted blankets are priced by weight, not unit count, and are handled
/// outside the fixed catalog.
pub const WEIGHTED_BLANKET_CODE: &str = "weighted_blanket";

const CATALOG: &[CatalogItem] = &[
    CatalogItem {
        code: "comforter_king",
        description: "Comforter (King)",
        unit_price: 34.99,
        counts_toward_large_minimum: true,
    },
    CatalogItem {
        code: "comforter_queen",
        description: "Comforter (Queen)",
        unit_price: 34.99,
        counts_toward_large_minimum: true,
    },
    CatalogItem {
        code: "comforter_full",
        description: "Comforter (Full)",
        unit_price: 32.99,
        counts_toward_large_minimum: true,
    },
    CatalogItem {
        code: "comforter_twin",
        description: "Comforter (Twin)",
        unit_price: 32.99,
        counts_toward_large_minimum: true,
    },
    CatalogItem {
        code: "duvet_cover",
        description: "Duvet Cover",
        unit_price: 19.99,
        counts_toward_large_minimum: true,
    },
    CatalogItem {
        code: "blanket",
        description: "Blanket",
        unit_price: 17.99,
        counts_toward_large_minimum: true,
    },
    CatalogItem {
        code: "bedspread",
        description: "Bedspread",
        unit_price: 15.99,
        counts_toward_large_minimum: false,
    },
    CatalogItem {
        code: "cushion_slip_cover",
        description: "Cushion Slip Cover",
        unit_price: 8.99,
        counts_toward_large_minimum: false,
    },
    CatalogItem {
        code: "chair_slip_cover",
        description: "Chair Slip Cover",
        unit_price: 17.99,
        counts_toward_large_minimum: false,
    },
    CatalogItem {
        code: "sofa_slip_cover",
        description: "Sofa Slip Cover",
        unit_price: 22.99,
        counts_toward_large_minimum: false,
    },
    CatalogItem {
        code: "pillow_sham",
        description: "Pillow Sham",
        unit_price: 3.99,
        counts_toward_large_minimum: false,
    },
    CatalogItem {
        code: "standard_pillow",
        description: "Standard Pillow",
        unit_price: 9.99,
        counts_toward_large_minimum: false,
    },
    CatalogItem {
        code: "mattress_cover",
        description: "Mattress Cover",
        unit_price: 11.99,
        counts_toward_large_minimum: false,
    },
];

/// Case-insensitive catalog lookup.
pub fn lookup_item(code: &str) -> Option<&'static CatalogItem> {
    let trimmed = code.trim();
    CATALOG.iter().find(|item| item.code.eq_ignore_ascii_case(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_trims() {
        let item = lookup_item("  Comforter_King ").unwrap();
        assert_eq!(item.description, "Comforter (King)");
        assert!(item.counts_toward_large_minimum);
    }

    #[test]
    fn unknown_codes_miss() {
        assert!(lookup_item("dry_cleaning").is_none());
        assert!(lookup_item("").is_none());
    }

    #[test]
    fn weighted_blanket_is_not_a_catalog_item() {
        assert!(lookup_item(WEIGHTED_BLANKET_CODE).is_none());
    }
}
