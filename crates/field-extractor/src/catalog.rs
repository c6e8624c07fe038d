//! Canonical indicator catalog.
//!
//! Every source payload is mapped onto this fixed set of field ids before
//! consensus runs. Aliases cover the naming spread across Brazilian finance
//! sites (snake_case, slashed, Portuguese long forms).

/// Static description of one canonical fundamental indicator.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalField {
    pub id: &'static str,
    /// Ordered lookup keys, most specific first. The canonical id is always
    /// the first alias.
    pub aliases: &'static [&'static str],
    /// Whether zero is a legitimate value for this field. For everything
    /// else a zero reading means the site had no data.
    pub zero_valid: bool,
    /// Critical fields get a tighter divergence threshold in fallback
    /// decisions.
    pub critical: bool,
}

pub const CATALOG: &[CanonicalField] = &[
    CanonicalField {
        id: "pl",
        aliases: &["pl", "p/l", "p_l", "preco_lucro", "price_earnings", "pe"],
        zero_valid: false,
        critical: true,
    },
    CanonicalField {
        id: "pvp",
        aliases: &["pvp", "p/vp", "p_vp", "preco_valor_patrimonial", "price_book", "pb"],
        zero_valid: false,
        critical: true,
    },
    CanonicalField {
        id: "psr",
        aliases: &["psr", "p/sr", "p_sr", "preco_receita", "price_sales"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "dy",
        aliases: &["dy", "dividend_yield", "div_yield", "yield"],
        zero_valid: false,
        critical: true,
    },
    CanonicalField {
        id: "roe",
        aliases: &["roe", "return_on_equity"],
        zero_valid: false,
        critical: true,
    },
    CanonicalField {
        id: "roic",
        aliases: &["roic", "return_on_invested_capital"],
        zero_valid: false,
        critical: true,
    },
    CanonicalField {
        id: "roa",
        aliases: &["roa", "return_on_assets"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "net_margin",
        aliases: &["net_margin", "margem_liquida", "marg_liquida", "m_liquida"],
        zero_valid: false,
        critical: true,
    },
    CanonicalField {
        id: "gross_margin",
        aliases: &["gross_margin", "margem_bruta", "marg_bruta", "m_bruta"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "ebit_margin",
        aliases: &["ebit_margin", "margem_ebit", "marg_ebit", "m_ebit"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "ev_ebitda",
        aliases: &["ev_ebitda", "ev/ebitda", "evebitda"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "ev_ebit",
        aliases: &["ev_ebit", "ev/ebit", "evebit"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "current_ratio",
        aliases: &["current_ratio", "liquidez_corrente", "liq_corrente"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "net_debt_equity",
        aliases: &[
            "net_debt_equity",
            "div_liquida_patrimonio",
            "divida_liquida_pl",
            "net_debt_to_equity",
        ],
        // A debt-free company legitimately reports 0 here.
        zero_valid: true,
        critical: false,
    },
    CanonicalField {
        id: "net_debt_ebitda",
        aliases: &["net_debt_ebitda", "div_liquida_ebitda", "divida_liquida_ebitda"],
        zero_valid: true,
        critical: false,
    },
    CanonicalField {
        id: "lpa",
        aliases: &["lpa", "earnings_per_share", "eps"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "vpa",
        aliases: &["vpa", "book_value_per_share", "bvps"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "payout",
        aliases: &["payout", "payout_ratio"],
        // Companies that pay no dividends report a real 0% payout.
        zero_valid: true,
        critical: false,
    },
    CanonicalField {
        id: "cagr_revenue_5y",
        aliases: &["cagr_revenue_5y", "cagr_receita_5a", "cagr_receitas_5_anos", "revenue_cagr_5y"],
        zero_valid: false,
        critical: false,
    },
    CanonicalField {
        id: "cagr_profit_5y",
        aliases: &["cagr_profit_5y", "cagr_lucro_5a", "cagr_lucros_5_anos", "profit_cagr_5y"],
        zero_valid: false,
        critical: false,
    },
];

pub fn field_spec(id: &str) -> Option<&'static CanonicalField> {
    CATALOG.iter().find(|f| f.id == id)
}

pub fn is_critical(field: &str) -> bool {
    field_spec(field).map(|f| f.critical).unwrap_or(false)
}

pub fn is_zero_valid(field: &str) -> bool {
    field_spec(field).map(|f| f.zero_valid).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_ids_are_unique_and_lead_their_alias_lists() {
        let mut seen = HashSet::new();
        for field in CATALOG {
            assert!(seen.insert(field.id), "duplicate field id {}", field.id);
            assert_eq!(field.aliases[0], field.id);
        }
    }

    #[test]
    fn aliases_never_collide_across_fields() {
        let mut seen = HashSet::new();
        for field in CATALOG {
            for alias in field.aliases {
                assert!(seen.insert(*alias), "alias {alias} appears twice");
            }
        }
    }

    #[test]
    fn critical_set_is_the_expected_six() {
        let critical: HashSet<&str> = CATALOG.iter().filter(|f| f.critical).map(|f| f.id).collect();
        let expected: HashSet<&str> =
            ["pl", "pvp", "roe", "roic", "dy", "net_margin"].into_iter().collect();
        assert_eq!(critical, expected);
    }

    #[test]
    fn zero_allow_list_covers_debt_ratios_and_payout() {
        assert!(is_zero_valid("net_debt_equity"));
        assert!(is_zero_valid("net_debt_ebitda"));
        assert!(is_zero_valid("payout"));
        assert!(!is_zero_valid("pl"));
        assert!(!is_zero_valid("unknown_field"));
    }
}
