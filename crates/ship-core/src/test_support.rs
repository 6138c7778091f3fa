use crate::types::{Quote, QuoteId, QuoteItem, ShippingOption};

pub(crate) fn sample_quote() -> Quote {
    Quote {
        id: QuoteId::new("q1"),
        customer: "Acme Looms".to_string(),
        origin: "Ningbo, CN".to_string(),
        currency: "USD".to_string(),
        items: vec![
            QuoteItem {
                sku: "RUG-01".to_string(),
                description: "Wool rug 2x3m".to_string(),
                quantity: 10,
                unit_price_usd: 120.0,
                unit_weight_kg: 12.5,
                unit_volume_m3: 0.08,
                hs_code: Some("5701.10".to_string()),
            },
            QuoteItem {
                sku: "RUG-02".to_string(),
                description: "Cotton runner".to_string(),
                quantity: 4,
                unit_price_usd: 45.0,
                unit_weight_kg: 3.0,
                unit_volume_m3: 0.02,
                hs_code: None,
            },
        ],
    }
}

pub(crate) fn sample_option(id: &str) -> ShippingOption {
    ShippingOption {
        id: id.to_string(),
        carrier: "MaerskX".to_string(),
        service: "Ocean FCL".to_string(),
        eta_days: 18,
        price_usd: 420.0,
        co2_kg: Some(2.1),
        origin: "Ningbo, CN".to_string(),
        destination: "Rotterdam, NL".to_string(),
        weight_kg: 137.0,
        volume_m3: 0.88,
        route: vec![
            "Ningbo, CN".to_string(),
            "Singapore".to_string(),
            "Rotterdam, NL".to_string(),
        ],
        notes: None,
    }
}
