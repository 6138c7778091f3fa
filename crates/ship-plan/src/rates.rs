//! Carrier rate lookup. The planner only sees the [`RateSource`] trait.

use async_trait::async_trait;
use ship_core::config::CarrierConfig;
use ship_core::types::{ShipmentProfile, ShippingOption};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("{message}")]
    Unavailable { message: String },
    #[error("carrier {carrier} rejected the shipment: {message}")]
    Rejected { carrier: String, message: String },
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn quote_rates(&self, shipment: &ShipmentProfile)
        -> Result<Vec<ShippingOption>, RateError>;
}

/// Prices every configured carrier row linearly in weight and volume.
#[derive(Debug, Clone)]
pub struct TableRates {
    carriers: Vec<CarrierConfig>,
}

impl TableRates {
    pub fn new(carriers: Vec<CarrierConfig>) -> Self {
        Self { carriers }
    }

    fn option_for(
        &self,
        index: usize,
        carrier: &CarrierConfig,
        shipment: &ShipmentProfile,
    ) -> ShippingOption {
        let price = carrier.base_usd
            + carrier.per_kg_usd * shipment.weight_kg
            + carrier.per_m3_usd * shipment.volume_m3;

        let mut route = Vec::with_capacity(carrier.via.len() + 2);
        route.push(shipment.origin.clone());
        route.extend(carrier.via.iter().cloned());
        route.push(shipment.destination.clone());

        ShippingOption {
            id: format!("o{}", index + 1),
            carrier: carrier.carrier.clone(),
            service: carrier.service.clone(),
            eta_days: carrier.eta_days,
            price_usd: round_cents(price),
            co2_kg: carrier
                .co2_kg_per_kg
                .map(|factor| round_cents(factor * shipment.weight_kg)),
            origin: shipment.origin.clone(),
            destination: shipment.destination.clone(),
            weight_kg: shipment.weight_kg,
            volume_m3: shipment.volume_m3,
            route,
            notes: carrier.notes.clone(),
        }
    }
}

#[async_trait]
impl RateSource for TableRates {
    async fn quote_rates(
        &self,
        shipment: &ShipmentProfile,
    ) -> Result<Vec<ShippingOption>, RateError> {
        Ok(self
            .carriers
            .iter()
            .enumerate()
            .map(|(index, carrier)| self.option_for(index, carrier, shipment))
            .collect())
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ship_core::types::QuoteId;

    fn shipment() -> ShipmentProfile {
        ShipmentProfile {
            quote_id: QuoteId::new("q1"),
            origin: "Ningbo, CN".to_string(),
            destination: "Rotterdam, NL".to_string(),
            weight_kg: 100.0,
            volume_m3: 0.5,
            declared_value_usd: 1000.0,
        }
    }

    fn carrier(name: &str, via: &[&str]) -> CarrierConfig {
        CarrierConfig {
            carrier: name.to_string(),
            service: "Ocean FCL".to_string(),
            base_usd: 250.0,
            per_kg_usd: 0.05,
            per_m3_usd: 40.0,
            eta_days: 18,
            co2_kg_per_kg: Some(0.015),
            via: via.iter().map(|stop| stop.to_string()).collect(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn table_rates_price_each_row() {
        let rates = TableRates::new(vec![carrier("MaerskX", &["Singapore"]), carrier("CMA", &[])]);
        let options = rates.quote_rates(&shipment()).await.expect("rates");

        assert_eq!(options.len(), 2);
        assert_eq!(options[0].id, "o1");
        assert_eq!(options[1].id, "o2");
        assert!((options[0].price_usd - 275.0).abs() < 1e-9);
        assert_eq!(options[0].co2_kg, Some(1.5));
        assert_eq!(
            options[0].route,
            vec![
                "Ningbo, CN".to_string(),
                "Singapore".to_string(),
                "Rotterdam, NL".to_string()
            ]
        );
        assert_eq!(options[1].route.len(), 2);
    }

    #[tokio::test]
    async fn empty_table_yields_no_options() {
        let rates = TableRates::new(Vec::new());
        assert!(rates.quote_rates(&shipment()).await.expect("rates").is_empty());
    }
}
