//! Plain-text shipping documents derived from a confirmed option.
//!
//! Rendering is pure template substitution over the quote and the option.

use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::Serialize;

use crate::types::{Quote, ShippingOption};

const INVOICE_TEMPLATE: &str = "\
COMMERCIAL INVOICE {{invoice_number}}
Issued: {{issued_on}}
Bill to: {{customer}}
Ship from: {{origin}}
Ship to: {{destination}}

{{#each lines}}
{{sku}}  {{description}}  x{{quantity}} @ {{unit_price}} = {{line_total}}
{{/each}}

Goods subtotal: {{goods_total}} USD
Freight ({{carrier}} / {{service}}): {{freight}} USD
TOTAL DUE: {{grand_total}} USD
";

const PRODUCTION_STATEMENT_TEMPLATE: &str = "\
PRODUCTION STATEMENT for quote {{quote_id}}
Customer: {{customer}}
Produced at: {{origin}}
Statement date: {{issued_on}}

{{#each lines}}
{{sku}}  {{description}}  units: {{quantity}}  HS: {{hs_code}}
{{/each}}

Total units: {{total_units}}
Goods are ready for dispatch with {{carrier}} ({{service}}), \
expected transit {{eta_days}} days.
";

const PACKING_LIST_TEMPLATE: &str = "\
PACKING LIST for quote {{quote_id}}
Consignee: {{customer}}
Route: {{route}}
Carrier: {{carrier}} / {{service}}

{{#each lines}}
{{sku}}  {{description}}  qty {{quantity}}  {{line_weight}} kg  {{line_volume}} m3
{{/each}}

Total weight: {{weight}} kg
Total volume: {{volume}} m3
{{#if notes}}Notes: {{notes}}
{{/if}}";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to register {kind} template: {source}")]
    Template {
        kind: DocumentKind,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
    #[error("failed to render {kind}: {source}")]
    Render {
        kind: DocumentKind,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    ProductionStatement,
    PackingList,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Invoice,
        DocumentKind::ProductionStatement,
        DocumentKind::PackingList,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::ProductionStatement => "production_statement",
            DocumentKind::PackingList => "packing_list",
        }
    }

    fn template(self) -> &'static str {
        match self {
            DocumentKind::Invoice => INVOICE_TEMPLATE,
            DocumentKind::ProductionStatement => PRODUCTION_STATEMENT_TEMPLATE,
            DocumentKind::PackingList => PACKING_LIST_TEMPLATE,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub kind: DocumentKind,
    pub file_name: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct DocumentLine {
    sku: String,
    description: String,
    quantity: u32,
    hs_code: String,
    unit_price: String,
    line_total: String,
    line_weight: String,
    line_volume: String,
}

#[derive(Debug, Serialize)]
struct DocumentContext {
    invoice_number: String,
    issued_on: String,
    quote_id: String,
    customer: String,
    origin: String,
    destination: String,
    lines: Vec<DocumentLine>,
    total_units: u64,
    goods_total: String,
    freight: String,
    grand_total: String,
    carrier: String,
    service: String,
    eta_days: u32,
    route: String,
    weight: String,
    volume: String,
    notes: Option<String>,
}

impl DocumentContext {
    fn new(quote: &Quote, option: &ShippingOption, issued_on: NaiveDate) -> Self {
        let lines = quote
            .items
            .iter()
            .map(|item| DocumentLine {
                sku: item.sku.clone(),
                description: item.description.clone(),
                quantity: item.quantity,
                hs_code: item.hs_code.clone().unwrap_or_else(|| "-".to_string()),
                unit_price: money(item.unit_price_usd),
                line_total: money(item.line_total_usd()),
                line_weight: format!("{:.1}", item.unit_weight_kg * f64::from(item.quantity)),
                line_volume: format!("{:.2}", item.unit_volume_m3 * f64::from(item.quantity)),
            })
            .collect();
        let goods_total = quote.total_value_usd();

        Self {
            invoice_number: format!("INV-{}-{}", quote.id, option.id),
            issued_on: issued_on.format("%Y-%m-%d").to_string(),
            quote_id: quote.id.to_string(),
            customer: quote.customer.clone(),
            origin: option.origin.clone(),
            destination: option.destination.clone(),
            lines,
            total_units: quote.items.iter().map(|item| u64::from(item.quantity)).sum(),
            goods_total: money(goods_total),
            freight: money(option.price_usd),
            grand_total: money(goods_total + option.price_usd),
            carrier: option.carrier.clone(),
            service: option.service.clone(),
            eta_days: option.eta_days,
            route: option.route.join(" -> "),
            weight: format!("{:.1}", option.weight_kg),
            volume: format!("{:.2}", option.volume_m3),
            notes: option.notes.clone(),
        }
    }
}

pub struct DocumentRenderer {
    hbs: Handlebars<'static>,
}

impl DocumentRenderer {
    pub fn new() -> Result<Self, DocumentError> {
        let mut hbs = Handlebars::new();
        hbs.set_strict_mode(true);
        hbs.register_escape_fn(handlebars::no_escape);
        for kind in DocumentKind::ALL {
            hbs.register_template_string(kind.as_str(), kind.template())
                .map_err(|source| DocumentError::Template {
                    kind,
                    source: Box::new(source),
                })?;
        }
        Ok(Self { hbs })
    }

    pub fn render(
        &self,
        kind: DocumentKind,
        quote: &Quote,
        option: &ShippingOption,
        issued_on: NaiveDate,
    ) -> Result<Document, DocumentError> {
        let context = DocumentContext::new(quote, option, issued_on);
        let body = self
            .hbs
            .render(kind.as_str(), &context)
            .map_err(|source| DocumentError::Render {
                kind,
                source: Box::new(source),
            })?;
        Ok(Document {
            kind,
            file_name: format!("{}-{}.txt", kind.as_str(), quote.id),
            body,
        })
    }

    pub fn render_all(
        &self,
        quote: &Quote,
        option: &ShippingOption,
        issued_on: NaiveDate,
    ) -> Result<Vec<Document>, DocumentError> {
        DocumentKind::ALL
            .into_iter()
            .map(|kind| self.render(kind, quote, option, issued_on))
            .collect()
    }
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}
