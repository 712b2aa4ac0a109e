//! Product knowledge base: the surfaces, screens, and metrics experiments
//! can reference. Tags on an experiment are only accepted if the registry
//! knows them.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A major area of the product (e.g. homepage, checkout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Screen ids belonging to this surface.
    pub screens: Vec<String>,
    /// Metrics this surface tends to move.
    pub key_metrics: Vec<String>,
}

/// A specific page or component within a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub id: String,
    pub name: String,
    pub surface_id: String,
    pub description: String,
}

/// A measurable outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub name: String,
    pub definition: String,
    /// Surfaces whose changes can move this metric.
    pub surfaces_impacted: Vec<String>,
}

/// The catalog experiments are validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub surfaces: Vec<Surface>,
    pub screens: Vec<Screen>,
    pub metrics: Vec<Metric>,
}

impl Registry {
    pub fn surface(&self, id: &str) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.id == id)
    }

    pub fn screen(&self, id: &str) -> Option<&Screen> {
        self.screens.iter().find(|s| s.id == id)
    }

    pub fn metric(&self, id: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.id == id)
    }

    /// Comma-separated surface ids, for error messages.
    pub fn available_surfaces(&self) -> String {
        self.surfaces
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Comma-separated metric ids, for error messages.
    pub fn available_metrics(&self) -> String {
        self.metrics
            .iter()
            .map(|m| m.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Human-readable catalog of surfaces, one per line.
    pub fn describe_surfaces(&self) -> String {
        let mut out = Vec::new();
        for s in &self.surfaces {
            out.push(format!("- {} ({}): {}", s.name, s.id, s.description));
            out.push(format!("  Screens: {}", s.screens.join(", ")));
            out.push(format!("  Key metrics: {}", s.key_metrics.join(", ")));
        }
        out.join("\n")
    }

    /// Human-readable catalog of metrics, one per line.
    pub fn describe_metrics(&self) -> String {
        let mut out = Vec::new();
        for m in &self.metrics {
            out.push(format!("- {}: {}", m.name, m.definition));
            out.push(format!("  Impacted by: {}", m.surfaces_impacted.join(", ")));
        }
        out.join("\n")
    }

    /// Load a registry from a JSON file.
    pub fn from_json_file(path: &Path) -> io::Result<Registry> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The built-in generic e-commerce catalog used when no registry file is
/// configured: four surfaces, thirteen screens, nine metrics.
pub fn ecommerce() -> Registry {
    let surfaces = vec![
        Surface {
            id: "homepage".into(),
            name: "Homepage".into(),
            description: "Main landing page users see first".into(),
            screens: strings(&["hero_section", "product_grid", "navigation"]),
            key_metrics: strings(&["click_through_rate", "bounce_rate", "pageviews"]),
        },
        Surface {
            id: "product_page".into(),
            name: "Product Page".into(),
            description: "Individual product detail page".into(),
            screens: strings(&["product_info", "reviews_section", "add_to_cart_button"]),
            key_metrics: strings(&["conversion_rate", "aov", "reviews_helpful"]),
        },
        Surface {
            id: "checkout".into(),
            name: "Checkout Flow".into(),
            description: "Multi-step purchase process".into(),
            screens: strings(&[
                "cart_summary",
                "shipping_options",
                "payment_form",
                "confirmation",
            ]),
            key_metrics: strings(&["conversion_rate", "cart_abandonment", "aov"]),
        },
        Surface {
            id: "email".into(),
            name: "Email".into(),
            description: "Email campaigns and notifications".into(),
            screens: strings(&["welcome_series", "promotional", "post_purchase"]),
            key_metrics: strings(&["open_rate", "email_click_rate", "conversion_rate"]),
        },
    ];

    let screen = |id: &str, name: &str, surface_id: &str, description: &str| Screen {
        id: id.into(),
        name: name.into(),
        surface_id: surface_id.into(),
        description: description.into(),
    };
    let screens = vec![
        screen(
            "hero_section",
            "Hero Section",
            "homepage",
            "Main banner with headline and CTA",
        ),
        screen(
            "product_grid",
            "Product Grid",
            "homepage",
            "Listing of products with images and prices",
        ),
        screen("navigation", "Navigation", "homepage", "Top nav menu and search"),
        screen(
            "product_info",
            "Product Info",
            "product_page",
            "Description, images, price, specifications",
        ),
        screen(
            "reviews_section",
            "Reviews",
            "product_page",
            "Customer reviews and ratings",
        ),
        screen(
            "add_to_cart_button",
            "Add to Cart Button",
            "product_page",
            "Button to add item to shopping cart",
        ),
        screen(
            "cart_summary",
            "Cart Summary",
            "checkout",
            "Review items and quantities",
        ),
        screen(
            "shipping_options",
            "Shipping Options",
            "checkout",
            "Choose shipping method",
        ),
        screen(
            "payment_form",
            "Payment Form",
            "checkout",
            "Enter payment information",
        ),
        screen("confirmation", "Confirmation", "checkout", "Order confirmation page"),
        screen(
            "welcome_series",
            "Welcome Series",
            "email",
            "Automated emails for new subscribers",
        ),
        screen("promotional", "Promotional", "email", "Marketing campaigns"),
        screen(
            "post_purchase",
            "Post-Purchase",
            "email",
            "Follow-up and upsell emails",
        ),
    ];

    let metric = |id: &str, name: &str, definition: &str, impacted: &[&str]| Metric {
        id: id.into(),
        name: name.into(),
        definition: definition.into(),
        surfaces_impacted: strings(impacted),
    };
    let metrics = vec![
        metric(
            "click_through_rate",
            "Click-Through Rate",
            "Clicks / Impressions",
            &["homepage", "email"],
        ),
        metric(
            "conversion_rate",
            "Conversion Rate",
            "Purchases / Sessions",
            &["homepage", "product_page", "checkout", "email"],
        ),
        metric(
            "aov",
            "Average Order Value",
            "Total Revenue / Orders",
            &["product_page", "checkout"],
        ),
        metric(
            "cart_abandonment",
            "Cart Abandonment Rate",
            "Abandoned Carts / Carts Created",
            &["checkout"],
        ),
        metric(
            "bounce_rate",
            "Bounce Rate",
            "Single-Page Sessions / Sessions",
            &["homepage"],
        ),
        metric("pageviews", "Pageviews", "Total page views", &["homepage"]),
        metric("open_rate", "Email Open Rate", "Opens / Sends", &["email"]),
        metric("email_click_rate", "Email Click Rate", "Clicks / Opens", &["email"]),
        metric(
            "reviews_helpful",
            "Reviews Helpfulness",
            "Helpful votes / Total votes",
            &["product_page"],
        ),
    ];

    Registry {
        surfaces,
        screens,
        metrics,
    }
}
