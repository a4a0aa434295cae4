//! Keyword-based business classification and report formatting helpers.

use serde::Serialize;

/// Industry buckets used by the competitive analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    SportsEquipment,
    Fashion,
    Software,
    GeneralEcommerce,
}

const INDUSTRY_KEYWORDS: &[(Industry, &[&str])] = &[
    (
        Industry::SportsEquipment,
        &["baseball", "sports", "athletic", "equipment"],
    ),
    (Industry::Fashion, &["fashion", "clothing", "apparel", "dress"]),
    (Industry::Software, &["software", "saas", "platform", "tool"]),
];

impl Industry {
    /// Classify a free-text description. First keyword list with a match wins.
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        INDUSTRY_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(industry, _)| *industry)
            .unwrap_or(Industry::GeneralEcommerce)
    }

    /// Parse an explicit industry slug. Unknown slugs map to general e-commerce.
    pub fn from_slug(slug: &str) -> Self {
        match slug.trim().to_lowercase().as_str() {
            "sports_equipment" => Industry::SportsEquipment,
            "fashion" => Industry::Fashion,
            "software" => Industry::Software,
            _ => Industry::GeneralEcommerce,
        }
    }

    /// Use `explicit` when non-empty, otherwise classify the description.
    pub fn resolve(description: &str, explicit: Option<&str>) -> Self {
        match explicit.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => Self::from_slug(slug),
            None => Self::classify(description),
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Industry::SportsEquipment => "sports_equipment",
            Industry::Fashion => "fashion",
            Industry::Software => "software",
            Industry::GeneralEcommerce => "general_ecommerce",
        }
    }

    /// Title-cased name, e.g. "Sports Equipment".
    pub fn display_name(self) -> &'static str {
        match self {
            Industry::SportsEquipment => "Sports Equipment",
            Industry::Fashion => "Fashion",
            Industry::Software => "Software",
            Industry::GeneralEcommerce => "General Ecommerce",
        }
    }
}

/// Case-insensitive check for any of `needles` in `text`.
pub fn mentions_any(text: &str, needles: &[&str]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Whether the description reads like a baseball or sports business.
pub fn is_sports(description: &str) -> bool {
    mentions_any(description, &["baseball", "sports"])
}

/// Format a number with thousands separators and fixed decimals.
pub fn format_number(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// A percentage figure as written in reports: shortest form, but always with
/// at least one decimal (`8.0`, `10.4`, `12.345`).
pub fn format_rate(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// `$1,234.56` style currency.
pub fn format_currency(value: f64, decimals: usize) -> String {
    format!("${}", format_number(value, decimals))
}
