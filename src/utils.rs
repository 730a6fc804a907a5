//! Display formatting helpers

/// Format with thousands separators and `decimals` fraction digits,
/// e.g. `1234567.8` -> `"1,234,568"` for `decimals = 0`
pub fn format_thousands(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }

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

    let negative = value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Format a fraction as a signed percentage: `0.0523` -> `"+5.23%"`
pub fn format_signed_pct(fraction: f64) -> String {
    format!("{:+.2}%", fraction * 100.0)
}

/// Parse a percentage string back to a fraction: `"+5.23%"` -> `0.0523`.
/// Thousands separators are tolerated.
pub fn parse_pct(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '%' | '+' | ','))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    value.is_finite().then_some(value / 100.0)
}

/// `change_24h` -> `Change 24H`: words split on `_`, each letter after a
/// non-letter upper-cased
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut prev_alpha = false;
    for c in key.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
