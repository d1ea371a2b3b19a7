//! Utility functions and helpers

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a wei amount as gwei with 2 decimals
pub fn format_gwei(wei: u128) -> String {
    format!("{:.2}", wei as f64 / 1e9)
}

/// Format a smallest-unit amount in the native display unit with 6 decimals
pub fn format_native(amount: u128, decimals: u32) -> String {
    let value = amount as f64 / 10_f64.powi(decimals as i32);
    format!("{:.6}", value)
}

/// Format a dollar amount as `$1,234.56`
pub fn format_usd(amount: f64) -> String {
    if !amount.is_finite() {
        return "$0.00".to_string();
    }
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{:02}", if negative { "-" } else { "" }, grouped, frac)
}

/// Strip path and query from an RPC url so API keys never reach the logs
pub fn mask_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let host = rest.split(['/', '?']).next().unwrap_or(rest);
    let masked = if host.len() < rest.len() {
        format!("{}/***", host)
    } else {
        host.to_string()
    };
    match scheme {
        Some(scheme) => format!("{}://{}", scheme, masked),
        None => masked,
    }
}
