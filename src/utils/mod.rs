pub mod retry;

pub use retry::retry_async;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Convert a UI amount to raw base units, rounding down
pub fn to_base_units(ui_amount: f64, decimals: u8) -> u64 {
    (ui_amount * 10f64.powi(decimals as i32)).floor() as u64
}

pub fn from_base_units(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Shorten a mint or signature for log lines
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Truncate to at most `max_chars` characters on a char boundary
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        assert_eq!(to_base_units(500.0, 6), 500_000_000);
        assert_eq!(to_base_units(1.5, 9), 1_500_000_000);
        assert_eq!(from_base_units(2_500_000, 6), 2.5);
        assert_eq!(lamports_to_sol(5_000), 0.000005);
    }

    #[test]
    fn test_truncation_helpers() {
        assert_eq!(short_id("So11111111111111111111111111111111111111112"), "So111111");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(safe_truncate("héllo", 2), "hé");
    }
}
