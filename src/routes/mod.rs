pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod checkout;
pub mod orders;
pub mod products;

use serde::Deserialize;
use utoipa::IntoParams;

/// Query string accepted by every capped listing endpoint.
#[derive(Deserialize, IntoParams)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// Clamp a caller-supplied limit into `1..=max`, falling back to `default`
/// when absent.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::clamp_limit;

    #[test]
    fn missing_limit_uses_default() {
        assert_eq!(clamp_limit(None, 6, 24), 6);
    }

    #[test]
    fn limit_is_clamped_to_bounds() {
        assert_eq!(clamp_limit(Some(0), 6, 24), 1);
        assert_eq!(clamp_limit(Some(-3), 6, 24), 1);
        assert_eq!(clamp_limit(Some(500), 6, 24), 24);
    }

    #[test]
    fn in_range_limit_passes_through() {
        assert_eq!(clamp_limit(Some(12), 6, 24), 12);
    }
}
