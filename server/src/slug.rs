use chrono::{DateTime, Utc};
use tracing::warn;

use crate::store::LeadStore;

const MAX_ATTEMPTS: usize = 5;

/// `lead-<last 4 digits>-<DD>-<MM>`.
pub fn base_slug(phone: &str, now: DateTime<Utc>) -> String {
    let digits = phone
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>();
    let last4 = if digits.is_empty() {
        "0000".to_string()
    } else {
        digits[digits.len().saturating_sub(4)..].to_string()
    };
    format!("lead-{last4}-{}", now.format("%d-%m"))
}

/// Returns the conversation's slug, minting one on first contact.
///
/// An existing slug is passed through untouched. New slugs try the base,
/// then `-2` .. `-5`, then fall back to a millisecond timestamp suffix.
pub async fn ensure_slug(
    store: &dyn LeadStore,
    tenant_id: &str,
    phone: &str,
    existing: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    if let Some(slug) = existing.filter(|s| !s.is_empty()) {
        return slug.to_string();
    }

    let base = base_slug(phone, now);
    for attempt in 0..MAX_ATTEMPTS {
        let candidate = if attempt == 0 {
            base.clone()
        } else {
            format!("{base}-{}", attempt + 1)
        };
        match store.slug_taken(tenant_id, &candidate).await {
            Ok(false) => return candidate,
            Ok(true) => continue,
            Err(err) => {
                warn!(tenant_id, error = %err, "slug uniqueness check failed, using timestamp slug");
                break;
            }
        }
    }

    format!("{base}-{}", now.timestamp_millis())
}
