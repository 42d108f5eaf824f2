use std::collections::BTreeSet;

use crate::models::FeatureOverride;

pub const INVOICING: &str = "invoicing";
pub const SUPPLIER_BILLS: &str = "supplier_bills";
pub const CREDIT_NOTES: &str = "credit_notes";
pub const POS: &str = "pos";
pub const BANK_WEBHOOKS: &str = "bank_webhooks";
pub const REMINDERS: &str = "reminders";

/// Plan features with team overrides applied on top.
///
/// An enabled override adds its feature, a disabled one removes it. At most
/// one override exists per feature, so order does not matter.
pub fn resolve<'a, P, O>(plan_features: P, overrides: O) -> BTreeSet<String>
where
    P: IntoIterator<Item = &'a str>,
    O: IntoIterator<Item = (&'a str, bool)>,
{
    let mut features: BTreeSet<String> = plan_features.into_iter().map(str::to_string).collect();

    for (code, enabled) in overrides {
        if enabled {
            features.insert(code.to_string());
        } else {
            features.remove(code);
        }
    }

    features
}

pub fn resolve_with_overrides(
    plan_features: &[String],
    overrides: &[FeatureOverride],
) -> BTreeSet<String> {
    resolve(
        plan_features.iter().map(String::as_str),
        overrides
            .iter()
            .map(|o| (o.feature_code.as_str(), o.enabled)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_add_and_remove() {
        let resolved = resolve(["A", "B"], [("B", false), ("C", true)]);
        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec!["A".to_string(), "C".to_string()]
        );
    }

    #[test]
    fn test_no_overrides_is_plan() {
        let resolved = resolve([INVOICING, CREDIT_NOTES], Vec::<(&str, bool)>::new());
        assert!(resolved.contains(INVOICING));
        assert!(resolved.contains(CREDIT_NOTES));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_disabling_absent_feature_is_noop() {
        let resolved = resolve([INVOICING], [(POS, false)]);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_resolve_with_override_rows() {
        let team_id = uuid::Uuid::new_v4();
        let overrides = vec![FeatureOverride {
            team_id,
            feature_code: POS.to_string(),
            enabled: true,
            updated_at: chrono::Utc::now(),
        }];
        let resolved = resolve_with_overrides(&[INVOICING.to_string()], &overrides);
        assert!(resolved.contains(POS));
        assert!(resolved.contains(INVOICING));
    }
}
