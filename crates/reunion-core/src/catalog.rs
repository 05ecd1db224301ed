//! Static persona and scenario catalog.
//!
//! Persona keys name the simulated relatives; scenario keys name the topic
//! the family dinner revolves around. Both carry display labels that end up
//! in prompts and transcripts.

use serde::Serialize;

/// A catalog entry: a stable key plus its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Stable identifier used in requests and storage.
    pub key: &'static str,
    /// Human-readable label.
    pub label: &'static str,
}

/// Persona key of the viewer playing themselves in a live stage.
pub const SELF_ROLE_KEY: &str = "self";

/// Display label of the viewer's own persona.
pub const SELF_ROLE_LABEL: &str = "我";

/// Label used when a persona key is unknown.
pub const DEFAULT_ROLE_LABEL: &str = "亲戚";

/// Label used when a scenario key is unknown.
pub const DEFAULT_SCENARIO_LABEL: &str = "春节寒暄";

/// Every persona a relative agent can be bound to.
pub const ROLES: &[CatalogEntry] = &[
    CatalogEntry { key: "da-yi", label: "大姨" },
    CatalogEntry { key: "er-yi", label: "二姨" },
    CatalogEntry { key: "san-jiu", label: "三舅" },
    CatalogEntry { key: "si-gu", label: "四姑" },
    CatalogEntry { key: "wu-shen", label: "五婶" },
    CatalogEntry { key: "liu-shu", label: "六叔" },
    CatalogEntry { key: "qi-da-ye", label: "七大爷" },
];

/// Every scenario a stage can be set in.
pub const SCENARIOS: &[CatalogEntry] = &[
    CatalogEntry { key: "marriage", label: "催婚突击" },
    CatalogEntry { key: "salary", label: "年终奖盘问" },
    CatalogEntry { key: "housing", label: "买房进度追问" },
    CatalogEntry { key: "career", label: "工作稳定性拷问" },
];

/// Whether `key` is a bindable persona.
#[must_use]
pub fn is_role(key: &str) -> bool {
    ROLES.iter().any(|entry| entry.key == key)
}

/// Whether `key` is a known scenario.
#[must_use]
pub fn is_scenario(key: &str) -> bool {
    SCENARIOS.iter().any(|entry| entry.key == key)
}

/// Display label for a persona key.
///
/// The viewer's own persona maps to [`SELF_ROLE_LABEL`]; unknown keys map to
/// [`DEFAULT_ROLE_LABEL`].
#[must_use]
pub fn role_label(key: &str) -> &'static str {
    if key == SELF_ROLE_KEY {
        return SELF_ROLE_LABEL;
    }
    ROLES
        .iter()
        .find(|entry| entry.key == key)
        .map_or(DEFAULT_ROLE_LABEL, |entry| entry.label)
}

/// Display label for a scenario key, or [`DEFAULT_SCENARIO_LABEL`].
#[must_use]
pub fn scenario_label(key: &str) -> &'static str {
    SCENARIOS
        .iter()
        .find(|entry| entry.key == key)
        .map_or(DEFAULT_SCENARIO_LABEL, |entry| entry.label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels() {
        assert_eq!(role_label("san-jiu"), "三舅");
        assert_eq!(scenario_label("salary"), "年终奖盘问");
        assert_eq!(role_label(SELF_ROLE_KEY), "我");
    }

    #[test]
    fn unknown_keys_fall_back() {
        assert_eq!(role_label("uncle-bob"), DEFAULT_ROLE_LABEL);
        assert_eq!(scenario_label("weather"), DEFAULT_SCENARIO_LABEL);
    }

    #[test]
    fn self_is_not_bindable() {
        assert!(!is_role(SELF_ROLE_KEY));
        assert!(is_role("qi-da-ye"));
        assert!(is_scenario("marriage"));
        assert!(!is_scenario("da-yi"));
    }
}
