//! Lifecycle policies and the rule documents they expand into.
//!
//! Rule documents use the same field names as the S3 lifecycle API
//! (`Rules`, `ID`, `Transitions`, ...) so custom rule sets can be pasted in
//! from existing tooling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Days after which the auto-archive policy moves objects to cold storage.
pub const AUTO_ARCHIVE_DAYS: u32 = 30;
/// Days after which the auto-delete policy expires noncurrent versions.
pub const AUTO_DELETE_NONCURRENT_DAYS: u32 = 90;
/// Storage class used for cold storage transitions.
pub const COLD_STORAGE_CLASS: &str = "GLACIER";

pub const AUTO_ARCHIVE_RULE_ID: &str = "AutoArchiveRule";
pub const AUTO_DELETE_RULE_ID: &str = "AutoDeleteVersionsRule";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LifecyclePolicy {
    #[default]
    None,
    #[serde(rename = "Auto-Archive")]
    AutoArchive,
    #[serde(rename = "Auto-Delete")]
    AutoDelete,
    Custom,
}

impl LifecyclePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePolicy::None => "None",
            LifecyclePolicy::AutoArchive => "Auto-Archive",
            LifecyclePolicy::AutoDelete => "Auto-Delete",
            LifecyclePolicy::Custom => "Custom",
        }
    }

    /// Parse a policy name, falling back to `None` for anything unrecognised.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim() {
            "Auto-Archive" | "AutoArchive" => LifecyclePolicy::AutoArchive,
            "Auto-Delete" | "AutoDelete" => LifecyclePolicy::AutoDelete,
            "Custom" => LifecyclePolicy::Custom,
            _ => LifecyclePolicy::None,
        }
    }
}

impl fmt::Display for LifecyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleStatus {
    Enabled,
    Disabled,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct RuleFilter {
    #[serde(rename = "Prefix", default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    #[serde(rename = "Days")]
    pub days: u32,
    #[serde(rename = "StorageClass")]
    pub storage_class: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Expiration {
    #[serde(rename = "Days")]
    pub days: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NoncurrentVersionExpiration {
    #[serde(rename = "NoncurrentDays")]
    pub noncurrent_days: u32,
}

/// A single lifecycle rule. `Id` is accepted as an alias for `ID`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LifecycleRule {
    #[serde(rename = "ID", alias = "Id")]
    pub id: String,

    #[serde(rename = "Status")]
    pub status: RuleStatus,

    #[serde(rename = "Filter", default)]
    pub filter: RuleFilter,

    #[serde(rename = "Transitions", default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,

    #[serde(rename = "Expiration", default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,

    #[serde(
        rename = "NoncurrentVersionExpiration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub noncurrent_version_expiration: Option<NoncurrentVersionExpiration>,
}

impl LifecycleRule {
    /// A rule is well-formed when it is named and carries at least one action,
    /// every action with a positive day count.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("lifecycle rule is missing an ID".into());
        }

        let has_action = !self.transitions.is_empty()
            || self.expiration.is_some()
            || self.noncurrent_version_expiration.is_some();
        if !has_action {
            return Err(format!("lifecycle rule `{}` has no action", self.id));
        }

        for transition in &self.transitions {
            if transition.days == 0 {
                return Err(format!("lifecycle rule `{}` has a zero-day transition", self.id));
            }
            if transition.storage_class.trim().is_empty() {
                return Err(format!(
                    "lifecycle rule `{}` has a transition without a storage class",
                    self.id
                ));
            }
        }
        if matches!(self.expiration, Some(Expiration { days: 0 })) {
            return Err(format!("lifecycle rule `{}` has a zero-day expiration", self.id));
        }
        if matches!(
            self.noncurrent_version_expiration,
            Some(NoncurrentVersionExpiration { noncurrent_days: 0 })
        ) {
            return Err(format!(
                "lifecycle rule `{}` has a zero-day noncurrent expiration",
                self.id
            ));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct LifecycleConfiguration {
    #[serde(rename = "Rules", default)]
    pub rules: Vec<LifecycleRule>,
}

impl LifecycleConfiguration {
    /// Single rule moving every object to cold storage after 30 days.
    pub fn auto_archive() -> Self {
        Self {
            rules: vec![LifecycleRule {
                id: AUTO_ARCHIVE_RULE_ID.into(),
                status: RuleStatus::Enabled,
                filter: RuleFilter::default(),
                transitions: vec![Transition {
                    days: AUTO_ARCHIVE_DAYS,
                    storage_class: COLD_STORAGE_CLASS.into(),
                }],
                expiration: None,
                noncurrent_version_expiration: None,
            }],
        }
    }

    /// Single rule expiring noncurrent versions after 90 days.
    pub fn auto_delete() -> Self {
        Self {
            rules: vec![LifecycleRule {
                id: AUTO_DELETE_RULE_ID.into(),
                status: RuleStatus::Enabled,
                filter: RuleFilter::default(),
                transitions: Vec::new(),
                expiration: None,
                noncurrent_version_expiration: Some(NoncurrentVersionExpiration {
                    noncurrent_days: AUTO_DELETE_NONCURRENT_DAYS,
                }),
            }],
        }
    }

    /// Keep the well-formed rules. Fails only when none are left.
    pub fn well_formed(&self) -> Result<ExpandedLifecycle, String> {
        if self.rules.is_empty() {
            return Err("custom lifecycle configuration has no rules".into());
        }
        let mut rules = Vec::new();
        let mut rejected = Vec::new();
        for rule in &self.rules {
            match rule.validate() {
                Ok(()) => rules.push(rule.clone()),
                Err(reason) => rejected.push(reason),
            }
        }
        if rules.is_empty() {
            return Err(format!(
                "custom lifecycle configuration has no well-formed rules: {}",
                rejected.join("; ")
            ));
        }
        Ok(ExpandedLifecycle {
            configuration: Self { rules },
            rejected,
        })
    }
}

/// Rule document to apply, with the reasons any supplied rules were dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpandedLifecycle {
    pub configuration: LifecycleConfiguration,
    pub rejected: Vec<String>,
}

impl From<LifecycleConfiguration> for ExpandedLifecycle {
    fn from(configuration: LifecycleConfiguration) -> Self {
        Self {
            configuration,
            rejected: Vec::new(),
        }
    }
}

/// Expand a policy into the rule document that should be applied, if any.
pub fn expand_policy(
    policy: LifecyclePolicy,
    custom: Option<&LifecycleConfiguration>,
) -> Result<Option<ExpandedLifecycle>, String> {
    match policy {
        LifecyclePolicy::None => Ok(None),
        LifecyclePolicy::AutoArchive => Ok(Some(LifecycleConfiguration::auto_archive().into())),
        LifecyclePolicy::AutoDelete => Ok(Some(LifecycleConfiguration::auto_delete().into())),
        LifecyclePolicy::Custom => custom
            .ok_or("custom lifecycle policy has no rules configured")?
            .well_formed()
            .map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_archive_is_a_single_glacier_transition_at_thirty_days() {
        let config = expand_policy(LifecyclePolicy::AutoArchive, None)
            .unwrap()
            .unwrap()
            .configuration;
        assert_eq!(config.rules.len(), 1);
        assert_eq!(
            config.rules[0].transitions,
            vec![Transition {
                days: 30,
                storage_class: "GLACIER".into()
            }]
        );
    }

    #[test]
    fn auto_delete_expires_noncurrent_versions() {
        let config = expand_policy(LifecyclePolicy::AutoDelete, None)
            .unwrap()
            .unwrap()
            .configuration;
        assert_eq!(
            config.rules[0].noncurrent_version_expiration,
            Some(NoncurrentVersionExpiration { noncurrent_days: 90 })
        );
        assert!(config.rules[0].transitions.is_empty());
    }

    #[test]
    fn custom_rules_accept_lowercase_id_alias() {
        let raw = r#"{"Rules":[{"Id":"tidy","Status":"Enabled","Expiration":{"Days":7}}]}"#;
        let config: LifecycleConfiguration = serde_json::from_str(raw).unwrap();
        assert_eq!(config.rules[0].id, "tidy");

        let out = serde_json::to_value(&config).unwrap();
        assert_eq!(out["Rules"][0]["ID"], "tidy");
    }

    #[test]
    fn custom_policy_requires_well_formed_rules() {
        assert!(expand_policy(LifecyclePolicy::Custom, None).is_err());
        assert!(
            expand_policy(LifecyclePolicy::Custom, Some(&LifecycleConfiguration::default()))
                .is_err()
        );

        let no_action = LifecycleConfiguration {
            rules: vec![LifecycleRule {
                id: "empty".into(),
                status: RuleStatus::Enabled,
                filter: RuleFilter::default(),
                transitions: Vec::new(),
                expiration: None,
                noncurrent_version_expiration: None,
            }],
        };
        assert!(expand_policy(LifecyclePolicy::Custom, Some(&no_action)).is_err());
    }

    #[test]
    fn custom_policy_keeps_good_rules_and_reports_bad_ones() {
        let raw = r#"{"Rules":[
            {"ID":"good","Status":"Enabled","Expiration":{"Days":7}},
            {"ID":"bad","Status":"Enabled"}
        ]}"#;
        let config: LifecycleConfiguration = serde_json::from_str(raw).unwrap();

        let expanded = expand_policy(LifecyclePolicy::Custom, Some(&config))
            .unwrap()
            .unwrap();
        assert_eq!(expanded.configuration.rules.len(), 1);
        assert_eq!(expanded.configuration.rules[0].id, "good");
        assert_eq!(expanded.rejected.len(), 1);
        assert!(expanded.rejected[0].contains("`bad`"));
    }

    #[test]
    fn unknown_policy_names_fall_back_to_none() {
        assert_eq!(LifecyclePolicy::parse_lenient("Forever"), LifecyclePolicy::None);
        assert_eq!(
            LifecyclePolicy::parse_lenient("Auto-Archive"),
            LifecyclePolicy::AutoArchive
        );
    }
}
