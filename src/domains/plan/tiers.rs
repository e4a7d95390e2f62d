//! Tier table (spec §4.C). Configured data, not hard-coded in call
//! sites — `TierTable::default()` mirrors the default table from the
//! spec; a deployment may override it (e.g. loaded from config/DB).

use std::collections::HashMap;

use crate::domains::tenant::SubscriptionPlan;

/// `-1` means unlimited, `0` means forbidden, any other value is the
/// monthly cap for that content kind.
pub type Limits = HashMap<&'static str, i64>;

#[derive(Debug, Clone)]
pub struct TierConfig {
    pub model_name: &'static str,
    pub limits: Limits,
    pub content_types_enabled: Vec<&'static str>,
    pub max_parallel_tasks: usize,
    pub features: Vec<&'static str>,
    pub retention_days: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: HashMap<SubscriptionPlan, TierConfig>,
}

fn limits(pairs: &[(&'static str, i64)]) -> Limits {
    pairs.iter().copied().collect()
}

impl Default for TierTable {
    fn default() -> Self {
        let mut tiers = HashMap::new();

        tiers.insert(
            SubscriptionPlan::Free,
            TierConfig {
                model_name: "gpt-4o-mini",
                limits: limits(&[
                    ("blog", 10),
                    ("social", 10),
                    ("audio", 0),
                    ("video", 0),
                    ("voiceover_audio", 0),
                    ("final_video", 0),
                ]),
                content_types_enabled: vec!["blog", "social"],
                max_parallel_tasks: 1,
                features: vec![],
                retention_days: Some(30),
            },
        );

        tiers.insert(
            SubscriptionPlan::Basic,
            TierConfig {
                model_name: "gpt-4o-mini",
                limits: limits(&[
                    ("blog", 50),
                    ("social", 50),
                    ("audio", 10),
                    ("video", 0),
                    ("voiceover_audio", 10),
                    ("final_video", 0),
                ]),
                content_types_enabled: vec!["blog", "social", "audio"],
                max_parallel_tasks: 2,
                features: vec![],
                retention_days: Some(90),
            },
        );

        tiers.insert(
            SubscriptionPlan::Pro,
            TierConfig {
                model_name: "gpt-4o",
                limits: limits(&[
                    ("blog", 200),
                    ("social", 200),
                    ("audio", 200),
                    ("video", 20),
                    ("voiceover_audio", 100),
                    ("final_video", 20),
                ]),
                content_types_enabled: vec!["blog", "social", "audio", "video"],
                max_parallel_tasks: 4,
                features: vec!["priority_support"],
                retention_days: Some(365),
            },
        );

        tiers.insert(
            SubscriptionPlan::Enterprise,
            TierConfig {
                model_name: "gpt-4o",
                limits: limits(&[
                    ("blog", -1),
                    ("social", -1),
                    ("audio", -1),
                    ("video", -1),
                    ("voiceover_audio", -1),
                    ("final_video", -1),
                ]),
                content_types_enabled: vec!["blog", "social", "audio", "video"],
                max_parallel_tasks: 8,
                features: vec!["priority_support", "sso", "dedicated_support"],
                retention_days: None,
            },
        );

        Self { tiers }
    }
}

impl TierTable {
    pub fn get(&self, plan: SubscriptionPlan) -> &TierConfig {
        self.tiers
            .get(&plan)
            .expect("all SubscriptionPlan variants have a tier entry")
    }
}
