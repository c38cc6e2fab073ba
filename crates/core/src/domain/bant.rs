use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::flows::states::SpinPhase;

/// Canonical BANT keys read by the typed stage-data parser.
pub mod keys {
    pub const PAIN_POINT: &str = "pain_point";
    pub const URGENCY: &str = "urgency";
    pub const CURRENT_SOLUTION: &str = "current_solution";
    pub const BUDGET: &str = "budget";
    pub const AUTHORITY: &str = "authority";
    pub const NEED: &str = "need";
    pub const TIMELINE: &str = "timeline";
}

/// Configured data point the conversation should collect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BantFieldDescriptor {
    pub key: String,
    pub label: String,
    pub weight: u32,
    pub source_phase: SpinPhase,
}

impl BantFieldDescriptor {
    pub fn new(key: &str, label: &str, weight: u32, source_phase: SpinPhase) -> Self {
        Self { key: key.to_string(), label: label.to_string(), weight, source_phase }
    }
}

pub fn default_bant_fields() -> Vec<BantFieldDescriptor> {
    vec![
        BantFieldDescriptor::new(keys::PAIN_POINT, "Main pain point", 20, SpinPhase::Situation),
        BantFieldDescriptor::new(keys::CURRENT_SOLUTION, "Current solution", 5, SpinPhase::Situation),
        BantFieldDescriptor::new(keys::URGENCY, "Urgency of the problem", 10, SpinPhase::Situation),
        BantFieldDescriptor::new(keys::BUDGET, "Budget", 25, SpinPhase::Problem),
        BantFieldDescriptor::new(keys::AUTHORITY, "Decision authority", 20, SpinPhase::Implication),
        BantFieldDescriptor::new(keys::NEED, "Need and fit", 10, SpinPhase::NeedPayoff),
        BantFieldDescriptor::new(keys::TIMELINE, "Purchase timeline", 10, SpinPhase::Closing),
    ]
}

/// Collected BANT answers keyed by field key. Only non-empty values are ever stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BantValues(BTreeMap<String, String>);

impl BantValues {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Stores a value when it is non-blank; returns whether anything changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || is_null_marker(value) {
            return false;
        }
        if self.get(key) == Some(value) {
            return false;
        }
        self.0.insert(key.to_string(), value.to_string());
        true
    }

    /// Merges extracted values. Null or blank values never overwrite collected data.
    pub fn merge<'a, I>(&mut self, extracted: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a String, &'a Option<String>)>,
    {
        let mut updated = Vec::new();
        for (key, value) in extracted {
            if let Some(value) = value {
                if self.set(key, value) {
                    updated.push(key.clone());
                }
            }
        }
        updated
    }

    /// Fills only keys that have not been collected yet.
    pub fn fill_missing<'a, I>(&mut self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filled = Vec::new();
        for (key, value) in candidates {
            if !self.contains(key) && self.set(key, value) {
                filled.push(key.to_string());
            }
        }
        filled
    }
}

fn is_null_marker(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "null" | "n/a" | "unknown")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BantFieldStatus {
    pub key: String,
    pub label: String,
    pub weight: u32,
    pub source_phase: SpinPhase,
    pub value: Option<String>,
}

impl BantFieldStatus {
    pub fn collected(&self) -> bool {
        self.value.is_some()
    }
}

/// Point-in-time view of BANT collection used by prompts and turn outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BantSnapshot {
    pub fields: Vec<BantFieldStatus>,
    pub collected_weight: u32,
    pub total_weight: u32,
}

impl BantSnapshot {
    pub fn build(descriptors: &[BantFieldDescriptor], values: &BantValues) -> Self {
        let fields = descriptors
            .iter()
            .map(|descriptor| BantFieldStatus {
                key: descriptor.key.clone(),
                label: descriptor.label.clone(),
                weight: descriptor.weight,
                source_phase: descriptor.source_phase,
                value: values.get(&descriptor.key).map(str::to_string),
            })
            .collect::<Vec<_>>();
        let total_weight = fields.iter().map(|field| field.weight).sum();
        let collected_weight =
            fields.iter().filter(|field| field.collected()).map(|field| field.weight).sum();

        Self { fields, collected_weight, total_weight }
    }

    pub fn missing_for_phase(&self, phase: SpinPhase) -> Vec<&BantFieldStatus> {
        self.fields
            .iter()
            .filter(|field| field.source_phase == phase && !field.collected())
            .collect()
    }

    /// First uncollected field, preferring the given phase, then later phases, then earlier ones.
    pub fn next_missing(&self, phase: SpinPhase) -> Option<&BantFieldStatus> {
        let missing = self.fields.iter().filter(|field| !field.collected());
        missing
            .clone()
            .find(|field| field.source_phase == phase)
            .or_else(|| missing.clone().find(|field| field.source_phase > phase))
            .or_else(|| missing.clone().next())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{default_bant_fields, keys, BantSnapshot, BantValues};
    use crate::flows::states::SpinPhase;

    #[test]
    fn merge_ignores_null_and_blank_values() {
        let mut values = BantValues::default();
        values.set(keys::BUDGET, "around 20k");

        let mut extracted = BTreeMap::new();
        extracted.insert(keys::BUDGET.to_string(), None);
        extracted.insert(keys::PAIN_POINT.to_string(), Some("   ".to_string()));
        extracted.insert(keys::NEED.to_string(), Some("null".to_string()));
        extracted.insert(keys::TIMELINE.to_string(), Some("next quarter".to_string()));

        let updated = values.merge(&extracted);

        assert_eq!(updated, vec![keys::TIMELINE.to_string()]);
        assert_eq!(values.get(keys::BUDGET), Some("around 20k"));
        assert!(!values.contains(keys::PAIN_POINT));
        assert!(!values.contains(keys::NEED));
    }

    #[test]
    fn fill_missing_never_overwrites() {
        let mut values = BantValues::default();
        values.set(keys::BUDGET, "approved 50k");

        let filled = values.fill_missing([(keys::BUDGET, "no budget"), (keys::URGENCY, "critical")]);

        assert_eq!(filled, vec![keys::URGENCY.to_string()]);
        assert_eq!(values.get(keys::BUDGET), Some("approved 50k"));
    }

    #[test]
    fn snapshot_sums_weights() {
        let mut values = BantValues::default();
        values.set(keys::PAIN_POINT, "manual reporting");
        values.set(keys::BUDGET, "confirmed");

        let snapshot = BantSnapshot::build(&default_bant_fields(), &values);

        assert_eq!(snapshot.total_weight, 100);
        assert_eq!(snapshot.collected_weight, 45);
        assert_eq!(
            snapshot.next_missing(SpinPhase::Situation).map(|field| field.key.as_str()),
            Some(keys::CURRENT_SOLUTION)
        );
        assert_eq!(
            snapshot.next_missing(SpinPhase::Implication).map(|field| field.key.as_str()),
            Some(keys::AUTHORITY)
        );
    }
}
