//! Specification validation and companion eligibility
//!
//! Everything here is pure: it runs before any write and has no side effects.

use std::collections::HashSet;

use super::models::{EquipmentType, GaugeSpec, ThreadSpec};
use crate::config::PairingConfig;
use crate::core_types::CategoryId;
use crate::error::GaugeError;

/// Rules deciding which gauges may never have a companion
#[derive(Debug, Clone)]
pub struct CompanionPolicy {
    excluded_categories: HashSet<CategoryId>,
    /// Upper-cased
    excluded_thread_types: HashSet<String>,
}

impl CompanionPolicy {
    pub fn new(
        excluded_categories: impl IntoIterator<Item = CategoryId>,
        excluded_thread_types: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            excluded_categories: excluded_categories.into_iter().collect(),
            excluded_thread_types: excluded_thread_types
                .into_iter()
                .map(|t| normalize(&t).to_uppercase())
                .collect(),
        }
    }

    pub fn from_config(config: &PairingConfig) -> Self {
        Self::new(
            config.excluded_category_ids.iter().copied(),
            config.excluded_thread_types.iter().cloned(),
        )
    }

    /// `CompanionExcluded` if this spec can never be paired
    pub fn ensure_pairable(&self, spec: &GaugeSpec) -> Result<(), GaugeError> {
        if self.excluded_categories.contains(&spec.category_id) {
            return Err(GaugeError::CompanionExcluded(spec.category_id));
        }
        if let Some(thread) = &spec.thread {
            if self
                .excluded_thread_types
                .contains(&normalize(&thread.thread_type).to_uppercase())
            {
                return Err(GaugeError::CompanionExcluded(spec.category_id));
            }
        }
        Ok(())
    }
}

impl Default for CompanionPolicy {
    fn default() -> Self {
        Self::from_config(&PairingConfig::default())
    }
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn same_field(a: &str, b: &str) -> bool {
    normalize(a).eq_ignore_ascii_case(&normalize(b))
}

/// Required-field check for a single spec
pub fn validate_spec(spec: &GaugeSpec) -> Result<(), GaugeError> {
    match (spec.equipment_type, &spec.thread) {
        (EquipmentType::ThreadGauge, None) => Err(GaugeError::MissingField("thread")),
        (EquipmentType::ThreadGauge, Some(thread)) => validate_thread(thread),
        (_, Some(_)) => Err(GaugeError::InvalidInput(format!(
            "{} does not take a thread specification",
            spec.equipment_type
        ))),
        (_, None) => Ok(()),
    }
}

fn validate_thread(thread: &ThreadSpec) -> Result<(), GaugeError> {
    if thread.size.trim().is_empty() {
        return Err(GaugeError::MissingField("thread_size"));
    }
    if thread.class.trim().is_empty() {
        return Err(GaugeError::MissingField("thread_class"));
    }
    if thread.thread_type.trim().is_empty() {
        return Err(GaugeError::MissingField("thread_type"));
    }
    if thread.form.trim().is_empty() {
        return Err(GaugeError::MissingField("thread_form"));
    }
    Ok(())
}

/// Two specs may form a companion pair
///
/// Same equipment type and category; thread gauges additionally match on
/// size, class, type and form (whitespace and case insensitive).
pub fn ensure_companion_specs_match(a: &GaugeSpec, b: &GaugeSpec) -> Result<(), GaugeError> {
    if a.equipment_type != b.equipment_type {
        return Err(GaugeError::SpecMismatch(format!(
            "equipment type {} vs {}",
            a.equipment_type, b.equipment_type
        )));
    }
    if a.category_id != b.category_id {
        return Err(GaugeError::SpecMismatch(format!(
            "category {} vs {}",
            a.category_id, b.category_id
        )));
    }
    if a.equipment_type != EquipmentType::ThreadGauge {
        return Ok(());
    }

    let (ta, tb) = match (&a.thread, &b.thread) {
        (Some(ta), Some(tb)) => (ta, tb),
        _ => return Err(GaugeError::MissingField("thread")),
    };

    let fields = [
        ("size", &ta.size, &tb.size),
        ("class", &ta.class, &tb.class),
        ("type", &ta.thread_type, &tb.thread_type),
        ("form", &ta.form, &tb.form),
    ];
    for (name, x, y) in fields {
        if !same_field(x, y) {
            return Err(GaugeError::SpecMismatch(format!(
                "thread {} '{}' vs '{}'",
                name, x, y
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(size: &str, class: &str, thread_type: &str) -> GaugeSpec {
        GaugeSpec::thread_gauge(10, ThreadSpec::new(size, class, thread_type, "plug"))
    }

    #[test]
    fn test_matching_thread_specs() {
        let go = thread("1/4-20", "2B", "UNC");
        let nogo = thread(" 1/4-20 ", "2b", "unc");
        assert!(ensure_companion_specs_match(&go, &nogo).is_ok());
    }

    #[test]
    fn test_thread_mismatch_names_field() {
        let go = thread("1/4-20", "2B", "UNC");
        let nogo = thread("1/4-28", "2B", "UNC");
        let err = ensure_companion_specs_match(&go, &nogo).unwrap_err();
        assert!(matches!(err, GaugeError::SpecMismatch(ref m) if m.contains("size")));
    }

    #[test]
    fn test_category_mismatch() {
        let go = thread("M6x1", "6H", "M");
        let mut nogo = go.clone();
        nogo.category_id = 11;
        assert!(matches!(
            ensure_companion_specs_match(&go, &nogo),
            Err(GaugeError::SpecMismatch(_))
        ));
    }

    #[test]
    fn test_equipment_type_mismatch() {
        let a = GaugeSpec::other(EquipmentType::HandTool, 3);
        let b = GaugeSpec::other(EquipmentType::LargeEquipment, 3);
        assert!(ensure_companion_specs_match(&a, &b).is_err());
    }

    #[test]
    fn test_non_thread_specs_only_need_category() {
        let a = GaugeSpec::other(EquipmentType::HandTool, 3);
        let b = GaugeSpec::other(EquipmentType::HandTool, 3);
        assert!(ensure_companion_specs_match(&a, &b).is_ok());
    }

    #[test]
    fn test_validate_spec_required_fields() {
        let missing = GaugeSpec {
            thread: None,
            ..thread("1/4-20", "2B", "UNC")
        };
        assert!(matches!(
            validate_spec(&missing),
            Err(GaugeError::MissingField("thread"))
        ));

        let blank_class = thread("1/4-20", "  ", "UNC");
        assert!(matches!(
            validate_spec(&blank_class),
            Err(GaugeError::MissingField("thread_class"))
        ));

        let mut tool = GaugeSpec::other(EquipmentType::HandTool, 3);
        assert!(validate_spec(&tool).is_ok());
        tool.thread = Some(ThreadSpec::new("a", "b", "c", "d"));
        assert!(matches!(
            validate_spec(&tool),
            Err(GaugeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_npt_is_always_excluded() {
        let policy = CompanionPolicy::default();
        for thread_type in ["NPT", "npt", " Npt "] {
            let spec = thread("1/8-27", "2", thread_type);
            assert!(matches!(
                policy.ensure_pairable(&spec),
                Err(GaugeError::CompanionExcluded(10))
            ));
        }
        assert!(policy.ensure_pairable(&thread("1/4-20", "2B", "UNC")).is_ok());
    }

    #[test]
    fn test_excluded_category() {
        let policy = CompanionPolicy::new([42], Vec::<String>::new());
        let spec = GaugeSpec::other(EquipmentType::HandTool, 42);
        assert!(matches!(
            policy.ensure_pairable(&spec),
            Err(GaugeError::CompanionExcluded(42))
        ));
        assert!(policy.ensure_pairable(&GaugeSpec::other(EquipmentType::HandTool, 41)).is_ok());
    }
}
