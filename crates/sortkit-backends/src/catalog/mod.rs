//! Built-in sorter catalog.
//!
//! Each module declares one sorter: its parameter table, description,
//! installation message, worker pool compatibility and container image.

pub mod herdingspikes;
pub mod kilosort2;
pub mod klusta;
pub mod mountainsort4;
pub mod spykingcircus;
pub mod tridesclous;

use sortkit_spec::BackendDescriptor;

/// Descriptors of every built-in sorter, sorted by name.
pub fn builtin_descriptors() -> Vec<BackendDescriptor> {
    vec![
        herdingspikes::descriptor(),
        kilosort2::descriptor(),
        klusta::descriptor(),
        mountainsort4::descriptor(),
        spykingcircus::descriptor(),
        tridesclous::descriptor(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_is_sorted_and_unique() {
        let names: Vec<String> = builtin_descriptors()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_schemas_are_well_formed() {
        for descriptor in builtin_descriptors() {
            let schema = descriptor.schema();
            assert!(
                schema.duplicate_names().is_empty(),
                "{} declares a parameter twice",
                descriptor.name()
            );
            for spec in schema.iter() {
                assert!(
                    spec.validate(spec.default_value()).is_ok(),
                    "{}.{} default violates its own constraint",
                    descriptor.name(),
                    spec.name()
                );
                assert!(!spec.description().is_empty());
            }
            assert!(!descriptor.description().is_empty());
            assert!(!descriptor.installation_message().is_empty());
        }
    }
}
