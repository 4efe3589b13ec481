//! Tridesclous.

use sortkit_spec::{BackendDescriptor, ParamSchema, ParamSpec, PoolCompatibility};
use std::sync::Arc;

use crate::external::{ExternalSorter, ExternalSorterConfig};

pub const NAME: &str = "tridesclous";

pub const IMAGE: &str = "sortkit/tridesclous:0.1.0";

pub const DESCRIPTION: &str = "Tridesclous is a template-matching spike sorter with a real-time \
engine. For more information see https://tridesclous.readthedocs.io";

pub const INSTALLATION: &str = "To use Tridesclous install the tridesclous package and the \
sortkit-tridesclous bridge executable:

    pip install tridesclous

More information on tridesclous at:
  * https://github.com/tridesclous/tridesclous";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::float("freq_min", 400.0, "High-pass filter cutoff frequency"),
        ParamSpec::float("freq_max", 5000.0, "Low-pass filter cutoff frequency"),
        ParamSpec::int("detect_sign", -1, "Use -1 (negative) or 1 (positive) depending on the sign of the spikes")
            .one_of_ints(&[-1, 1]),
        ParamSpec::float("detect_threshold", 5.0, "Threshold for spike detection in MAD units"),
        ParamSpec::bool("common_ref_removal", false, "Remove the median across channels before detection"),
        ParamSpec::bool("filter", true, "Enable or disable filter"),
    ])
}

pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor::builder(
        NAME,
        Arc::new(ExternalSorter::new(ExternalSorterConfig::new(NAME))),
    )
    .description(DESCRIPTION)
    .installation_message(INSTALLATION)
    .schema(schema())
    .compatibility(PoolCompatibility::processes_only())
    .container_image(IMAGE)
    .build()
}
