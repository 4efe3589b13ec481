//! SpyKING CIRCUS.

use sortkit_spec::{BackendDescriptor, ParamSchema, ParamSpec, PoolCompatibility};
use std::sync::Arc;

use crate::external::{ExternalSorter, ExternalSorterConfig};

pub const NAME: &str = "spykingcircus";

pub const IMAGE: &str = "sortkit/spykingcircus:0.1.0";

pub const DESCRIPTION: &str = "SpyKING CIRCUS is a density-based clustering and template-matching \
spike sorter for large extracellular recordings. For more information see \
https://doi.org/10.7554/eLife.34518";

pub const INSTALLATION: &str = "To use SpyKING CIRCUS install the spyking-circus package and the \
sortkit-spykingcircus bridge executable:

    pip install spyking-circus

More information on SpyKING CIRCUS at:
  * https://spyking-circus.readthedocs.io";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::int("detect_sign", -1, "Use -1 (negative), 1 (positive) or 0 (both) depending on the sign of the spikes")
            .one_of_ints(&[-1, 0, 1]),
        ParamSpec::float("adjacency_radius", 100.0, "Radius in um to build channel neighborhood"),
        ParamSpec::float("detect_threshold", 6.0, "Threshold for spike detection in MAD units"),
        ParamSpec::float("template_width_ms", 3.0, "Template width in ms"),
        ParamSpec::bool("filter", true, "Enable or disable filter"),
        ParamSpec::bool("merge_spikes", true, "Enable or disable automatic merging"),
        ParamSpec::float("auto_merge", 0.75, "Automatic merging threshold").range(0.0, 1.0),
        ParamSpec::optional_int("num_workers", None, "Number of workers (if null, all cores are used)"),
        ParamSpec::int("whitening_max_elts", 1000, "Max number of events per electrode for whitening"),
        ParamSpec::int("clustering_max_elts", 10000, "Max number of events per electrode for clustering"),
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
