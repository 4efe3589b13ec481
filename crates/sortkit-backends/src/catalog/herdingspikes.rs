//! Herding Spikes 2.

use sortkit_spec::{BackendDescriptor, ParamSchema, ParamSpec, PoolCompatibility};
use std::sync::Arc;

use crate::external::{ExternalSorter, ExternalSorterConfig};

pub const NAME: &str = "herdingspikes";

pub const IMAGE: &str = "sortkit/herdingspikes:0.1.0";

pub const DESCRIPTION: &str = "Herding Spikes is a sorter designed for high-density arrays. It \
localizes events in space and clusters them with mean shift. For more information see \
https://doi.org/10.1016/j.jneumeth.2016.06.006";

pub const INSTALLATION: &str = "To use HerdingSpikes install the herdingspikes package and the \
sortkit-herdingspikes bridge executable:

    pip install herdingspikes

More information on HerdingSpikes at:
  * https://github.com/mhhennig/hs2";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::float("clustering_bandwidth", 5.5, "Mean shift bandwidth"),
        ParamSpec::float("clustering_alpha", 5.5, "Scalar for the waveform PC features when clustering"),
        ParamSpec::int("clustering_n_jobs", -1, "Number of cores to use for clustering (-1 for all)"),
        ParamSpec::bool("clustering_bin_seeding", true, "Enable clustering bin seeding"),
        ParamSpec::int("clustering_min_bin_freq", 16, "Minimum spikes per bin for bin seeding"),
        ParamSpec::float("left_cutout_time", 0.3, "Cutout size before peak in ms"),
        ParamSpec::float("right_cutout_time", 1.8, "Cutout size after peak in ms"),
        ParamSpec::float("detect_threshold", 20.0, "Detection threshold"),
        ParamSpec::int_list("probe_masked_channels", &[], "Masked channels"),
        ParamSpec::int("pca_ncomponents", 2, "Number of principal components to use when clustering").range(1.0, 16.0),
        ParamSpec::bool("pca_whiten", true, "If true, whiten data for PCA"),
        ParamSpec::float("freq_min", 300.0, "High-pass filter cutoff frequency"),
        ParamSpec::float("freq_max", 6000.0, "Low-pass filter cutoff frequency"),
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
