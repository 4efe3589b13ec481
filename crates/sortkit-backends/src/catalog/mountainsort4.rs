//! Mountainsort4.

use sortkit_spec::{BackendDescriptor, ParamSchema, ParamSpec, PoolCompatibility};
use std::sync::Arc;

use crate::external::{ExternalSorter, ExternalSorterConfig};

pub const NAME: &str = "mountainsort4";

pub const IMAGE: &str = "sortkit/mountainsort4:0.1.0";

pub const DESCRIPTION: &str = "Mountainsort4 is a fully automatic density-based spike sorter using \
the isosplit clustering method and automatic curation procedures. For more information see \
https://doi.org/10.1016/j.neuron.2017.08.030";

pub const INSTALLATION: &str = "To use Mountainsort4 install the ml_ms4alg package and the \
sortkit-mountainsort4 bridge executable:

    pip install ml_ms4alg

More information on mountainsort at:
  * https://github.com/flatironinstitute/mountainsort";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::int(
            "detect_sign",
            -1,
            "Use -1 (negative) or 1 (positive) depending on the sign of the spikes in the recording",
        )
        .one_of_ints(&[-1, 0, 1]),
        ParamSpec::float(
            "adjacency_radius",
            -1.0,
            "Radius in um to build channel neighborhood (use -1 to include all channels in every neighborhood)",
        ),
        ParamSpec::optional_float("freq_min", Some(300.0), "High-pass filter cutoff frequency"),
        ParamSpec::optional_float("freq_max", Some(6000.0), "Low-pass filter cutoff frequency"),
        ParamSpec::bool("filter", true, "Enable or disable filter"),
        ParamSpec::bool("whiten", true, "Enable or disable whitening"),
        ParamSpec::bool("curation", false, "Enable or disable curation"),
        ParamSpec::optional_int(
            "num_workers",
            None,
            "Number of workers (if null, half of the cpu number is used)",
        ),
        ParamSpec::int("clip_size", 50, "Number of samples per waveform").range(1.0, 10_000.0),
        ParamSpec::float("detect_threshold", 3.0, "Threshold for spike detection").range(0.0, 1000.0),
        ParamSpec::int(
            "detect_interval",
            10,
            "Minimum number of timepoints between events detected on the same channel",
        )
        .range(0.0, 1_000_000.0),
        ParamSpec::optional_float(
            "noise_overlap_threshold",
            Some(0.15),
            "Noise overlap threshold for automatic curation",
        ),
        ParamSpec::int("add_end_clip", 0, "Number of samples added at the end of each clip"),
        ParamSpec::float("freq_width", 1000.0, "Width of the filter roll-off in Hz"),
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
