//! Kilosort2.

use sortkit_spec::{BackendDescriptor, ParamSchema, ParamSpec, PoolCompatibility};
use std::sync::Arc;

use crate::external::{ExternalSorter, ExternalSorterConfig};

pub const NAME: &str = "kilosort2";

pub const IMAGE: &str = "sortkit/kilosort2:0.1.0";

pub const DESCRIPTION: &str = "Kilosort2 is a GPU-accelerated template-matching spike sorter that \
tracks drift over the recording. For more information see https://github.com/MouseLand/Kilosort2";

pub const INSTALLATION: &str = "To use Kilosort2 install MATLAB with the Kilosort2 sources and the \
sortkit-kilosort2 bridge executable, then point SORTKIT_KILOSORT2_PATH at the bridge.

More information on Kilosort2 at:
  * https://github.com/MouseLand/Kilosort2";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::float("detect_threshold", 6.0, "Threshold for spike detection"),
        ParamSpec::float_list("projection_threshold", &[10.0, 4.0], "Threshold on projections"),
        ParamSpec::float("preclust_threshold", 8.0, "Threshold crossings for pre-clustering"),
        ParamSpec::bool("car", true, "Enable or disable common reference"),
        ParamSpec::float("minFR", 0.1, "Minimum spike rate in Hz; units below are dropped"),
        ParamSpec::float("minfr_goodchannels", 0.1, "Minimum firing rate on a good channel"),
        ParamSpec::float("freq_min", 150.0, "High-pass filter cutoff frequency"),
        ParamSpec::float("sigmaMask", 30.0, "Spatial constant in um for computing residual variance of spikes"),
        ParamSpec::int("nPCs", 3, "Number of PCA dimensions").range(1.0, 32.0),
        ParamSpec::int("ntbuff", 64, "Samples of symmetrical buffer for whitening and spike detection"),
        ParamSpec::optional_int("NT", None, "Batch size in samples (if null it is computed)"),
        ParamSpec::bool("keep_good_only", false, "If true only 'good' units are returned"),
    ])
}

pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor::builder(
        NAME,
        Arc::new(
            ExternalSorter::new(ExternalSorterConfig::new(NAME).warn_prefiltered(false)),
        ),
    )
    .description(DESCRIPTION)
    .installation_message(INSTALLATION)
    .schema(schema())
    .compatibility(PoolCompatibility {
        threads: false,
        tokio: false,
        processes: false,
    })
    .container_image(IMAGE)
    .build()
}
