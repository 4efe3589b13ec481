//! Klusta.

use sortkit_spec::{BackendDescriptor, ParamSchema, ParamSpec, PoolCompatibility};
use std::sync::Arc;

use crate::external::{ExternalSorter, ExternalSorterConfig};

pub const NAME: &str = "klusta";

pub const DESCRIPTION: &str = "Klusta is a density-based spike sorter that uses a masked EM \
approach for clustering. For more information see https://doi.org/10.1038/nn.4268";

pub const INSTALLATION: &str = "To use Klusta install the klusta packages and the \
sortkit-klusta bridge executable:

    pip install Cython h5py tqdm
    pip install click klusta klustakwik2

More information on klusta at:
  * https://github.com/kwikteam/phy
  * https://github.com/kwikteam/klusta";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::optional_float("adjacency_radius", None, "Radius in um to build channel neighborhood"),
        ParamSpec::float("threshold_strong_std_factor", 5.0, "Strong threshold for spike detection"),
        ParamSpec::float("threshold_weak_std_factor", 2.0, "Weak threshold for spike detection"),
        ParamSpec::int("detect_sign", -1, "Use -1 (negative), 1 (positive) or 0 (both) depending on the sign of the spikes")
            .one_of_ints(&[-1, 0, 1]),
        ParamSpec::int("extract_s_before", 16, "Number of samples to cut out before the peak"),
        ParamSpec::int("extract_s_after", 32, "Number of samples to cut out after the peak"),
        ParamSpec::int("n_features_per_channel", 3, "Number of PCA features per channel"),
        ParamSpec::int("pca_n_waveforms_max", 10000, "Maximum number of waveforms for PCA"),
        ParamSpec::int("num_starting_clusters", 50, "Number of initial clusters"),
    ])
}

/// Klusta has no container image.
pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor::builder(
        NAME,
        Arc::new(ExternalSorter::new(ExternalSorterConfig::new(NAME))),
    )
    .description(DESCRIPTION)
    .installation_message(INSTALLATION)
    .schema(schema())
    .compatibility(PoolCompatibility::processes_only())
    .build()
}
