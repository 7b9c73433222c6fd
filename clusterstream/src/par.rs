//! Per-tile parallel driving.
//!
//! The stream itself is single-threaded; what parallelizes is tiles. One
//! provider per tile shares nothing with its siblings, so a pool can run
//! them independently and the factory stays immutable throughout.

use log::debug;
use rayon::prelude::*;

use crate::provider::{DataProvider, ProviderFactory};
use crate::StreamError;

/// Build one provider per lane tile and hand each to `op` on a dedicated
/// pool. The first error wins; remaining tiles finish or are skipped by
/// rayon's scheduling.
pub fn for_each_tile<F>(
    factory: &ProviderFactory,
    num_threads: usize,
    op: F,
) -> Result<(), StreamError>
where
    F: Fn(u32, DataProvider) -> Result<(), StreamError> + Send + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("clusterstream-tile-{i}"))
        .build()
        .map_err(|e| StreamError::ConfigError(e.to_string()))?;

    let result = pool.install(|| {
        factory
            .tiles()
            .par_iter()
            .map(|&tile| {
                let provider = factory.make_provider_for_tiles(&[tile])?;
                op(tile, provider)
            })
            .collect::<Result<(), StreamError>>()
    });
    debug!("finished driving {} tiles", factory.tiles().len());
    result
}
