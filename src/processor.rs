use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::{
    buffer::ChunkBuffer,
    components::{cube::Cube, view::ChunkId},
    errors::{CubeError, Result},
};

/// Drives chunk evaluation of a sink cube over a worker pool.
///
/// Chunks are read in parallel, single-threaded within one `read_chunk`
/// call, and handed to the sink callback as they complete; no cross-chunk
/// ordering is guaranteed. The first error cancels at chunk boundaries.
pub struct ChunkProcessor {
    threads: usize,
}

impl ChunkProcessor {
    /// `threads == 0` lets the pool pick the number of workers.
    pub fn new(threads: usize) -> Self {
        Self { threads }
    }

    pub fn apply<F>(&self, cube: &Arc<dyn Cube>, sink: F) -> Result<()>
    where
        F: Fn(ChunkId, ChunkBuffer) -> Result<()> + Send + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| CubeError::WorkerPool(e.to_string()))?;
        debug!(
            "processing {} chunks on {} workers",
            cube.count_chunks(),
            pool.current_num_threads()
        );
        pool.install(|| {
            (0..cube.count_chunks())
                .into_par_iter()
                .try_for_each(|id| sink(id, cube.read_chunk(id)?))
        })
    }
}
