use log::debug;
use serde::{Deserialize, Serialize};

use crate::{errors::Result, processor::ChunkProcessor};

/// Process-wide engine setup, applied by the host through explicit
/// [EngineConfig::init] / [EngineConfig::teardown] calls rather than read
/// from ambient singletons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// GDAL block cache limit, bytes.
    pub gdal_cache_bytes: Option<usize>,
    /// Worker hint forwarded to GDAL.
    pub gdal_num_threads: Option<u16>,
    /// Workers of the chunk processor; 0 lets the pool decide.
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gdal_cache_bytes: None,
            gdal_num_threads: None,
            worker_threads: 0,
        }
    }
}

impl EngineConfig {
    pub fn init(&self) -> Result<()> {
        if let Some(bytes) = self.gdal_cache_bytes {
            gdal::config::set_config_option("GDAL_CACHEMAX", &bytes.to_string())?;
        }
        if let Some(threads) = self.gdal_num_threads {
            gdal::config::set_config_option("GDAL_NUM_THREADS", &threads.to_string())?;
        }
        debug!("engine configured: {self:?}");
        Ok(())
    }

    pub fn teardown(&self) {
        if self.gdal_cache_bytes.is_some() {
            gdal::config::clear_config_option("GDAL_CACHEMAX").ok();
        }
        if self.gdal_num_threads.is_some() {
            gdal::config::clear_config_option("GDAL_NUM_THREADS").ok();
        }
    }

    pub fn processor(&self) -> ChunkProcessor {
        ChunkProcessor::new(self.worker_threads)
    }
}
