use lambdahouse_core::{ConfigTree, Result};

pub const DEFAULT_UNCOMPRESSED_CACHE_SIZE: u64 = 256 * 1024 * 1024;
pub const DEFAULT_MARK_CACHE_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_MMAP_CACHE_SIZE: u64 = 256 * 1024 * 1024;
pub const DEFAULT_CACHE_SIZE_TO_RAM_MAX_RATIO: f64 = 0.5;

/// Byte budgets of the process-wide caches after clamping to physical memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSizes {
    pub uncompressed: u64,
    pub mark: u64,
    pub index_uncompressed: u64,
    pub index_mark: u64,
    pub mmap: u64,
    pub ratio: f64,
}

impl CacheSizes {
    pub fn from_config(config: &ConfigTree, physical_memory: u64) -> Result<Self> {
        let ratio = config.get_f64("cache_size_to_ram_max_ratio", DEFAULT_CACHE_SIZE_TO_RAM_MAX_RATIO)?;
        let limit = (physical_memory as f64 * ratio) as u64;

        let sized = |key: &str, default: u64| -> Result<u64> {
            let requested = config.get_u64(key, default)?;
            if requested > limit {
                tracing::info!(
                    "Lowered {key} from {requested} to {limit} because the system has limited RAM"
                );
                return Ok(limit);
            }
            Ok(requested)
        };

        let sizes = Self {
            uncompressed: sized("uncompressed_cache_size", DEFAULT_UNCOMPRESSED_CACHE_SIZE)?,
            mark: sized("mark_cache_size", DEFAULT_MARK_CACHE_SIZE)?,
            index_uncompressed: sized("index_uncompressed_cache_size", 0)?,
            index_mark: sized("index_mark_cache_size", 0)?,
            mmap: sized("mmap_cache_size", DEFAULT_MMAP_CACHE_SIZE)?,
            ratio,
        };
        if sizes.mark == 0 {
            tracing::error!("Too low mark cache size will lead to severe performance degradation.");
        }
        Ok(sizes)
    }

    /// SQLite page cache budget in KiB: data pages plus index pages.
    pub fn page_cache_kib(&self) -> u64 {
        (self.uncompressed + self.index_uncompressed) / 1024
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("uncompressed_cache_size", self.uncompressed.to_string()),
            ("mark_cache_size", self.mark.to_string()),
            ("index_uncompressed_cache_size", self.index_uncompressed.to_string()),
            ("index_mark_cache_size", self.index_mark.to_string()),
            ("mmap_cache_size", self.mmap.to_string()),
            ("cache_size_to_ram_max_ratio", self.ratio.to_string()),
        ]
    }
}

/// Memory available to this process: the Lambda function size when set,
/// otherwise the host total.
pub fn physical_memory() -> u64 {
    let from_lambda = std::env::var("AWS_LAMBDA_FUNCTION_MEMORY_SIZE")
        .ok()
        .and_then(|mb| mb.trim().parse::<u64>().ok());
    lambda_memory(from_lambda).unwrap_or_else(|| {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        system.total_memory()
    })
}

fn lambda_memory(megabytes: Option<u64>) -> Option<u64> {
    megabytes.filter(|mb| *mb > 0).map(|mb| mb * 1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn clamps_to_the_ram_ratio() {
        let mut config = ConfigTree::new();
        config.set("uncompressed_cache_size", (8 * GIB).to_string());
        config.set("mark_cache_size", "1024");
        let sizes = CacheSizes::from_config(&config, 2 * GIB).unwrap();
        assert_eq!(sizes.uncompressed, GIB);
        assert_eq!(sizes.mark, 1024);
        assert_eq!(sizes.mmap, DEFAULT_MMAP_CACHE_SIZE);
    }

    #[test]
    fn honours_a_custom_ratio() {
        let mut config = ConfigTree::new();
        config.set("cache_size_to_ram_max_ratio", "0.1");
        let sizes = CacheSizes::from_config(&config, GIB).unwrap();
        let limit = (GIB as f64 * 0.1) as u64;
        assert_eq!(sizes.uncompressed, limit);
        assert_eq!(sizes.page_cache_kib(), limit / 1024);
    }

    #[test]
    fn lambda_memory_is_in_megabytes() {
        assert_eq!(lambda_memory(Some(512)), Some(512 * 1024 * 1024));
        assert_eq!(lambda_memory(Some(0)), None);
        assert_eq!(lambda_memory(None), None);
    }
}
