//! Centralized configuration and builder for fssnap.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - SnapConfig::from_env() reads FSSNAP_* variables; builder-style overrides on top.
//!
//! Capacity policy (per backup category):
//! - capacity_bytes = None → growable buffers sized to the captured content (default).
//! - capacity_bytes = Some(n), capacity_strict = false → stop at n bytes and flag the
//!   category as truncated in the summary (legacy one-page behaviour with n = 4096).
//! - capacity_bytes = Some(n), capacity_strict = true → CapacityExceeded error.
//!
//! A bounded capacity is rounded down to whole blocks and never below one block.

use std::fmt;

use crate::consts::{BSIZE, MIRROR_BLOCKS, MIRROR_START, PAGE_SIZE, ROOTDEV};

/// How a bounded buffer reacts when content does not fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Grow to fit.
    Unbounded,
    /// Stop at `bytes` and record truncation.
    Truncate { bytes: usize },
    /// Fail with CapacityExceeded.
    Strict { bytes: usize },
}

impl CapacityPolicy {
    /// Byte limit for the allocator (None = growable).
    pub fn limit(&self) -> Option<usize> {
        match *self {
            CapacityPolicy::Unbounded => None,
            CapacityPolicy::Truncate { bytes } | CapacityPolicy::Strict { bytes } => Some(bytes),
        }
    }

    /// Max number of whole blocks a buffer may hold (None = unbounded).
    pub fn max_blocks(&self) -> Option<usize> {
        self.limit().map(|b| b / BSIZE)
    }
}

/// Top-level configuration for the snapshot engine and the CLI.
#[derive(Clone, Debug)]
pub struct SnapConfig {
    /// Per-category capacity in bytes (None = growable).
    /// Env: FSSNAP_CAPACITY_BYTES = <n> | page  (default unset)
    pub capacity_bytes: Option<usize>,

    /// Turn capacity overflow into an error instead of truncation.
    /// Env: FSSNAP_CAPACITY_STRICT = 0|1 (default 0)
    pub capacity_strict: bool,

    /// fsync the image after restore / mirror passes and on every block write.
    /// Env: FSSNAP_DATA_FSYNC (default false; "1|true|on|yes" => true)
    pub data_fsync: bool,

    /// Block cache size in blocks (0 disables).
    /// Env: FSSNAP_CACHE_BLOCKS (default 0)
    pub cache_blocks: usize,

    /// First block of the reserved raw-mirror region.
    /// Env: FSSNAP_MIRROR_START (default 800)
    pub mirror_start: u32,

    /// Number of leading blocks mirrored.
    /// Env: FSSNAP_MIRROR_BLOCKS (default 100)
    pub mirror_blocks: u32,

    /// Device number stamped on blocks.
    /// Env: FSSNAP_DEVICE (default 1)
    pub device: u32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: None,
            capacity_strict: false,
            data_fsync: false,
            cache_blocks: 0,
            mirror_start: MIRROR_START,
            mirror_blocks: MIRROR_BLOCKS,
            device: ROOTDEV,
        }
    }
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "on" || s == "yes"
}

impl SnapConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FSSNAP_CAPACITY_BYTES") {
            let s = v.trim();
            if s.eq_ignore_ascii_case("page") {
                cfg.capacity_bytes = Some(PAGE_SIZE);
            } else if let Ok(n) = s.parse::<usize>() {
                cfg.capacity_bytes = Some(n);
            }
        }

        if let Ok(v) = std::env::var("FSSNAP_CAPACITY_STRICT") {
            cfg.capacity_strict = env_flag(&v);
        }

        if let Ok(v) = std::env::var("FSSNAP_DATA_FSYNC") {
            cfg.data_fsync = env_flag(&v);
        }

        if let Ok(v) = std::env::var("FSSNAP_CACHE_BLOCKS") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.cache_blocks = n;
            }
        }

        if let Ok(v) = std::env::var("FSSNAP_MIRROR_START") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.mirror_start = n;
            }
        }

        if let Ok(v) = std::env::var("FSSNAP_MIRROR_BLOCKS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.mirror_blocks = n;
            }
        }

        if let Ok(v) = std::env::var("FSSNAP_DEVICE") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.device = n;
            }
        }

        cfg
    }

    /// Effective capacity policy (bounded sizes rounded down to whole blocks, min one block).
    pub fn capacity_policy(&self) -> CapacityPolicy {
        match self.capacity_bytes {
            None => CapacityPolicy::Unbounded,
            Some(n) => {
                let bytes = ((n / BSIZE).max(1)) * BSIZE;
                if self.capacity_strict {
                    CapacityPolicy::Strict { bytes }
                } else {
                    CapacityPolicy::Truncate { bytes }
                }
            }
        }
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_capacity_bytes(mut self, bytes: Option<usize>) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    pub fn with_capacity_strict(mut self, on: bool) -> Self {
        self.capacity_strict = on;
        self
    }

    pub fn with_data_fsync(mut self, on: bool) -> Self {
        self.data_fsync = on;
        self
    }

    pub fn with_cache_blocks(mut self, n: usize) -> Self {
        self.cache_blocks = n;
        self
    }

    pub fn with_mirror(mut self, start: u32, blocks: u32) -> Self {
        self.mirror_start = start;
        self.mirror_blocks = blocks;
        self
    }

    pub fn with_device(mut self, dev: u32) -> Self {
        self.device = dev;
        self
    }

    pub fn builder() -> SnapConfigBuilder {
        SnapConfigBuilder::new()
    }
}

impl fmt::Display for SnapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SnapConfig {{ \
             capacity_bytes: {}, \
             capacity_strict: {}, \
             data_fsync: {}, \
             cache_blocks: {}, \
             mirror: {}+{}, \
             device: {} \
             }}",
            self.capacity_bytes
                .map(|v| v.to_string())
                .unwrap_or_else(|| "growable".to_string()),
            self.capacity_strict,
            self.data_fsync,
            self.cache_blocks,
            self.mirror_start,
            self.mirror_blocks,
            self.device,
        )
    }
}

/// Lightweight builder that produces a SnapConfig.
#[derive(Clone, Debug)]
pub struct SnapConfigBuilder {
    cfg: SnapConfig,
}

impl Default for SnapConfigBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: SnapConfig::from_env(),
        }
    }
}

impl SnapConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: SnapConfig::default(),
        }
    }

    pub fn capacity_bytes(mut self, bytes: Option<usize>) -> Self {
        self.cfg.capacity_bytes = bytes;
        self
    }

    /// Legacy behaviour: one 4 KiB page per category, truncating.
    pub fn one_page(mut self) -> Self {
        self.cfg.capacity_bytes = Some(PAGE_SIZE);
        self.cfg.capacity_strict = false;
        self
    }

    pub fn capacity_strict(mut self, on: bool) -> Self {
        self.cfg.capacity_strict = on;
        self
    }

    pub fn data_fsync(mut self, on: bool) -> Self {
        self.cfg.data_fsync = on;
        self
    }

    pub fn cache_blocks(mut self, n: usize) -> Self {
        self.cfg.cache_blocks = n;
        self
    }

    pub fn mirror(mut self, start: u32, blocks: u32) -> Self {
        self.cfg.mirror_start = start;
        self.cfg.mirror_blocks = blocks;
        self
    }

    pub fn device(mut self, dev: u32) -> Self {
        self.cfg.device = dev;
        self
    }

    pub fn build(self) -> SnapConfig {
        self.cfg
    }
}
