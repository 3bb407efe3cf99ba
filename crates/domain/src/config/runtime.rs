use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Core the packet I/O thread is pinned to. Unpinned when absent.
    #[serde(default)]
    pub cpu_core: Option<usize>,
}
