// # -----------------------------
// # crates/common/src/lib.rs
// # -----------------------------
pub mod config;

pub use config::{
    load_config, resolve_config_path, GatekeeperCfg, LogsCfg, NetworkCfg, OperatorCfg,
    SysgateConfig, CONFIG_ENV, DEFAULT_CONFIG_FILE,
};
