//! Integration test: Configuration utilities
//!
//! Tests the bin_common configuration loading functionality.

use polymarket_arb_bot::bin_common::{load_config_from_env, ConfigType};
use std::env;

#[test]
fn test_engine_config_default() {
    // Clear env var to test default
    env::remove_var("ENGINE_CONFIG_PATH");

    let config_path = load_config_from_env(ConfigType::Engine);
    assert_eq!(config_path.to_str().unwrap(), "config/engine.yaml");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_config_type_env_var_names() {
    assert_eq!(ConfigType::Engine.env_var_name(), "ENGINE_CONFIG_PATH");
}

#[test]
fn test_config_type_default_paths() {
    assert_eq!(ConfigType::Engine.default_path(), "config/engine.yaml");

    let custom = ConfigType::Custom("test.yaml".to_string());
    assert_eq!(custom.default_path(), "test.yaml");
}
