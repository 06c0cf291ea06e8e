//! Configuration Tests
//!
//! Tests for configuration defaults and fail-fast validation.

use modelforge::ControlPlaneConfig;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn default_configuration_is_valid() {
    let config = ControlPlaneConfig::default();

    assert_eq!(config.listen_addr.port(), 8080);
    assert_eq!(config.docker_host, "unix:///var/run/docker.sock");
    assert_eq!(config.image_pull_timeout, Duration::from_secs(300));
    assert_eq!(config.port_range_start, 11400);
    assert_eq!(config.port_range_end, 11500);
    assert!(config.health_check_enabled);
    assert_eq!(config.health_check_interval, Duration::from_secs(30));
    assert_eq!(config.health_check_initial_delay, Duration::from_secs(10));
    assert_eq!(config.registry_file, PathBuf::from("./data/registry.yml"));
    assert_eq!(config.log_level, "info");

    assert!(config.validate().is_ok());
}

#[test]
fn inverted_port_range_is_rejected() {
    let config = ControlPlaneConfig {
        port_range_start: 11500,
        port_range_end: 11400,
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("inverted"));
}

#[test]
fn single_port_range_is_allowed() {
    let config = ControlPlaneConfig {
        port_range_start: 11400,
        port_range_end: 11400,
        ..Default::default()
    };

    assert!(config.validate().is_ok());
    assert_eq!(config.port_capacity(), 1);
}

#[test]
fn blank_docker_host_is_rejected() {
    let config = ControlPlaneConfig {
        docker_host: "   ".to_string(),
        ..Default::default()
    };

    assert!(config.validate().is_err());
}

#[test]
fn sub_second_intervals_are_rejected() {
    let config = ControlPlaneConfig {
        image_pull_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = ControlPlaneConfig {
        health_check_interval: Duration::from_millis(100),
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn invalid_log_level_is_rejected() {
    let config = ControlPlaneConfig {
        log_level: "verbose".to_string(),
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("invalid log_level"));
}

#[test]
fn port_capacity_counts_inclusive_range() {
    let config = ControlPlaneConfig::default();
    assert_eq!(config.port_capacity(), 101);
}
