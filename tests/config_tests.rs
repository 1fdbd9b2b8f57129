//! Unit tests for configuration validation.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::time::Duration;

use egress_verifier::{ConfigError, PollPolicy, ScalewayConfig, VerifierConfig};
use rstest::*;
use test_constants::{
    DEFAULT_IMAGE, DEFAULT_INSTANCE_TYPE, PROBE_IMAGE, SECURITY_GROUP_ID, SUBNET_ID,
};

#[fixture]
fn scaleway_config() -> ScalewayConfig {
    ScalewayConfig {
        access_key: Some(String::from("SCWACCESSKEYEXAMPLE")),
        secret_key: String::from("SCWSECRETKEYEXAMPLE"),
        default_organization_id: None,
        default_project_id: String::from("11111111-2222-3333-4444-555555555555"),
        default_zone: String::from("fr-par-1"),
        default_architecture: String::from("x86_64"),
    }
}

#[fixture]
fn verifier_config() -> VerifierConfig {
    VerifierConfig {
        subnet_id: String::from(SUBNET_ID),
        security_group_id: String::from(SECURITY_GROUP_ID),
        image: String::from(DEFAULT_IMAGE),
        instance_type: String::from(DEFAULT_INSTANCE_TYPE),
        probe_image: String::from(PROBE_IMAGE),
        probe_timeout: String::from("500ms"),
        poll_budget_secs: 1500,
        poll_initial_wait_secs: 1,
        probe_grace_secs: 120,
        endpoints_file: String::from("config.yaml"),
    }
}

fn missing_field_message(error: ConfigError) -> String {
    let ConfigError::MissingField(message) = error else {
        panic!("expected MissingField error, got {error}");
    };
    message
}

#[rstest]
fn valid_configs_pass(scaleway_config: ScalewayConfig, verifier_config: VerifierConfig) {
    assert_eq!(scaleway_config.validate(), Ok(()));
    assert_eq!(verifier_config.validate(), Ok(()));
}

#[rstest]
fn missing_secret_names_env_var_and_file(scaleway_config: ScalewayConfig) {
    let cfg = ScalewayConfig {
        secret_key: String::new(),
        ..scaleway_config
    };

    let message = missing_field_message(cfg.validate().expect_err("secret is required"));

    assert!(message.contains("SCW_SECRET_KEY"), "{message}");
    assert!(message.contains("egress-verifier.toml"), "{message}");
}

#[rstest]
#[case::subnet("EGRESS_VERIFIER_SUBNET_ID", |c: &mut VerifierConfig| c.subnet_id.clear())]
#[case::security_group(
    "EGRESS_VERIFIER_SECURITY_GROUP_ID",
    |c: &mut VerifierConfig| c.security_group_id = String::from("  ")
)]
#[case::probe_image("EGRESS_VERIFIER_PROBE_IMAGE", |c: &mut VerifierConfig| c.probe_image.clear())]
#[case::endpoints("EGRESS_VERIFIER_ENDPOINTS_FILE", |c: &mut VerifierConfig| c.endpoints_file.clear())]
fn missing_verifier_fields_are_actionable(
    verifier_config: VerifierConfig,
    #[case] env_var: &str,
    #[case] mutate: fn(&mut VerifierConfig),
) {
    let mut cfg = verifier_config;
    mutate(&mut cfg);

    let message = missing_field_message(cfg.validate().expect_err("field is required"));

    assert!(message.contains(env_var), "{message}");
}

#[rstest]
fn derived_settings_follow_configuration(verifier_config: VerifierConfig) {
    let cfg = VerifierConfig {
        poll_budget_secs: 90,
        poll_initial_wait_secs: 3,
        probe_grace_secs: 0,
        probe_timeout: String::from("1.5s"),
        ..verifier_config
    };

    assert_eq!(
        cfg.poll_policy(),
        PollPolicy::new(Duration::from_secs(90), Duration::from_secs(3))
    );
    assert_eq!(cfg.probe_grace_period(), Duration::ZERO);
    assert_eq!(cfg.probe_timeout(), Ok(Duration::from_millis(1500)));

    let network = cfg.network_params();
    assert_eq!(network.subnet_id, SUBNET_ID);
    assert_eq!(network.machine_size, DEFAULT_INSTANCE_TYPE);
}
