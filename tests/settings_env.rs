use session_marshal::provider::{DefaultMarshallerProvider, MarshallerProvider};
use session_marshal::settings::{MarshallerConfig, ENV_PREFIX};
use session_marshal::strategy::Strategy;

// Kept to a single test: the environment is shared by every test in this binary.
#[test]
fn environment_overrides_defaults() {
    unsafe {
        std::env::set_var(format!("{}_IDENTITY_ID_BASE", ENV_PREFIX), "42");
        std::env::set_var(format!("{}_VERIFY_CHAIN_FINGERPRINT", ENV_PREFIX), "false");
    }
    let config = MarshallerConfig::from_env().unwrap();
    assert_eq!(config.identity_id_base, 42);
    assert!(!config.verify_chain_fingerprint);

    let provider = DefaultMarshallerProvider::from_env().unwrap();
    assert_eq!(provider.config(), &config);
    match provider.new_identity_strategy(None) {
        Strategy::Identity(identity) => assert_eq!(identity.table().next_id(), 42),
        other => panic!("expected an identity strategy, got {:?}", other),
    }
}
