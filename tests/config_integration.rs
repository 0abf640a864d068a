//! Configuration layering: defaults, then file, then `CERTPLANE__*` variables.

use std::env;
use std::io::Write;

use certplane::{AppConfig, Result};

const PORT_VAR: &str = "CERTPLANE__SERVER__PORT";
const WORKERS_VAR: &str = "CERTPLANE__PROVISIONING__WORKER_COUNT";
const ORIGINS_VAR: &str = "CERTPLANE__SERVER__CORS_ALLOWED_ORIGINS";

// Only one test in this binary touches the environment, so no lock is needed.
#[test]
fn test_environment_overrides_file_and_defaults() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        r#"
[server]
port = 9000

[provisioning]
worker_count = 3
"#
    )?;

    env::set_var(PORT_VAR, "9443");
    env::set_var(ORIGINS_VAR, "https://a.example.com,https://b.example.com");

    let config = AppConfig::load(Some(file.path()));

    env::remove_var(PORT_VAR);
    env::remove_var(ORIGINS_VAR);

    let config = config?;
    assert_eq!(config.server.port, 9443);
    assert_eq!(config.provisioning.worker_count, 3);
    assert_eq!(
        config.server.cors_allowed_origins,
        vec!["https://a.example.com".to_string(), "https://b.example.com".to_string()]
    );

    env::set_var(WORKERS_VAR, "not-a-number");
    let result = AppConfig::load(None);
    env::remove_var(WORKERS_VAR);
    assert!(result.is_err());

    Ok(())
}
