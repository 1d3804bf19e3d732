//! Tests for configuration parsing, validation and environment overrides

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::errors::CodeboxError;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn clear_env() {
        for key in [
            ENV_IMAGE,
            ENV_TIMEOUT_SECS,
            ENV_MEMORY_MB,
            ENV_CPUS,
            ENV_ENGINE_HOST,
            ENV_WORKSPACE_DIR,
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CodeboxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sandbox.image, "python:3.10");
        assert_eq!(
            config.sandbox.entry_command(),
            vec!["python".to_string(), "/code/code.py".to_string()]
        );
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ConfigLoader::from_str("   \n").unwrap();
        assert_eq!(config, CodeboxConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
limits:
  timeout_secs: 3
  memory_mb: 128
sandbox:
  image: "python:3.12-slim"
"#;
        let config = ConfigLoader::from_str(yaml).unwrap();
        assert_eq!(config.limits.timeout_secs, 3);
        assert_eq!(config.limits.memory_mb, 128);
        assert_eq!(config.limits.cpus, 1.0);
        assert_eq!(config.sandbox.image, "python:3.12-slim");
        assert_eq!(config.sandbox.mount_path, "/code");
    }

    #[test]
    fn test_resource_limits_conversion() {
        let limits = LimitsConfig {
            timeout_secs: 5,
            memory_mb: 64,
            cpus: 0.5,
            pids_limit: 32,
        }
        .to_resource_limits();
        assert_eq!(limits.timeout, Duration::from_secs(5));
        assert_eq!(limits.memory_bytes, 64 * 1024 * 1024);
        assert_eq!(limits.nano_cpus(), 500_000_000);
        assert_eq!(limits.pids_limit, 32);
    }

    #[test]
    fn test_rejects_unpinned_images() {
        for image in ["python", "python:latest", "registry:5000/python", ":3.10"] {
            let mut config = CodeboxConfig::default();
            config.sandbox.image = image.to_string();
            assert!(
                matches!(config.validate(), Err(CodeboxError::Config(_))),
                "image '{}' should be rejected",
                image
            );
        }

        let mut config = CodeboxConfig::default();
        config.sandbox.image = "registry:5000/python:3.10".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unbounded_limits() {
        let mut config = CodeboxConfig::default();
        config.limits.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = CodeboxConfig::default();
        config.limits.memory_mb = 0;
        assert!(config.validate().is_err());

        let mut config = CodeboxConfig::default();
        config.limits.cpus = 0.0;
        assert!(config.validate().is_err());

        let mut config = CodeboxConfig::default();
        config.limits.cpus = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_memory_limit_beyond_engine_range() {
        let mut config = CodeboxConfig::default();
        config.limits.memory_mb = u64::MAX / 1024;
        assert!(matches!(config.validate(), Err(CodeboxError::Config(_))));
        // Conversion never overflows, even for a config that skipped validation.
        assert_eq!(config.limits.to_resource_limits().memory_bytes, u64::MAX);

        let mut config = CodeboxConfig::default();
        config.limits.memory_mb = MAX_MEMORY_MB;
        assert!(config.validate().is_ok());
        let bytes = config.limits.to_resource_limits().memory_bytes;
        assert!(i64::try_from(bytes).is_ok());
    }

    #[test]
    fn test_rejects_bad_paths() {
        let mut config = CodeboxConfig::default();
        config.sandbox.mount_path = "code".to_string();
        assert!(config.validate().is_err());

        let mut config = CodeboxConfig::default();
        config.sandbox.file_name = "../escape.py".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = ConfigLoader::from_str("limits: [not, a, map]");
        assert!(matches!(result, Err(CodeboxError::Config(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_load_from_file_with_env_overrides() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "limits:\n  timeout_secs: 7\n  memory_mb: 512").unwrap();

        env::set_var(ENV_MEMORY_MB, "128");
        env::set_var(ENV_ENGINE_HOST, "tcp://127.0.0.1:2375");
        let config = ConfigLoader::load(Some(file.path())).await;
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.limits.timeout_secs, 7);
        assert_eq!(config.limits.memory_mb, 128);
        assert_eq!(config.engine.host.as_deref(), Some("tcp://127.0.0.1:2375"));
    }

    #[tokio::test]
    #[serial]
    async fn test_invalid_env_value_is_rejected() {
        clear_env();
        env::set_var(ENV_TIMEOUT_SECS, "soon");
        let result = ConfigLoader::load(None).await;
        clear_env();

        match result {
            Err(CodeboxError::Config(msg)) => assert!(msg.contains(ENV_TIMEOUT_SECS)),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_file_is_config_error() {
        clear_env();
        let result = ConfigLoader::from_file("/definitely/not/here/codebox.yaml").await;
        assert!(matches!(result, Err(CodeboxError::Config(_))));
    }
}
