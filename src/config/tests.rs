use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.openai.base_url = "http://localhost:8080".to_string();
        original_config.openai.chat_model = "gpt-4o-mini".to_string();
        original_config.chunking.chunk_size = 512;
        original_config.chunking.chunk_overlap = 64;

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [openai
            base_url = "http://localhost"
            batch_size = "many"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn partial_config_with_defaults() {
        let partial_toml = r#"
            [rag]
            top_k = 8
        "#;

        let config: Config = toml::from_str(partial_toml).expect("partial config should parse");
        assert_eq!(config.rag.top_k, 8);
        assert_eq!(config.rag.min_ingest_duration_ms, 5000);
        assert_eq!(config.openai.chat_model, "gpt-4");
        assert_eq!(config.chunking.chunk_overlap, 50);
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [openai]
            base_url = "https://api.openai.com"
            embedding_model = "text-embedding-ada-002"
            chat_model = "gpt-4"
            embedding_dimension = 1536
            batch_size = 64
            timeout_seconds = 30
            retry_attempts = 2

            [chunking]
            chunk_size = 256
            chunk_overlap = 50

            [rag]
            top_k = 3
            similarity_cutoff = 0.5
            min_ingest_duration_ms = 0
            operation_timeout_seconds = 60

            [notion]
            base_url = "https://api.notion.com"
            api_version = "2022-06-28"
            database_id = "abc"
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert!(config.validate().is_ok());
        assert_eq!(config.openai.batch_size, 64);
        assert_eq!(config.rag.similarity_cutoff, Some(0.5));
        assert_eq!(config.rag.min_ingest_duration_ms, 0);
        assert_eq!(config.notion.database_id.as_deref(), Some("abc"));
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidChunkOverlap(300, 256),
            ConfigError::InvalidTopK(0),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(!message.is_empty());
            assert!(message.len() > 10);
        }
    }

    #[test]
    #[serial]
    fn load_reads_secrets_from_environment() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");

        // SAFETY: serialised with every other test touching the environment
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "sk-from-env");
        }
        let config = Config::load(temp_dir.path());
        // SAFETY: as above
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }

        let config = config.expect("config should load");
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-from-env"));
    }

    #[test]
    #[serial]
    fn config_dir_honours_override() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");

        // SAFETY: serialised with every other test touching the environment
        unsafe {
            std::env::set_var("RAG_CHAT_HOME", temp_dir.path());
        }
        let dir = get_config_dir();
        // SAFETY: as above
        unsafe {
            std::env::remove_var("RAG_CHAT_HOME");
        }

        assert_eq!(dir.expect("dir should resolve"), temp_dir.path());
    }
}
