use super::*;
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
        original_config.models.protocol = "https".to_string();
        original_config.models.host = "test-host".to_string();
        original_config.models.port = 8080;
        original_config.storage.bucket = "manuals".to_string();

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let loaded_config =
            Config::load_file(temp_dir.path()).expect("should load config from directory");

        assert_eq!(loaded_config.models, original_config.models);
        assert_eq!(loaded_config.storage, original_config.storage);
        assert_eq!(loaded_config.get_base_dir(), temp_dir.path());
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [models
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_toml_file_is_reported() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(temp_dir.path().join("config.toml"), "[models]\nport = \"x\"\n")
            .expect("should write config");

        let result = Config::load_file(temp_dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [storage]
            root = "/srv/objects"
            bucket = "docs"
            raw_docs_prefix = "raw"
            index_prefix = "vector-db"
            scratch_dir = "/tmp/docs-rag"

            [models]
            protocol = "http"
            host = "localhost"
            port = 11434
            embedding_model = "nomic-embed-text:latest"
            chat_model = "llama3.1:8b"
            timeout_seconds = 60
            batch_size = 8

            [chunking]
            chunk_size = 1500
            chunk_overlap = 100

            [retrieval]
            k = 3
            fetch_k = 10
            lambda = 0.7

            [generation]
            temperature = 0.0
            max_tokens = 512
            top_p = 0.9
            top_k = 40

            [ui]
            mock = false
            function_name = "chat"
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert_eq!(config.storage.bucket, "docs");
        assert_eq!(config.models.timeout_seconds, 60);
        assert_eq!(config.chunking.chunk_size, 1500);
        assert_eq!(config.retrieval.fetch_k, 10);
        assert_eq!(config.generation.max_tokens, 512);
        assert_eq!(config.ui.function_name, "chat");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn model_url_generation_with_different_hosts() {
        let configs = vec![
            ("http", "localhost", 11434, "http://localhost:11434/"),
            ("http", "127.0.0.1", 8080, "http://127.0.0.1:8080/"),
            (
                "https",
                "secure.example.com",
                443,
                "https://secure.example.com/",
            ),
        ];

        for (protocol, host, port, expected_url) in configs {
            let mut config = Config::default();
            config.models.protocol = protocol.to_string();
            config.models.host = host.to_string();
            config.models.port = port;

            let url = config.model_url().expect("model_url is ok");
            assert_eq!(url.as_str(), expected_url);
        }
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidProtocol("ftp".to_string()),
            ConfigError::InvalidPort(0),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::OverlapTooLarge(300, 200),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(!message.is_empty());
            assert!(message.len() > 10);
        }
    }
}
