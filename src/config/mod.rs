pub mod app_config;

pub use app_config::{
    AppConfig, ChatConfig, DatabaseConfig, LoggingConfig, ModelConfig, ServerConfig,
    CONFIG_FILE_NAME, CONFIG_PATH_ENV,
};
