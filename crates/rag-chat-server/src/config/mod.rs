pub mod settings;

pub use settings::{
    ChatConfig, EmbeddingConfig, LlmConfig, LogFormat, LoggingConfig, RetrievalConfig,
    ServerConfig, Settings,
};
