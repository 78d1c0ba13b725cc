//! Configuration

pub mod settings;

pub use settings::{
    CorsSettings, DatabaseSettings, JwtSettings, ServerSettings, Settings, SnowflakeSettings,
    TypingSettings, WebSocketSettings,
};
