//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ROBONAUT__*` 覆盖（双下划线表示嵌套，如 `ROBONAUT__BOT__NAME=helper`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub queue: QueueSection,
}

/// [bot] 段：机器人身份与服务器地址
#[derive(Debug, Clone, Deserialize)]
pub struct BotSection {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// 透传给后端客户端的调试开关
    #[serde(default)]
    pub debug: bool,
    /// 注册 / 登录邮箱为 `name@email_domain`
    #[serde(default = "default_email_domain")]
    pub email_domain: String,
    #[serde(default = "default_password")]
    pub default_password: String,
}

fn default_name() -> String {
    "robonaut".to_string()
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_email_domain() -> String {
    "test.com".to_string()
}

fn default_password() -> String {
    "pass@word1".to_string()
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            server_url: default_server_url(),
            debug: false,
            email_domain: default_email_domain(),
            default_password: default_password(),
        }
    }
}

impl BotSection {
    /// 机器人账号邮箱，注册与登录共用
    pub fn email(&self) -> String {
        format!("{}@{}", self.name, self.email_domain)
    }
}

/// [queue] 段：队列容量与发送最小间隔
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSection {
    #[serde(default = "default_capacity")]
    pub action_capacity: usize,
    #[serde(default = "default_capacity")]
    pub message_capacity: usize,
    /// 两次发送之间的最小间隔（毫秒）
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
}

fn default_capacity() -> usize {
    100
}

fn default_min_send_interval_ms() -> u64 {
    2000
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            action_capacity: default_capacity(),
            message_capacity: default_capacity(),
            min_send_interval_ms: default_min_send_interval_ms(),
        }
    }
}

impl QueueSection {
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }
}

/// 从 config 目录加载配置，环境变量 ROBONAUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ROBONAUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ROBONAUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bot.email(), "robonaut@test.com");
        assert_eq!(config.queue.action_capacity, 100);
        assert_eq!(config.queue.message_capacity, 100);
        assert_eq!(config.queue.min_send_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[bot]\nname = \"helper\"\nserver_url = \"https://chat.example.com\"\n\n[queue]\nmin_send_interval_ms = 500"
        )
        .unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.bot.name, "helper");
        assert_eq!(config.bot.server_url, "https://chat.example.com");
        assert_eq!(config.queue.min_send_interval(), Duration::from_millis(500));
        assert_eq!(config.queue.action_capacity, 100);
    }
}
