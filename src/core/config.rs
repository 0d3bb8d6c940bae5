//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 的反序列化及其层级结构映射，支持环境变量与默认值回退机制。

use std::path::Path;
use std::time::Duration;

use bon::Builder;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::core::error::{HarvestError, Result};
use crate::core::model::Platform;
use crate::engine::pacing::Pacing;

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct AppConfig {
    /// 缓存与持久化目录基准路径
    #[serde(default = "default_cache_path")]
    #[builder(default = default_cache_path())]
    pub cache_path: String,

    /// 自动化浏览器 (Chromium) 相关配置
    #[serde(default)]
    #[builder(default)]
    pub browser: BrowserConfig,

    /// 验证码哨兵参数
    #[serde(default)]
    #[builder(default)]
    pub captcha: CaptchaConfig,

    /// 滚动收敛引擎参数
    #[serde(default)]
    #[builder(default)]
    pub scroll: ScrollConfig,

    /// 拟人化节奏
    #[serde(default)]
    #[builder(default)]
    pub pacing: Pacing,

    /// 直连接口参数
    #[serde(default)]
    #[builder(default)]
    pub api: ApiConfig,

    /// 代理池
    #[serde(default)]
    #[builder(default)]
    pub proxy: ProxyPoolConfig,
}

/// 浏览器引擎配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct BrowserConfig {
    /// 是否以无头模式 (Headless) 运行
    #[serde(default = "default_headless")]
    #[builder(default = true)]
    pub headless: bool,
    /// 自定义可执行文件路径
    pub chrome_path: Option<String>,
    /// TikTok 选用移动端画像的概率
    #[serde(default = "default_tiktok_mobile_bias")]
    #[builder(default = default_tiktok_mobile_bias())]
    pub tiktok_mobile_bias: f64,
    /// Facebook 选用移动端画像的概率
    #[serde(default)]
    #[builder(default)]
    pub facebook_mobile_bias: f64,
}

impl BrowserConfig {
    pub fn mobile_bias(&self, platform: Platform) -> f64 {
        let bias = match platform {
            Platform::TikTok => self.tiktok_mobile_bias,
            Platform::Facebook => self.facebook_mobile_bias,
        };
        bias.clamp(0.0, 1.0)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            tiktok_mobile_bias: default_tiktok_mobile_bias(),
            facebook_mobile_bias: 0.0,
        }
    }
}

/// 验证码哨兵参数
#[derive(Debug, Deserialize, Builder, Clone)]
#[serde(default)]
pub struct CaptchaConfig {
    /// 轮询间隔
    #[builder(default = 3)]
    pub poll_interval_secs: u64,
    /// 有头模式等待上限
    #[builder(default = 120)]
    pub ceiling_secs: u64,
    /// 等待期间的心跳日志间隔
    #[builder(default = 15)]
    pub heartbeat_secs: u64,
    /// 验证通过后的缓冲时间
    #[builder(default = 2)]
    pub settle_secs: u64,
    /// 携带 Cookie 时的误报容忍窗口，0 表示关闭
    #[builder(default = 3)]
    pub transient_grace_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            ceiling_secs: 120,
            heartbeat_secs: 15,
            settle_secs: 2,
            transient_grace_secs: 3,
        }
    }
}

impl CaptchaConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_secs(self.ceiling_secs)
    }

    pub fn transient_grace(&self) -> Option<Duration> {
        (self.transient_grace_secs > 0).then(|| Duration::from_secs(self.transient_grace_secs))
    }
}

/// 滚动收敛参数
#[derive(Debug, Deserialize, Builder, Clone)]
#[serde(default)]
pub struct ScrollConfig {
    /// 单次爆发的小步滚动次数
    #[builder(default = 15)]
    pub burst_steps: u32,
    /// 连续失败多少次判定收敛
    #[builder(default = 3)]
    pub max_failed_bursts: u32,
    /// 纠偏时的回滚距离
    #[builder(default = 500)]
    pub corrective_back_px: i64,
    /// 爆发次数硬上限
    #[builder(default = 300)]
    pub max_bursts: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            burst_steps: 15,
            max_failed_bursts: 3,
            corrective_back_px: 500,
            max_bursts: 300,
        }
    }
}

/// 直连接口参数
#[derive(Debug, Deserialize, Builder, Clone)]
#[serde(default)]
pub struct ApiConfig {
    /// 单页条数，上限 50
    #[builder(default = 50)]
    pub page_size: u32,
    /// 默认最大抓取条数
    #[builder(default = 500)]
    pub max_comments: usize,
    /// 请求所声明的地区
    #[builder(default = "VN".to_string())]
    pub region: String,
    #[builder(default = 30)]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_comments: 500,
            region: "VN".to_string(),
            timeout_secs: 30,
        }
    }
}

/// 代理轮换方式
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Random,
    Sequential,
}

/// 代理池配置
#[derive(Debug, Deserialize, Builder, Clone, Default)]
#[serde(default)]
pub struct ProxyPoolConfig {
    #[builder(default)]
    pub list: Vec<String>,
    #[builder(default)]
    pub rotation: Rotation,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            browser: BrowserConfig::default(),
            captcha: CaptchaConfig::default(),
            scroll: ScrollConfig::default(),
            pacing: Pacing::default(),
            api: ApiConfig::default(),
            proxy: ProxyPoolConfig::default(),
        }
    }
}

fn default_cache_path() -> String {
    "cache".to_string()
}
fn default_headless() -> bool {
    true
}
fn default_tiktok_mobile_bias() -> f64 {
    0.7
}

impl AppConfig {
    /// 从文件系统中加载并解析配置
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let builder = Config::builder();

        let builder = if config_path.exists() {
            builder.add_source(File::from(config_path))
        } else {
            builder
        };

        let settings = builder
            .add_source(Environment::with_prefix("HARVESTER").separator("__"))
            .build()
            .map_err(HarvestError::Config)?;
        let mut config: AppConfig = settings.try_deserialize().map_err(HarvestError::Config)?;

        if let Ok(bin) = std::env::var("CHROME_BIN")
            && !bin.trim().is_empty()
        {
            config.browser.chrome_path = Some(bin);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let settings = Config::builder()
            .add_source(File::from_str("[browser]\nheadless = false\n", config::FileFormat::Toml))
            .build()
            .unwrap();
        let cfg: AppConfig = settings.try_deserialize().unwrap();

        assert!(!cfg.browser.headless);
        assert_eq!(cfg.captcha.ceiling_secs, 120);
        assert_eq!(cfg.captcha.poll_interval_secs, 3);
        assert_eq!(cfg.scroll.max_failed_bursts, 3);
        assert_eq!(cfg.api.page_size, 50);
        assert_eq!(cfg.cache_path, "cache");
        assert_eq!(cfg.proxy.rotation, Rotation::Random);
    }

    #[test]
    fn zero_grace_disables_transient_tolerance() {
        let cfg = CaptchaConfig::builder().transient_grace_secs(0).build();
        assert!(cfg.transient_grace().is_none());
        assert_eq!(cfg.poll_interval(), Duration::from_secs(3));
    }
}
