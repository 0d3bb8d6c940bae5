//! 指纹与会话配置器 (Fingerprint / Session Configurator)
//!
//! 依据会话配置生成浏览器启动画像：随机 UA、视口、自动化标记屏蔽、
//! 页面加载前注入的反指纹脚本，以及代理接线（含认证扩展）。

pub mod agents;
pub mod extension;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::config::BrowserConfig;
use crate::core::error::{HarvestError, Result, SetupFailure};
use crate::core::model::{Platform, SessionConfig};

pub use agents::AgentPick;
pub use extension::ProxyAuthExtension;

/// 页面加载前注入的脚本组
pub static STEALTH_BATTERY: &[(&str, &str)] = &[
    ("webdriver", include_str!("../../assets/stealth/webdriver.js")),
    ("plugins", include_str!("../../assets/stealth/plugins.js")),
    ("languages", include_str!("../../assets/stealth/languages.js")),
    ("chrome_runtime", include_str!("../../assets/stealth/chrome_runtime.js")),
    ("permissions", include_str!("../../assets/stealth/permissions.js")),
    ("hardware", include_str!("../../assets/stealth/hardware.js")),
    ("webgl", include_str!("../../assets/stealth/webgl.js")),
    ("to_string", include_str!("../../assets/stealth/to_string.js")),
];

/// 无论有头无头都携带的启动参数
const BASE_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-popup-blocking",
    "--disable-translate",
    "--disable-sync",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-hang-monitor",
    "--disable-prompt-on-repost",
    "--disable-client-side-phishing-detection",
    "--metrics-recording-only",
    "--password-store=basic",
    "--use-mock-keychain",
    "--lang=vi-VN",
];

/// 无头模式的资源约束参数
const HEADLESS_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-software-rasterizer",
    "--disable-breakpad",
    "--disable-component-update",
    "--force-color-profile=srgb",
    "--memory-pressure-off",
    "--disable-features=TranslateUI",
    "--js-flags=--max-old-space-size=512",
];

/// 可执行文件搜索列表
const CHROME_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
];

const CHROME_BINARIES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// 浏览器启动画像
#[derive(Debug)]
pub struct LaunchProfile {
    pub platform: Platform,
    pub headless: bool,
    pub user_agent: String,
    pub mobile: bool,
    pub window: (u32, u32),
    pub args: Vec<String>,
    /// 不含凭据的代理地址
    pub proxy_server: Option<String>,
    /// 代理认证扩展，生命周期与浏览器一致
    pub extension: Option<ProxyAuthExtension>,
    pub chrome_path: Option<PathBuf>,
}

impl LaunchProfile {
    /// 页面加载前需要注入的脚本
    pub fn stealth_scripts(&self) -> impl Iterator<Item = &'static str> {
        STEALTH_BATTERY.iter().map(|(_, src)| *src)
    }
}

/// 启动画像构建器
pub struct Configurator<'a> {
    browser: &'a BrowserConfig,
}

impl<'a> Configurator<'a> {
    pub fn new(browser: &'a BrowserConfig) -> Self {
        Self { browser }
    }

    /// 为抓取会话生成画像
    pub fn build(&self, session: &SessionConfig) -> Result<LaunchProfile> {
        let pick = agents::pick(self.browser.mobile_bias(session.platform));
        self.assemble(session, pick, None)
    }

    /// 为人工登录会话生成画像，窗口尺寸固定
    pub fn build_interactive(&self, session: &SessionConfig, window: (u32, u32)) -> Result<LaunchProfile> {
        let pick = agents::pick(0.0);
        self.assemble(session, pick, Some(window))
    }

    fn assemble(
        &self,
        session: &SessionConfig,
        pick: AgentPick,
        window: Option<(u32, u32)>,
    ) -> Result<LaunchProfile> {
        let chrome_path = resolve_chrome(self.browser.chrome_path.as_deref())?;
        let window = window.unwrap_or(pick.window);

        let mut args: Vec<String> = BASE_ARGS.iter().map(|s| s.to_string()).collect();
        if session.headless {
            args.extend(HEADLESS_ARGS.iter().map(|s| s.to_string()));
        }
        args.push(format!("--window-size={},{}", window.0, window.1));
        args.push(format!("--user-agent={}", pick.user_agent));

        let (proxy_server, extension) = match &session.proxy {
            Some(proxy) => {
                args.push(format!("--proxy-server={}", proxy.server()));
                let extension = if proxy.has_credentials() {
                    info!("代理携带凭据，生成认证扩展: {}", proxy);
                    Some(ProxyAuthExtension::package(proxy)?)
                } else {
                    debug!("使用直连代理: {}", proxy);
                    None
                };
                (Some(proxy.server()), extension)
            }
            None => (None, None),
        };

        debug!(
            "启动画像: platform={} headless={} mobile={} window={:?}",
            session.platform, session.headless, pick.mobile, window
        );

        Ok(LaunchProfile {
            platform: session.platform,
            headless: session.headless,
            user_agent: pick.user_agent.to_string(),
            mobile: pick.mobile,
            window,
            args,
            proxy_server,
            extension,
            chrome_path,
        })
    }
}

/// 解析浏览器可执行文件
///
/// 显式指定但不存在的路径视为环境错误；未指定时按搜索列表查找，仍找不到则交给启动器自检。
pub fn resolve_chrome(explicit: Option<&str>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit.filter(|p| !p.trim().is_empty()) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(Some(path));
        }
        if let Ok(found) = which::which(&path) {
            return Ok(Some(found));
        }
        return Err(HarvestError::Setup(SetupFailure::BrowserUnavailable(format!(
            "configured browser not found: {}",
            path.display()
        ))));
    }

    if let Some(found) = CHROME_BINARIES.iter().find_map(|bin| which::which(bin).ok()) {
        return Ok(Some(found));
    }

    Ok(CHROME_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::proxy::ProxySpec;

    fn session(proxy: Option<&str>, headless: bool) -> SessionConfig {
        SessionConfig {
            headless,
            proxy: proxy.map(|p| ProxySpec::parse(p).unwrap()),
            platform: Platform::Facebook,
            cookies: None,
        }
    }

    #[test]
    fn battery_covers_every_navigator_override() {
        let names: Vec<_> = STEALTH_BATTERY.iter().map(|(n, _)| *n).collect();
        for expected in ["webdriver", "plugins", "languages", "hardware", "webgl"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert!(STEALTH_BATTERY.iter().all(|(_, src)| !src.trim().is_empty()));
    }

    #[test]
    fn explicit_missing_browser_is_a_setup_failure() {
        let err = resolve_chrome(Some("/definitely/not/here/chrome")).unwrap_err();
        assert!(err.is_setup());
    }

    #[test]
    fn plain_proxy_goes_on_the_command_line() {
        let browser = BrowserConfig::default();
        let profile = Configurator::new(&browser)
            .build(&session(Some("1.2.3.4:8080"), true))
            .unwrap();
        assert!(profile.args.iter().any(|a| a == "--proxy-server=http://1.2.3.4:8080"));
        assert!(profile.args.iter().any(|a| a == "--headless=new"));
        assert!(profile.extension.is_none());
    }

    #[test]
    fn credentialed_proxy_gets_an_auth_extension() {
        let browser = BrowserConfig::default();
        let profile = Configurator::new(&browser)
            .build(&session(Some("http://u:p@1.2.3.4:3128"), false))
            .unwrap();
        let ext = profile.extension.as_ref().unwrap();
        assert!(ext.path().join("manifest.json").exists());
        assert!(!profile.args.iter().any(|a| a.contains("u:p@")));
        assert!(!profile.args.iter().any(|a| a == "--headless=new"));
    }
}
