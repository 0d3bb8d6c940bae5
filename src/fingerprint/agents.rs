//! UA 池 (User-Agent Pools)

use rand::Rng;
use rand::seq::IndexedRandom;

/// 桌面端 UA 池
pub const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

/// 移动端 UA 池
pub const MOBILE_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 13; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36",
];

pub const MOBILE_WINDOW: (u32, u32) = (375, 812);
/// 窄幅桌面窗口，评论区布局更稳定
pub const COMPACT_WINDOW: (u32, u32) = (420, 1080);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentPick {
    pub user_agent: &'static str,
    pub mobile: bool,
    pub window: (u32, u32),
}

/// 按移动端偏置随机挑选 UA
pub fn pick(mobile_bias: f64) -> AgentPick {
    let mut rng = rand::rng();
    let mobile = rng.random_bool(mobile_bias.clamp(0.0, 1.0));
    let pool = if mobile { MOBILE_AGENTS } else { DESKTOP_AGENTS };
    let user_agent = pool.choose(&mut rng).copied().unwrap_or(DESKTOP_AGENTS[0]);

    let window = if mobile { MOBILE_WINDOW } else { COMPACT_WINDOW };

    AgentPick {
        user_agent,
        mobile,
        window,
    }
}

/// 桌面端 UA，供直连接口使用
pub fn desktop() -> &'static str {
    DESKTOP_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(DESKTOP_AGENTS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_are_disjoint() {
        assert!(DESKTOP_AGENTS.iter().all(|ua| !MOBILE_AGENTS.contains(ua)));
        assert!(MOBILE_AGENTS.iter().all(|ua| ua.contains("Mobile")));
    }

    #[test]
    fn bias_extremes_are_deterministic() {
        for _ in 0..50 {
            let m = pick(1.0);
            assert!(m.mobile);
            assert!(MOBILE_AGENTS.contains(&m.user_agent));
            assert_eq!(m.window, MOBILE_WINDOW);

            let d = pick(0.0);
            assert!(!d.mobile);
            assert!(DESKTOP_AGENTS.contains(&d.user_agent));
        }
    }
}
