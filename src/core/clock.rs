use crate::core::error::Result;
use crate::core::types::Micros;
use log::{info, warn};

/// 正常速度对应的速率值（rate / RATE_DEFAULT = 播放倍速）
pub const RATE_DEFAULT: i32 = 1000;

/// 最慢 1/64 倍速
pub const RATE_MIN: i32 = RATE_DEFAULT / 64;

/// 最快 64 倍速
pub const RATE_MAX: i32 = RATE_DEFAULT * 64;

/// 快进/慢放使用的离散倍速档位（分子, 分母），按速度递增
pub const RATE_LADDER: [(i32, i32); 17] = [
    (1, 64),
    (1, 32),
    (1, 16),
    (1, 8),
    (1, 4),
    (1, 3),
    (1, 2),
    (2, 3),
    (1, 1),
    (3, 2),
    (2, 1),
    (3, 1),
    (4, 1),
    (8, 1),
    (16, 1),
    (32, 1),
    (64, 1),
];

/// 档位方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateStep {
    Slower,
    Faster,
}

/// 第 index 个档位对应的速率值
pub fn ladder_rate(index: usize) -> i32 {
    let (num, den) = RATE_LADDER[index.min(RATE_LADDER.len() - 1)];
    RATE_DEFAULT * num / den
}

/// 找到离 current 最近的档位（绝对差最小，并列取较慢的一档）
pub fn nearest_ladder_index(current: i32) -> usize {
    let mut best = 0;
    let mut best_err = i64::MAX;
    for index in 0..RATE_LADDER.len() {
        let err = (ladder_rate(index) as i64 - current as i64).abs();
        if err < best_err {
            best = index;
            best_err = err;
        }
    }
    best
}

/// 从最近档位出发向指定方向走一档，两端饱和不回绕
pub fn step_rate(current: i32, direction: RateStep) -> i32 {
    let index = nearest_ladder_index(current);
    let next = match direction {
        RateStep::Slower => index.saturating_sub(1),
        RateStep::Faster => (index + 1).min(RATE_LADDER.len() - 1),
    };
    ladder_rate(next)
}

/// 决定速率时需要的源/输出能力
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateCaps {
    /// 源自己按实时节奏读取
    pub can_pace: bool,
    /// 源可以接受速率设置
    pub can_rate: bool,
    /// 改变速率后输出端需要重新缩放已排队的时间戳
    pub rescale: bool,
    /// 时钟由输出端驱动
    pub out_pace_control: bool,
}

/// 一次 SetRate 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateChange {
    pub applied: i32,
    pub changed: bool,
    /// 是否需要通知输出端缩放时间戳
    pub rescale: bool,
}

/// 速率与 pts 延迟预算控制器
///
/// 只由输入线程修改，状态发布时读取。
#[derive(Debug, Clone)]
pub struct RateController {
    rate: i32,
    caching: Micros,
    audio_desync: Micros,
    audio_delay: Micros,
    spu_delay: Micros,
    pts_delay: Micros,
}

impl RateController {
    pub fn new(caching: Micros, audio_desync: Micros) -> Self {
        let mut controller = Self {
            rate: RATE_DEFAULT,
            caching: caching.max(0),
            audio_desync,
            audio_delay: 0,
            spu_delay: 0,
            pts_delay: 0,
        };
        controller.update_pts_delay(std::iter::empty());
        controller
    }

    pub fn rate(&self) -> i32 {
        self.rate
    }

    pub fn pts_delay(&self) -> Micros {
        self.pts_delay
    }

    pub fn audio_delay(&self) -> Micros {
        self.audio_delay
    }

    pub fn spu_delay(&self) -> Micros {
        self.spu_delay
    }

    /// 倍速（1.0 = 正常）
    pub fn speed(&self) -> f64 {
        self.rate as f64 / RATE_DEFAULT as f64
    }

    /// 应用速率请求
    ///
    /// - 源既不能控速也不能自控节奏，或者时钟由输出端驱动时，强制回到默认速率
    /// - 源能控速但不自控节奏时，通过 `push` 下发给源；失败则保留旧速率
    pub fn set_rate<F>(&mut self, requested: i32, caps: RateCaps, push: F) -> RateChange
    where
        F: FnOnce(i32) -> Result<i32>,
    {
        let mut rate = requested.clamp(RATE_MIN, RATE_MAX);
        if rate != requested {
            warn!("⚠ 速率 {} 超出范围，已限制为 {}", requested, rate);
        }

        let forced_default = (!caps.can_rate && !caps.can_pace) || (caps.can_pace && caps.out_pace_control);
        if rate != RATE_DEFAULT && forced_default {
            warn!("⚠ 当前输入无法改变速率，保持正常速度");
            rate = RATE_DEFAULT;
        }

        if rate != self.rate && !caps.can_pace && caps.can_rate {
            match push(rate) {
                Ok(actual) => rate = actual.clamp(RATE_MIN, RATE_MAX),
                Err(e) => {
                    warn!("⚠ 源拒绝速率 {}: {}，保持 {}", rate, e, self.rate);
                    rate = self.rate;
                }
            }
        }

        if rate == self.rate {
            return RateChange {
                applied: rate,
                changed: false,
                rescale: false,
            };
        }

        info!("⏩ 播放速率 {} -> {}", self.rate, rate);
        self.rate = rate;
        RateChange {
            applied: rate,
            changed: true,
            rescale: caps.rescale,
        }
    }

    /// 重新计算 pts 延迟预算
    ///
    /// 取缓存值与各个源报告的延迟中的最大值；负的音频失步、负的音频/字幕延迟都需要额外缓存。
    pub fn update_pts_delay<I>(&mut self, source_delays: I) -> Micros
    where
        I: IntoIterator<Item = Micros>,
    {
        let mut delay = source_delays.into_iter().fold(self.caching, Micros::max).max(0);
        if self.audio_desync < 0 {
            delay -= self.audio_desync;
        }
        let extra = self.audio_delay.min(self.spu_delay);
        if extra < 0 {
            delay -= extra;
        }
        self.pts_delay = delay;
        delay
    }

    pub fn set_audio_delay(&mut self, delay: Micros) {
        self.audio_delay = delay;
    }

    pub fn set_spu_delay(&mut self, delay: Micros) {
        self.spu_delay = delay;
    }
}

impl Default for RateController {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PlayerError;

    fn pace_free() -> RateCaps {
        RateCaps {
            can_pace: true,
            can_rate: false,
            rescale: false,
            out_pace_control: false,
        }
    }

    #[test]
    fn test_ladder_is_increasing() {
        for i in 1..RATE_LADDER.len() {
            assert!(ladder_rate(i) > ladder_rate(i - 1));
        }
        assert_eq!(ladder_rate(8), RATE_DEFAULT);
        assert_eq!(ladder_rate(0), RATE_MIN);
        assert_eq!(ladder_rate(16), RATE_MAX);
    }

    #[test]
    fn test_step_faster_reaches_max_in_half_ladder() {
        let mut rate = RATE_DEFAULT;
        for _ in 0..RATE_LADDER.len() / 2 {
            let next = step_rate(rate, RateStep::Faster);
            assert!(next > rate);
            rate = next;
        }
        assert_eq!(rate, RATE_MAX);
        assert_eq!(step_rate(rate, RateStep::Faster), RATE_MAX);
    }

    #[test]
    fn test_step_slower_reaches_min_in_half_ladder() {
        let mut rate = RATE_DEFAULT;
        for _ in 0..RATE_LADDER.len() / 2 {
            let next = step_rate(rate, RateStep::Slower);
            assert!(next < rate);
            rate = next;
        }
        assert_eq!(rate, RATE_MIN);
        assert_eq!(step_rate(rate, RateStep::Slower), RATE_MIN);
    }

    #[test]
    fn test_step_from_off_ladder_rate_uses_nearest() {
        // 1100 最近的是 1000，向上一档是 1500
        assert_eq!(step_rate(1100, RateStep::Faster), 1500);
        // 1400 最近的是 1500，向下一档是 1000
        assert_eq!(step_rate(1400, RateStep::Slower), 1000);
    }

    #[test]
    fn test_set_rate_pace_source_applies_directly() {
        let mut rc = RateController::default();
        let change = rc.set_rate(2000, pace_free(), |_| panic!("不应下发给源"));
        assert!(change.changed);
        assert_eq!(rc.rate(), 2000);
        assert!((rc.speed() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_rate_forced_default_without_control() {
        let mut rc = RateController::default();
        let change = rc.set_rate(2000, RateCaps::default(), |_| panic!("不应下发给源"));
        assert!(!change.changed);
        assert_eq!(rc.rate(), RATE_DEFAULT);

        let caps = RateCaps {
            out_pace_control: true,
            ..pace_free()
        };
        rc.set_rate(500, caps, |r| Ok(r));
        assert_eq!(rc.rate(), RATE_DEFAULT);
    }

    #[test]
    fn test_set_rate_pushes_to_rate_capable_source() {
        let mut rc = RateController::default();
        let caps = RateCaps {
            can_pace: false,
            can_rate: true,
            rescale: true,
            out_pace_control: false,
        };
        let change = rc.set_rate(4000, caps, |r| Ok(r));
        assert_eq!(change.applied, 4000);
        assert!(change.rescale);

        let change = rc.set_rate(500, caps, |_| Err(PlayerError::Unsupported("rate")));
        assert!(!change.changed);
        assert_eq!(rc.rate(), 4000);
    }

    #[test]
    fn test_pts_delay_budget() {
        let mut rc = RateController::new(300_000, 0);
        assert_eq!(rc.update_pts_delay([100_000, 500_000]), 500_000);

        rc.set_audio_delay(-200_000);
        assert_eq!(rc.update_pts_delay([100_000]), 500_000);

        let rc = RateController::new(300_000, -50_000);
        assert_eq!(rc.pts_delay(), 350_000);
    }
}
