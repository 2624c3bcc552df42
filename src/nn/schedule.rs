/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 时变量调度（variable schedule）：(epoch, step) -> Option<f64>
 *
 * `None` 表示"该特性关闭"（例如没有权重衰减），与 `Some(0.0)` 不同义。
 * 调度必须是 (epoch, step, 配置) 的纯函数，不得依赖节点状态。
 */

use crate::nn::graph::GraphError;
use enum_dispatch::enum_dispatch;
use std::collections::HashMap;

/// 本核心识别的调度变量名
pub const ALPHA: &str = "alpha";
pub const LAMBDA: &str = "lambda";
pub const LOWER_BOUND: &str = "lowerBound";
pub const UPPER_BOUND: &str = "upperBound";

#[enum_dispatch(Schedule)]
pub trait TraitSchedule {
    fn value(&self, epoch: usize, step: usize) -> Option<f64>;
}

#[enum_dispatch]
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    Constant(Constant),
    StepDecay(StepDecay),
    Exponential(Exponential),
}

/// 常数调度；`disabled()` 构造"特性关闭"的调度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    value: Option<f64>,
}

impl Constant {
    pub const fn new(value: f64) -> Self {
        Self { value: Some(value) }
    }

    pub const fn disabled() -> Self {
        Self { value: None }
    }
}

impl TraitSchedule for Constant {
    fn value(&self, _epoch: usize, _step: usize) -> Option<f64> {
        self.value
    }
}

/// 阶梯衰减：每 every 个 epoch 乘一次 factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDecay {
    initial: f64,
    factor: f64,
    every: usize,
}

impl StepDecay {
    pub fn new(initial: f64, factor: f64, every: usize) -> Result<Self, GraphError> {
        if every == 0 {
            return Err(GraphError::InvalidOperation(
                "StepDecay 的周期 every 必须为正".to_string(),
            ));
        }
        Ok(Self {
            initial,
            factor,
            every,
        })
    }
}

impl TraitSchedule for StepDecay {
    fn value(&self, epoch: usize, _step: usize) -> Option<f64> {
        Some(self.initial * self.factor.powi((epoch / self.every) as i32))
    }
}

/// 指数衰减：initial * decay^epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exponential {
    initial: f64,
    decay: f64,
}

impl Exponential {
    pub const fn new(initial: f64, decay: f64) -> Self {
        Self { initial, decay }
    }
}

impl TraitSchedule for Exponential {
    fn value(&self, epoch: usize, _step: usize) -> Option<f64> {
        Some(self.initial * self.decay.powf(epoch as f64))
    }
}

/// 按变量名汇总的调度表
///
/// 优化器从这里取当前 (epoch, step) 下的学习率、衰减与界。
#[derive(Debug, Clone, Default)]
pub struct ScheduleSet {
    map: HashMap<String, Schedule>,
}

impl ScheduleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只配常数学习率的捷径
    pub fn with_alpha(alpha: f64) -> Self {
        let mut set = Self::new();
        set.insert(ALPHA, Constant::new(alpha));
        set
    }

    pub fn insert(&mut self, name: &str, schedule: impl Into<Schedule>) -> &mut Self {
        self.map.insert(name.to_string(), schedule.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Schedule> {
        self.map.get(name)
    }

    /// 查询某变量在 (epoch, step) 的值；变量未配置与调度返回 None 同样视为关闭
    pub fn value(&self, name: &str, epoch: usize, step: usize) -> Option<f64> {
        self.map.get(name).and_then(|s| s.value(epoch, step))
    }

    pub(in crate::nn) fn require_alpha(&self, epoch: usize, step: usize) -> Result<f64, GraphError> {
        self.value(ALPHA, epoch, step).ok_or_else(|| {
            GraphError::InvalidOperation(format!("缺少学习率调度（变量名\"{ALPHA}\"）"))
        })
    }

    pub fn lambda(&self, epoch: usize, step: usize) -> Option<f64> {
        self.value(LAMBDA, epoch, step)
    }

    pub fn lower_bound(&self, epoch: usize, step: usize) -> Option<f64> {
        self.value(LOWER_BOUND, epoch, step)
    }

    pub fn upper_bound(&self, epoch: usize, step: usize) -> Option<f64> {
        self.value(UPPER_BOUND, epoch, step)
    }
}
