/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 优化器基础：算法 trait、超参数解析、时变驱动器
 */

use super::adam::{Adam, AmsGrad, RAdam};
use super::bounded::{AdaBound, AmsBound};
use super::sgd::{MomentumDescent, PlainDescent};
use crate::nn::graph::{GraphEngine, GraphError};
use crate::nn::schedule::ScheduleSet;
use crate::nn::weights::WeightStore;
use enum_dispatch::enum_dispatch;

/// 某一步更新用到的调度值快照
///
/// alpha 必须有；lambda 为 None 表示权重衰减关闭；界只有有界变体才要求。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HyperValues {
    pub alpha: f64,
    pub lambda: Option<f64>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    /// 步数，从 1 起计（偏差修正用）
    pub t: usize,
}

/// 更新算法：每次调用无自有状态，全部状态在 WeightStore 里
#[enum_dispatch(Algorithm)]
pub trait TraitAlgorithm {
    fn name(&self) -> &'static str;

    /// 用 gradient 就地更新 value
    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError>;
}

#[enum_dispatch]
#[derive(Debug, Clone, PartialEq)]
pub enum Algorithm {
    PlainDescent(PlainDescent),
    MomentumDescent(MomentumDescent),
    Adam(Adam),
    AmsGrad(AmsGrad),
    RAdam(RAdam),
    AdaBound(AdaBound),
    AmsBound(AmsBound),
}

/// 优化器驱动：持有调度表与时间状态，按 (epoch, step) 解析超参数并分发算法
///
/// 算法本身也可随训练进程切换（按 epoch 的变体调度），不只是超参数。
///
/// `PyTorch` 风格训练循环：
/// ```ignore
/// graph.update_kernel(batch)?;
/// graph.forward()?;
/// graph.loss_derivative(loss)?;
/// graph.backward()?;
/// optimizer.step(&mut graph)?; // ← 只更新参数，不做 forward/backward
/// ```
#[derive(Debug, Clone)]
pub struct Optimizer {
    schedules: ScheduleSet,
    /// (起始 epoch, 算法)，按 epoch 升序，首项必须从 0 起
    variants: Vec<(usize, Algorithm)>,
    epoch: usize,
    step_in_epoch: usize,
    /// 已执行的更新步数（从 1 起计入偏差修正）
    t: usize,
}

impl Optimizer {
    pub fn new(algorithm: impl Into<Algorithm>, schedules: ScheduleSet) -> Self {
        Self {
            schedules,
            variants: vec![(0, algorithm.into())],
            epoch: 0,
            step_in_epoch: 0,
            t: 0,
        }
    }

    /// 按 epoch 切换算法变体
    pub fn with_variant_schedule(
        variants: Vec<(usize, Algorithm)>,
        schedules: ScheduleSet,
    ) -> Result<Self, GraphError> {
        if variants.is_empty() {
            return Err(GraphError::InvalidOperation(
                "算法变体调度不能为空".to_string(),
            ));
        }
        if variants[0].0 != 0 {
            return Err(GraphError::InvalidOperation(
                "算法变体调度必须从第0个epoch开始".to_string(),
            ));
        }
        if variants.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(GraphError::InvalidOperation(
                "算法变体调度的起始epoch必须严格递增".to_string(),
            ));
        }
        Ok(Self {
            schedules,
            variants,
            epoch: 0,
            step_in_epoch: 0,
            t: 0,
        })
    }

    pub fn set_time(&mut self, epoch: usize, step: usize) {
        self.epoch = epoch;
        self.step_in_epoch = step;
    }

    pub const fn epoch(&self) -> usize {
        self.epoch
    }

    pub const fn t(&self) -> usize {
        self.t
    }

    pub fn schedules(&self) -> &ScheduleSet {
        &self.schedules
    }

    /// 当前 epoch 生效的算法
    pub fn current_algorithm(&self) -> &Algorithm {
        self.variants
            .iter()
            .rev()
            .find(|(from, _)| *from <= self.epoch)
            .map_or(&self.variants[0].1, |(_, algorithm)| algorithm)
    }

    /// 参数更新（使用已计算的梯度）
    pub fn step(&mut self, graph: &mut GraphEngine) -> Result<(), GraphError> {
        self.t += 1;
        let alpha = self
            .schedules
            .require_alpha(self.epoch, self.step_in_epoch)?;
        let hyper = HyperValues {
            alpha,
            lambda: self.schedules.lambda(self.epoch, self.step_in_epoch),
            lower_bound: self.schedules.lower_bound(self.epoch, self.step_in_epoch),
            upper_bound: self.schedules.upper_bound(self.epoch, self.step_in_epoch),
            t: self.t,
        };
        let algorithm = self.current_algorithm().clone();
        graph.update_weights(&algorithm, &hyper)
    }

    /// 重置累积状态（步数归零；WeightStore 的草稿状态由其 reset 负责）
    pub fn reset(&mut self) {
        self.t = 0;
        self.epoch = 0;
        self.step_in_epoch = 0;
    }
}
