/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 梯度检查：有限差分验证解析反向传播
 *
 * 不需要第二份微积分实现：先跑一轮常规 forward/backward 得到解析梯度，
 * 再跑一遍梯度检查前向，逐可训练标量做 (Loss(w+ε) − Loss(w−ε)) / 2ε，
 * 与解析梯度做相对差比较。ε 太小在有限精度下会产生假失败，这是已知的
 * 抖动来源，带上限的重试由上层调用者负责；本核心只保证比较函数确定、
 * 可重放。
 */

use super::graph::{GraphEngine, GraphError};
use super::nodes::NodeId;
use log::warn;

/// 相对差：|a − b| / max(|a|, |b|, floor)
///
/// floor 防止两个量都接近零时相对差爆炸。纯函数，可重放。
pub fn relative_difference(a: f64, b: f64, floor: f64) -> f64 {
    (a - b).abs() / a.abs().max(b.abs()).max(floor)
}

/// 单个可训练标量的检查结果
#[derive(Debug, Clone, PartialEq)]
pub struct GradientCheckEntry {
    pub owner: NodeId,
    /// 节点内标量下标（权重网格拼接序）
    pub index: usize,
    pub analytic: f64,
    pub estimate: f64,
    pub relative: f64,
    pub passed: bool,
}

/// 整图检查报告
#[derive(Debug, Clone, PartialEq)]
pub struct GradientCheckReport {
    pub tolerance: f64,
    pub entries: Vec<GradientCheckEntry>,
}

impl GradientCheckReport {
    pub fn passed(&self) -> bool {
        self.entries.iter().all(|e| e.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.passed).count()
    }

    /// 相对差最大的一项
    pub fn worst(&self) -> Option<&GradientCheckEntry> {
        self.entries
            .iter()
            .max_by(|a, b| a.relative.total_cmp(&b.relative))
    }

    /// 失败即转为 Numeric 错误（向调用者显式上报，绝不静默忽略）
    pub fn ensure_passed(&self) -> Result<(), GraphError> {
        if self.passed() {
            return Ok(());
        }
        let worst = self.worst().map_or(f64::NAN, |e| e.relative);
        Err(GraphError::Numeric(format!(
            "梯度检查未通过：{}/{}个标量超出容差{}，最大相对差{:.3e}",
            self.failed_count(),
            self.entries.len(),
            self.tolerance,
            worst
        )))
    }
}

/// 梯度检查器
///
/// ε 与容差刻意不设默认值：合适的取值依赖层类型与数值精度，由调用者选择。
#[derive(Debug, Clone, Copy)]
pub struct GradientChecker {
    epsilon: f64,
    tolerance: f64,
    floor: f64,
}

impl GradientChecker {
    pub fn new(epsilon: f64, tolerance: f64, floor: f64) -> Result<Self, GraphError> {
        if epsilon <= 0.0 {
            return Err(GraphError::Numeric(format!(
                "扰动步长 epsilon 必须为正，得到{epsilon}"
            )));
        }
        if tolerance <= 0.0 {
            return Err(GraphError::Numeric(format!(
                "容差必须为正，得到{tolerance}"
            )));
        }
        if floor <= 0.0 {
            return Err(GraphError::Numeric(format!(
                "相对差下限 floor 必须为正，得到{floor}"
            )));
        }
        Ok(Self {
            epsilon,
            tolerance,
            floor,
        })
    }

    pub const fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// 对图中全部可训练标量做检查
    ///
    /// 调用前置条件：已 update_kernel 并置入输入与标签。本方法自己驱动
    /// 解析周期（forward → loss_derivative → backward）与检查前向，
    /// 不会执行优化器更新。
    pub fn check(
        &self,
        graph: &mut GraphEngine,
        loss_id: NodeId,
    ) -> Result<GradientCheckReport, GraphError> {
        graph.forward()?;
        graph.loss_derivative(loss_id)?;
        graph.backward()?;
        graph.forward_gradient_check(self.epsilon)?;

        let losses = graph.gc_losses(loss_id)?;
        let layout = graph.gc_layout(loss_id)?.to_vec();
        let mut entries = Vec::with_capacity(layout.len());
        for (k, scalar) in layout.iter().enumerate() {
            let estimate = (losses[2 * k] - losses[2 * k + 1]) / (2.0 * self.epsilon);
            let analytic = graph.weight_gradient_scalar(scalar.owner, scalar.index)?;
            let relative = relative_difference(estimate, analytic, self.floor);
            let passed = relative <= self.tolerance;
            if !passed {
                warn!(
                    "梯度检查未通过：节点(id={})第{}个标量，解析{analytic:.6e}，数值{estimate:.6e}，相对差{relative:.3e}",
                    scalar.owner, scalar.index
                );
            }
            entries.push(GradientCheckEntry {
                owner: scalar.owner,
                index: scalar.index,
                analytic,
                estimate,
                relative,
                passed,
            });
        }
        Ok(GradientCheckReport {
            tolerance: self.tolerance,
            entries,
        })
    }
}
