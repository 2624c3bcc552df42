/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 有界变体：AdaBound / AMSBound
 *
 * 先按 Adam/AMSGrad 公式算出逐标量的有效学习率，再夹到
 * [lowerBound, upperBound] 之间乘以 m̂。两个界的调度对这两个变体是必需的，
 * 缺失即报错；λ 仍然可选。
 */

use super::base::{HyperValues, TraitAlgorithm};
use super::{apply_decay, BETA1, BETA2, EPSILON};
use crate::nn::graph::GraphError;
use crate::nn::weights::WeightStore;

fn require_bounds(hyper: &HyperValues, which: &str) -> Result<(f64, f64), GraphError> {
    let lower = hyper.lower_bound.ok_or_else(|| {
        GraphError::InvalidOperation(format!("{which}需要 lowerBound 调度"))
    })?;
    let upper = hyper.upper_bound.ok_or_else(|| {
        GraphError::InvalidOperation(format!("{which}需要 upperBound 调度"))
    })?;
    Ok((lower, upper))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdaBound;

impl TraitAlgorithm for AdaBound {
    fn name(&self) -> &'static str {
        "AdaBound"
    }

    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError> {
        let (lower, upper) = require_bounds(hyper, "AdaBound")?;
        let t = hyper.t as i32;
        let v = weights.views_mut();
        for i in 0..v.value.len() {
            let g = apply_decay(v.gradient[i], v.value[i], hyper.lambda);
            v.momentum[i] = BETA1 * v.momentum[i] + (1.0 - BETA1) * g;
            v.velocity[i] = BETA2 * v.velocity[i] + (1.0 - BETA2) * g * g;
            let m_hat = v.momentum[i] / (1.0 - BETA1.powi(t));
            let v_hat = v.velocity[i] / (1.0 - BETA2.powi(t));
            let eta = (hyper.alpha / (v_hat.sqrt() + EPSILON)).clamp(lower, upper);
            v.value[i] -= eta * m_hat;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmsBound;

impl TraitAlgorithm for AmsBound {
    fn name(&self) -> &'static str {
        "AMSBound"
    }

    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError> {
        let (lower, upper) = require_bounds(hyper, "AMSBound")?;
        let t = hyper.t as i32;
        let v = weights.views_mut();
        for i in 0..v.value.len() {
            let g = apply_decay(v.gradient[i], v.value[i], hyper.lambda);
            v.momentum[i] = BETA1 * v.momentum[i] + (1.0 - BETA1) * g;
            v.velocity[i] = BETA2 * v.velocity[i] + (1.0 - BETA2) * g * g;
            v.velocity_hat[i] = v.velocity_hat[i].max(v.velocity[i]);
            let m_hat = v.momentum[i] / (1.0 - BETA1.powi(t));
            let v_hat = v.velocity_hat[i] / (1.0 - BETA2.powi(t));
            let eta = (hyper.alpha / (v_hat.sqrt() + EPSILON)).clamp(lower, upper);
            v.value[i] -= eta * m_hat;
        }
        Ok(())
    }
}
