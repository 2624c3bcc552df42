/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : Adam 系算法：Adam / AMSGrad / Rectified Adam
 */

use super::base::{HyperValues, TraitAlgorithm};
use super::{apply_decay, BETA1, BETA2, EPSILON};
use crate::nn::graph::GraphError;
use crate::nn::weights::WeightStore;

/// 标准 Adam：一阶/二阶矩估计 + 偏差修正
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Adam;

impl TraitAlgorithm for Adam {
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError> {
        let t = hyper.t as i32;
        let v = weights.views_mut();
        for i in 0..v.value.len() {
            let g = apply_decay(v.gradient[i], v.value[i], hyper.lambda);
            v.momentum[i] = BETA1 * v.momentum[i] + (1.0 - BETA1) * g;
            v.velocity[i] = BETA2 * v.velocity[i] + (1.0 - BETA2) * g * g;
            let m_hat = v.momentum[i] / (1.0 - BETA1.powi(t));
            let v_hat = v.velocity[i] / (1.0 - BETA2.powi(t));
            v.value[i] -= hyper.alpha * m_hat / (v_hat.sqrt() + EPSILON);
        }
        Ok(())
    }
}

/// AMSGrad：二阶矩取历史最大（velocity_hat 单调不减）再做偏差修正
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmsGrad;

impl TraitAlgorithm for AmsGrad {
    fn name(&self) -> &'static str {
        "AMSGrad"
    }

    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError> {
        let t = hyper.t as i32;
        let v = weights.views_mut();
        for i in 0..v.value.len() {
            let g = apply_decay(v.gradient[i], v.value[i], hyper.lambda);
            v.momentum[i] = BETA1 * v.momentum[i] + (1.0 - BETA1) * g;
            v.velocity[i] = BETA2 * v.velocity[i] + (1.0 - BETA2) * g * g;
            v.velocity_hat[i] = v.velocity_hat[i].max(v.velocity[i]);
            let m_hat = v.momentum[i] / (1.0 - BETA1.powi(t));
            let v_hat = v.velocity_hat[i] / (1.0 - BETA2.powi(t));
            v.value[i] -= hyper.alpha * m_hat / (v_hat.sqrt() + EPSILON);
        }
        Ok(())
    }
}

/// Rectified Adam：方差可整流阈值 ρₜ > 5 时按整流系数用二阶矩，
/// 否则退化为 w -= α·m̂（不用方差项）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RAdam;

impl RAdam {
    /// ρ∞ = 2/(1−β₂) − 1
    fn rho_inf() -> f64 {
        2.0 / (1.0 - BETA2) - 1.0
    }

    fn rho_t(t: usize) -> f64 {
        let beta2_t = BETA2.powi(t as i32);
        Self::rho_inf() - 2.0 * t as f64 * beta2_t / (1.0 - beta2_t)
    }
}

impl TraitAlgorithm for RAdam {
    fn name(&self) -> &'static str {
        "RAdam"
    }

    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError> {
        let t = hyper.t as i32;
        let rho_inf = Self::rho_inf();
        let rho_t = Self::rho_t(hyper.t);
        let rectified = rho_t > 5.0;
        let rect = if rectified {
            (((rho_t - 4.0) * (rho_t - 2.0) * rho_inf)
                / ((rho_inf - 4.0) * (rho_inf - 2.0) * rho_t))
                .sqrt()
        } else {
            0.0
        };

        let v = weights.views_mut();
        for i in 0..v.value.len() {
            let g = apply_decay(v.gradient[i], v.value[i], hyper.lambda);
            v.momentum[i] = BETA1 * v.momentum[i] + (1.0 - BETA1) * g;
            v.velocity[i] = BETA2 * v.velocity[i] + (1.0 - BETA2) * g * g;
            let m_hat = v.momentum[i] / (1.0 - BETA1.powi(t));
            if rectified {
                let v_hat = (v.velocity[i] / (1.0 - BETA2.powi(t))).sqrt();
                v.value[i] -= hyper.alpha * rect * m_hat / (v_hat + EPSILON);
            } else {
                v.value[i] -= hyper.alpha * m_hat;
            }
        }
        Ok(())
    }
}
