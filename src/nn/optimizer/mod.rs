/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 优化器：算法族（enum_dispatch 策略）+ 时变调度驱动
 */

mod adam;
mod base;
mod bounded;
mod sgd;

pub use adam::{Adam, AmsGrad, RAdam};
pub use base::{Algorithm, HyperValues, Optimizer, TraitAlgorithm};
pub use bounded::{AdaBound, AmsBound};
pub use sgd::{MomentumDescent, PlainDescent};

/// 一阶矩衰减系数（动量/Adam 系通用，固定值）
pub(in crate::nn) const BETA1: f64 = 0.9;
/// 二阶矩衰减系数
pub(in crate::nn) const BETA2: f64 = 0.999;
/// 数值稳定项
pub(in crate::nn) const EPSILON: f64 = 1e-8;

/// 权重衰减折入梯度：λ 存在时 g' = g + λ·w，不存在时跳过（与 λ=0 不同义）
pub(in crate::nn) fn apply_decay(g: f64, w: f64, lambda: Option<f64>) -> f64 {
    match lambda {
        Some(lambda) => g + lambda * w,
        None => g,
    }
}
