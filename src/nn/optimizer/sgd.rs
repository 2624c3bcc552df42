/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 朴素梯度下降与动量下降
 */

use super::base::{HyperValues, TraitAlgorithm};
use super::{apply_decay, BETA1};
use crate::nn::graph::GraphError;
use crate::nn::weights::WeightStore;

/// w -= α·g'
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlainDescent;

impl TraitAlgorithm for PlainDescent {
    fn name(&self) -> &'static str {
        "PlainDescent"
    }

    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError> {
        let v = weights.views_mut();
        for i in 0..v.value.len() {
            let g = apply_decay(v.gradient[i], v.value[i], hyper.lambda);
            v.value[i] -= hyper.alpha * g;
        }
        Ok(())
    }
}

/// m = β₁·m + α·g'；w -= m
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MomentumDescent;

impl TraitAlgorithm for MomentumDescent {
    fn name(&self) -> &'static str {
        "MomentumDescent"
    }

    fn step(&self, weights: &mut WeightStore, hyper: &HyperValues) -> Result<(), GraphError> {
        let v = weights.views_mut();
        for i in 0..v.value.len() {
            let g = apply_decay(v.gradient[i], v.value[i], hyper.lambda);
            v.momentum[i] = BETA1 * v.momentum[i] + hyper.alpha * g;
            v.value[i] -= v.momentum[i];
        }
        Ok(())
    }
}
