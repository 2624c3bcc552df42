/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : Linear 内核：全连接层（权重网格 + 偏置网格）
 */

use super::io::{BackwardIo, ForwardIo, GcIo};
use super::TraitKernel;
use crate::backend::{Device, ExecutionContext};
use crate::nn::graph::{GraphError, NodeKindDescriptor};
use crate::nn::weights::WeightStore;
use crate::utils::parallel_for_slices;
use rand::{Rng, RngCore};

/// 全连接：out[b,o] = Σ_i w[o,i]·x[b,i] + bias[o]
///
/// 可训练标量顺序：先权重网格（行主序 o*in+i），后偏置网格。
#[derive(Debug, Clone)]
pub(in crate::nn) struct Linear {
    in_size: usize,
    out_size: usize,
    weights: WeightStore,
    bias: WeightStore,
    /// 权重值已就位（随机初始化过或从外部装载过）
    params_inited: bool,
}

impl Linear {
    pub fn new(in_size: usize, out_size: usize) -> Result<Self, GraphError> {
        if in_size == 0 || out_size == 0 {
            return Err(GraphError::InvalidOperation(format!(
                "Linear节点的输入/输出宽度必须为正，得到{in_size}x{out_size}"
            )));
        }
        Ok(Self {
            in_size,
            out_size,
            weights: WeightStore::new(in_size * out_size),
            bias: WeightStore::new(out_size),
            params_inited: false,
        })
    }
}

impl TraitKernel for Linear {
    fn kind_name(&self) -> &'static str {
        "Linear"
    }

    fn out_size(&self) -> usize {
        self.out_size
    }

    fn param_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn validate_links(&self, pred_sizes: &[usize]) -> Result<(), GraphError> {
        if pred_sizes.len() != 1 {
            return Err(GraphError::InvalidOperation(format!(
                "Linear节点需要恰好1个前驱，得到{}个",
                pred_sizes.len()
            )));
        }
        if pred_sizes[0] != self.in_size {
            return Err(GraphError::InvalidOperation(format!(
                "Linear节点输入宽度{}与前驱宽度{}不一致",
                self.in_size, pred_sizes[0]
            )));
        }
        Ok(())
    }

    fn init_kernel(
        &mut self,
        ctx: &ExecutionContext,
        rng: &mut dyn RngCore,
    ) -> Result<(), GraphError> {
        if self.params_inited {
            return Ok(());
        }
        match ctx.device() {
            Device::Cpu => {}
        }
        // Xavier 均匀初始化，偏置置零
        let limit = (6.0 / (self.in_size + self.out_size) as f64).sqrt();
        for w in self.weights.value_mut() {
            *w = rng.gen_range(-limit..limit);
        }
        self.bias.value_mut().fill(0.0);
        self.params_inited = true;
        Ok(())
    }

    fn forward(&self, io: ForwardIo<'_>) -> Result<(), GraphError> {
        let x = io.preds[0];
        let w = self.weights.value();
        let bias = self.bias.value();
        let in_size = self.in_size;
        parallel_for_slices(io.out, self.out_size, |b, row| {
            let xr = x.row(b);
            for (o, out) in row.iter_mut().enumerate() {
                let mut acc = bias[o];
                for (i, v) in xr.iter().enumerate() {
                    acc += w[o * in_size + i] * v;
                }
                *out = acc;
            }
        });
        Ok(())
    }

    fn forward_gc(&self, io: GcIo<'_>) -> Result<(), GraphError> {
        let out_gc = io.out_gc;
        let w = self.weights.value();
        let bias = self.bias.value();
        let w_len = w.len();
        for b in 0..io.batch {
            for slot in 0..io.nb_slots {
                let x = io.preds[0].row(b, io.resolver, 0, slot);
                let base = (b * io.nb_slots + slot) * self.out_size;
                for o in 0..self.out_size {
                    let mut acc = bias[o];
                    for (i, v) in x.iter().enumerate() {
                        acc += w[o * self.in_size + i] * v;
                    }
                    out_gc[base + o] = acc;
                }
                // 本槽位若扰动自身某个标量，在线性输出上等价于补一个增量项
                if let Some((p, sign)) = io.resolver.own_perturbation(slot) {
                    let eps = sign * io.epsilon;
                    if p < w_len {
                        let o = p / self.in_size;
                        let i = p % self.in_size;
                        out_gc[base + o] += eps * x[i];
                    } else {
                        out_gc[base + (p - w_len)] += eps;
                    }
                }
            }
        }
        Ok(())
    }

    fn backward(&mut self, io: BackwardIo<'_, '_>) -> Result<(), GraphError> {
        let x = io.preds[0].out;
        let delta = io.delta;
        let (in_size, out_size) = (self.in_size, self.out_size);

        // 权重梯度：整批累加，本周期覆盖写
        {
            let grad_w = self.weights.gradient_mut();
            for o in 0..out_size {
                for i in 0..in_size {
                    let mut g = 0.0;
                    for b in 0..io.batch {
                        g += delta[b * out_size + o] * x[b * in_size + i];
                    }
                    grad_w[o * in_size + i] = g;
                }
            }
        }
        {
            let grad_b = self.bias.gradient_mut();
            for o in 0..out_size {
                let mut g = 0.0;
                for b in 0..io.batch {
                    g += delta[b * out_size + o];
                }
                grad_b[o] = g;
            }
        }

        // 前驱贡献：c[b,i] = Σ_o delta[b,o]·w[o,i]
        let w = self.weights.value();
        let pred = &mut io.preds[0];
        if let Some(sink) = pred.delta.as_mut() {
            for b in 0..io.batch {
                for i in 0..in_size {
                    let mut c = 0.0;
                    for o in 0..out_size {
                        c += delta[b * out_size + o] * w[o * in_size + i];
                    }
                    sink.contribute(b * in_size + i, c);
                }
            }
        }
        Ok(())
    }

    fn weight_stores(&self) -> Vec<&WeightStore> {
        vec![&self.weights, &self.bias]
    }

    fn weight_stores_mut(&mut self) -> Vec<&mut WeightStore> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn mark_params_loaded(&mut self) {
        self.params_inited = true;
    }

    fn descriptor(&self) -> NodeKindDescriptor {
        NodeKindDescriptor::Linear {
            in_size: self.in_size,
            out_size: self.out_size,
        }
    }
}
