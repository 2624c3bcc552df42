/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : Tanh 激活内核
 */

use super::io::{BackwardIo, ForwardIo, GcIo};
use super::TraitKernel;
use crate::nn::graph::{GraphError, NodeKindDescriptor};

/// 逐元素 tanh，无参数
#[derive(Debug, Clone)]
pub(in crate::nn) struct Tanh {
    size: usize,
}

impl Tanh {
    pub fn new(size: usize) -> Result<Self, GraphError> {
        if size == 0 {
            return Err(GraphError::InvalidOperation(
                "Tanh节点的宽度必须为正".to_string(),
            ));
        }
        Ok(Self { size })
    }
}

impl TraitKernel for Tanh {
    fn kind_name(&self) -> &'static str {
        "Tanh"
    }

    fn out_size(&self) -> usize {
        self.size
    }

    fn validate_links(&self, pred_sizes: &[usize]) -> Result<(), GraphError> {
        if pred_sizes.len() != 1 {
            return Err(GraphError::InvalidOperation(format!(
                "Tanh节点需要恰好1个前驱，得到{}个",
                pred_sizes.len()
            )));
        }
        if pred_sizes[0] != self.size {
            return Err(GraphError::InvalidOperation(format!(
                "Tanh节点宽度{}与前驱宽度{}不一致",
                self.size, pred_sizes[0]
            )));
        }
        Ok(())
    }

    fn forward(&self, io: ForwardIo<'_>) -> Result<(), GraphError> {
        let x = io.preds[0].out;
        for (o, v) in io.out.iter_mut().zip(x.iter()) {
            *o = v.tanh();
        }
        Ok(())
    }

    fn forward_gc(&self, io: GcIo<'_>) -> Result<(), GraphError> {
        let out_gc = io.out_gc;
        for b in 0..io.batch {
            for slot in 0..io.nb_slots {
                let x = io.preds[0].row(b, io.resolver, 0, slot);
                let base = (b * io.nb_slots + slot) * self.size;
                for (d, v) in x.iter().enumerate() {
                    out_gc[base + d] = v.tanh();
                }
            }
        }
        Ok(())
    }

    // d tanh(x)/dx = 1 - tanh(x)^2，直接用自身输出
    fn backward(&mut self, io: BackwardIo<'_, '_>) -> Result<(), GraphError> {
        let pred = &mut io.preds[0];
        if let Some(sink) = pred.delta.as_mut() {
            for j in 0..io.batch * self.size {
                sink.contribute(j, io.delta[j] * (1.0 - io.out[j] * io.out[j]));
            }
        }
        Ok(())
    }

    fn descriptor(&self) -> NodeKindDescriptor {
        NodeKindDescriptor::Tanh { size: self.size }
    }
}
