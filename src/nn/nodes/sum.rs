/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : Sum 内核：多前驱逐元素求和（归并节点）
 */

use super::io::{BackwardIo, ForwardIo, GcIo};
use super::TraitKernel;
use crate::nn::graph::{GraphError, NodeKindDescriptor};

/// N ≥ 2 个同宽前驱的逐元素和
#[derive(Debug, Clone)]
pub(in crate::nn) struct Sum {
    size: usize,
}

impl Sum {
    pub fn new(size: usize) -> Result<Self, GraphError> {
        if size == 0 {
            return Err(GraphError::InvalidOperation(
                "Sum节点的宽度必须为正".to_string(),
            ));
        }
        Ok(Self { size })
    }
}

impl TraitKernel for Sum {
    fn kind_name(&self) -> &'static str {
        "Sum"
    }

    fn out_size(&self) -> usize {
        self.size
    }

    fn validate_links(&self, pred_sizes: &[usize]) -> Result<(), GraphError> {
        if pred_sizes.len() < 2 {
            return Err(GraphError::InvalidOperation(
                "Sum节点至少需要2个前驱".to_string(),
            ));
        }
        for &s in pred_sizes {
            if s != self.size {
                return Err(GraphError::InvalidOperation(format!(
                    "Sum节点宽度{}与前驱宽度{}不一致",
                    self.size, s
                )));
            }
        }
        Ok(())
    }

    fn forward(&self, io: ForwardIo<'_>) -> Result<(), GraphError> {
        io.out.fill(0.0);
        for pred in io.preds {
            for (o, v) in io.out.iter_mut().zip(pred.out.iter()) {
                *o += v;
            }
        }
        Ok(())
    }

    fn forward_gc(&self, io: GcIo<'_>) -> Result<(), GraphError> {
        let out_gc = io.out_gc;
        for b in 0..io.batch {
            for slot in 0..io.nb_slots {
                let base = (b * io.nb_slots + slot) * self.size;
                out_gc[base..base + self.size].fill(0.0);
                for (branch, pred) in io.preds.iter().enumerate() {
                    let x = pred.row(b, io.resolver, branch, slot);
                    for (d, v) in x.iter().enumerate() {
                        out_gc[base + d] += v;
                    }
                }
            }
        }
        Ok(())
    }

    // 和的梯度对每个前驱都是恒等映射
    fn backward(&mut self, io: BackwardIo<'_, '_>) -> Result<(), GraphError> {
        let n = io.batch * self.size;
        for pred in io.preds.iter_mut() {
            if let Some(sink) = pred.delta.as_mut() {
                for j in 0..n {
                    sink.contribute(j, io.delta[j]);
                }
            }
        }
        Ok(())
    }

    fn descriptor(&self) -> NodeKindDescriptor {
        NodeKindDescriptor::Sum { size: self.size }
    }
}
