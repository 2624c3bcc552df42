/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : MseLoss 内核：逐样本平方误差损失
 */

use super::io::{BackwardIo, ForwardIo, GcIo};
use super::TraitKernel;
use crate::backend::Buffer;
use crate::nn::graph::{GraphError, NodeKindDescriptor};

/// 平方误差：out[b] = Σ_d (x[b,d] - t[b,d])²
///
/// 图级损失取 out 的批均值；损失求导以 1/batch 播种自身 delta，
/// 反向时得到 dL/dx[b,d] = 2(x-t)/batch。
#[derive(Debug, Clone)]
pub(in crate::nn) struct MseLoss {
    size: usize,
    truth: Buffer,
}

impl MseLoss {
    pub fn new(size: usize) -> Result<Self, GraphError> {
        if size == 0 {
            return Err(GraphError::InvalidOperation(
                "MseLoss节点的宽度必须为正".to_string(),
            ));
        }
        Ok(Self {
            size,
            truth: Buffer::empty(),
        })
    }

    fn truth_checked(&self, batch: usize) -> Result<&[f64], GraphError> {
        let n = batch * self.size;
        if self.truth.len() < n {
            return Err(GraphError::ComputationError(
                "MseLoss节点尚未设置标签，或标签批大小不足".to_string(),
            ));
        }
        Ok(&self.truth.as_slice()[..n])
    }
}

impl TraitKernel for MseLoss {
    fn kind_name(&self) -> &'static str {
        "MseLoss"
    }

    fn out_size(&self) -> usize {
        1
    }

    fn validate_links(&self, pred_sizes: &[usize]) -> Result<(), GraphError> {
        if pred_sizes.len() != 1 {
            return Err(GraphError::InvalidOperation(format!(
                "MseLoss节点需要恰好1个前驱，得到{}个",
                pred_sizes.len()
            )));
        }
        if pred_sizes[0] != self.size {
            return Err(GraphError::InvalidOperation(format!(
                "MseLoss节点宽度{}与前驱宽度{}不一致",
                self.size, pred_sizes[0]
            )));
        }
        Ok(())
    }

    fn forward(&self, io: ForwardIo<'_>) -> Result<(), GraphError> {
        let truth = self.truth_checked(io.batch)?;
        let x = io.preds[0];
        for (b, out) in io.out.iter_mut().enumerate() {
            let xr = x.row(b);
            let tr = &truth[b * self.size..(b + 1) * self.size];
            let mut acc = 0.0;
            for (v, t) in xr.iter().zip(tr.iter()) {
                let diff = v - t;
                acc += diff * diff;
            }
            *out = acc;
        }
        Ok(())
    }

    fn forward_gc(&self, io: GcIo<'_>) -> Result<(), GraphError> {
        let truth = self.truth_checked(io.batch)?;
        let out_gc = io.out_gc;
        for b in 0..io.batch {
            let tr = &truth[b * self.size..(b + 1) * self.size];
            for slot in 0..io.nb_slots {
                let x = io.preds[0].row(b, io.resolver, 0, slot);
                let mut acc = 0.0;
                for (v, t) in x.iter().zip(tr.iter()) {
                    let diff = v - t;
                    acc += diff * diff;
                }
                out_gc[b * io.nb_slots + slot] = acc;
            }
        }
        Ok(())
    }

    fn backward(&mut self, io: BackwardIo<'_, '_>) -> Result<(), GraphError> {
        let truth = self.truth_checked(io.batch)?;
        let delta = io.delta;
        let pred = &mut io.preds[0];
        if let Some(sink) = pred.delta.as_mut() {
            let x = pred.out;
            for b in 0..io.batch {
                for d in 0..self.size {
                    let j = b * self.size + d;
                    sink.contribute(j, delta[b] * 2.0 * (x[j] - truth[j]));
                }
            }
        }
        Ok(())
    }

    fn is_loss(&self) -> bool {
        true
    }

    fn set_ground_truth(&mut self, truth: &[f64], batch: usize) -> Result<(), GraphError> {
        let n = batch * self.size;
        if truth.len() != n {
            return Err(GraphError::SizeMismatch {
                expected: n,
                got: truth.len(),
            });
        }
        if self.truth.len() != n {
            self.truth = Buffer::alloc(n);
        }
        self.truth.write_all(truth)?;
        Ok(())
    }

    fn descriptor(&self) -> NodeKindDescriptor {
        NodeKindDescriptor::MseLoss { size: self.size }
    }
}
