/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : Node：图顶点的通用骨架（id、前驱链接、dirty 协议、批状态）
 */

use super::io::{BackwardIo, DeltaSink, ForwardIo, ForwardView, GcIo, GcPredView, GcResolver, GcScalar, PredGrad};
use super::{KernelType, NodeId, TraitKernel};
use crate::backend::{Buffer, ExecutionContext};
use crate::nn::graph::GraphError;
use rand::RngCore;
use std::fmt;

/// 批相关的内核状态缓冲
///
/// out/delta 都是行主序、批主序的扁平数组；out_gc 只在梯度检查时分配。
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct KernelState {
    pub out: Buffer,
    pub delta: Buffer,
    /// 0 表示尚未分配；分配后批大小只能缩不能涨（涨是 BatchSize 错误）
    pub allocated_batch: usize,
    pub out_gc: Buffer,
    /// 可见可训练标量布局（含自身），顺序即扰动槽位顺序
    pub gc_layout: Vec<GcScalar>,
    pub gc_resolver: GcResolver,
}

/// 图顶点：不拥有前驱，所有节点归 GraphEngine 所有
#[derive(Debug)]
pub struct Node {
    pub(in crate::nn) id: NodeId,
    pub(in crate::nn) name: String,
    pub(in crate::nn) predecessor_ids: Vec<NodeId>,
    /// true 表示本节点累积的反向梯度已过期，下次贡献须覆盖写而非累加
    pub(in crate::nn) dirty: bool,
    pub(in crate::nn) batch_size: usize,
    /// 是否需要物化反向梯度状态（真输入边界节点为 false）
    pub(in crate::nn) compute_delta: bool,
    /// 派生标志：至少一个前驱需要梯度流
    pub(in crate::nn) must_compute_backward: bool,
    pub(in crate::nn) inited: bool,
    pub(in crate::nn) kernel: KernelType,
    pub(in crate::nn) state: KernelState,
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            predecessor_ids: self.predecessor_ids.clone(),
            dirty: self.dirty,
            batch_size: self.batch_size,
            compute_delta: self.compute_delta,
            must_compute_backward: self.must_compute_backward,
            inited: self.inited,
            kernel: self.kernel.clone(),
            state: self.state.clone(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "节点{}(id={})", self.name, self.id)
    }
}

impl Node {
    pub(in crate::nn) fn new(
        id: NodeId,
        name: String,
        kernel: KernelType,
        predecessor_ids: Vec<NodeId>,
    ) -> Self {
        let compute_delta = !kernel.accepts_external_value();
        Self {
            id,
            name,
            predecessor_ids,
            dirty: true,
            batch_size: 0,
            compute_delta,
            must_compute_backward: false,
            inited: false,
            kernel,
            state: KernelState::default(),
        }
    }

    // ========== 只读访问 ==========

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessor_ids
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn compute_delta(&self) -> bool {
        self.compute_delta
    }

    pub fn must_compute_backward(&self) -> bool {
        self.must_compute_backward
    }

    pub fn out_size(&self) -> usize {
        self.kernel.out_size()
    }

    pub fn param_count(&self) -> usize {
        self.kernel.param_count()
    }

    pub fn is_trainable(&self) -> bool {
        self.kernel.param_count() > 0
    }

    pub fn kind_name(&self) -> &'static str {
        self.kernel.kind_name()
    }

    // ========== 生命周期钩子 ==========

    /// 懒分配或校验批容量：已有分配但批更大时报 BatchSize，绝不悄悄重分配
    pub(in crate::nn) fn ensure_capacity(&mut self) -> Result<(), GraphError> {
        let batch = self.batch_size;
        if batch == 0 {
            return Err(GraphError::BatchSize {
                requested: 0,
                allocated: self.state.allocated_batch,
            });
        }
        let size = self.kernel.out_size();
        if self.state.allocated_batch == 0 {
            self.state.out = Buffer::alloc(batch * size);
            if self.compute_delta {
                self.state.delta = Buffer::alloc(batch * size);
            }
            self.state.allocated_batch = batch;
        } else if batch > self.state.allocated_batch {
            return Err(GraphError::BatchSize {
                requested: batch,
                allocated: self.state.allocated_batch,
            });
        }
        Ok(())
    }

    /// 清空批相关状态；权重（硬资源）不受影响
    pub(in crate::nn) fn reset_kernel(&mut self) {
        self.state = KernelState::default();
    }

    pub(in crate::nn) fn run_init(
        &mut self,
        ctx: &ExecutionContext,
        rng: &mut dyn RngCore,
    ) -> Result<(), GraphError> {
        if self.inited {
            return Ok(());
        }
        self.kernel.init_kernel(ctx, rng)?;
        self.inited = true;
        Ok(())
    }

    // ========== 前向 ==========

    pub(in crate::nn) fn forward_view(&self) -> ForwardView<'_> {
        let size = self.kernel.out_size();
        ForwardView {
            out: &self.state.out.as_slice()[..self.batch_size * size],
            size,
        }
    }

    pub(in crate::nn) fn run_forward(&mut self, preds: &[ForwardView<'_>]) -> Result<(), GraphError> {
        let batch = self.batch_size;
        let size = self.kernel.out_size();
        let Self { kernel, state, .. } = self;
        let io = ForwardIo {
            out: &mut state.out.as_mut_slice()[..batch * size],
            preds,
            batch,
        };
        kernel.forward(io)
    }

    // ========== 反向 ==========

    /// 把本节点交给某个消费者写梯度贡献时的视图
    pub(in crate::nn) fn grad_view(&mut self) -> PredGrad<'_> {
        let size = self.kernel.out_size();
        let n = self.batch_size * size;
        let compute = self.compute_delta;
        let overwrite = self.dirty;
        let KernelState { out, delta, .. } = &mut self.state;
        PredGrad {
            out: &out.as_slice()[..n],
            size,
            delta: if compute {
                Some(DeltaSink::new(&mut delta.as_mut_slice()[..n], overwrite))
            } else {
                None
            },
        }
    }

    pub(in crate::nn) fn run_backward(
        &mut self,
        preds: &mut [PredGrad<'_>],
    ) -> Result<(), GraphError> {
        let batch = self.batch_size;
        let n = batch * self.kernel.out_size();
        let Self { kernel, state, .. } = self;
        let delta_len = state.delta.len().min(n);
        let io = BackwardIo {
            out: &state.out.as_slice()[..n],
            delta: &state.delta.as_slice()[..delta_len],
            preds,
            batch,
        };
        kernel.backward(io)
    }

    /// 损失求导：反向周期的种子，写自身 delta 并清掉 dirty
    pub(in crate::nn) fn seed_loss_derivative(&mut self) -> Result<(), GraphError> {
        if !self.kernel.is_loss() {
            return Err(GraphError::InvalidOperation(format!(
                "{}不是损失节点，无法做损失求导",
                self
            )));
        }
        if self.state.allocated_batch == 0 {
            return Err(GraphError::ComputationError(format!(
                "{}没有值，请先执行 forward",
                self
            )));
        }
        let batch = self.batch_size;
        let n = batch * self.kernel.out_size();
        let seed = 1.0 / batch as f64;
        for v in &mut self.state.delta.as_mut_slice()[..n] {
            *v = seed;
        }
        self.dirty = false;
        Ok(())
    }

    // ========== 梯度检查 ==========

    pub(in crate::nn) fn gc_view(&self) -> GcPredView<'_> {
        let size = self.kernel.out_size();
        let nb_slots = 2 * self.state.gc_layout.len();
        GcPredView {
            out: &self.state.out.as_slice()[..self.batch_size * size],
            out_gc: self.state.out_gc.as_slice(),
            size,
            nb_slots,
        }
    }

    pub(in crate::nn) fn run_forward_gc(
        &mut self,
        preds: &[GcPredView<'_>],
        epsilon: f64,
    ) -> Result<(), GraphError> {
        let batch = self.batch_size;
        let nb_slots = 2 * self.state.gc_layout.len();
        if nb_slots == 0 {
            return Ok(());
        }
        let size = self.kernel.out_size();
        let Self { kernel, state, .. } = self;
        let KernelState {
            out_gc,
            gc_resolver,
            ..
        } = state;
        let io = GcIo {
            out_gc: &mut out_gc.as_mut_slice()[..batch * nb_slots * size],
            preds,
            batch,
            nb_slots,
            resolver: gc_resolver,
            epsilon,
        };
        kernel.forward_gc(io)
    }
}
