/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : GraphEngine 前向遍历 + 梯度检查前向
 */

use super::engine::GraphEngine;
use super::error::GraphError;
use super::merge::resolve_merge_inner;
use crate::nn::nodes::{GcPredView, GcResolver, GcScalar, ForwardView, NodeId, TraitKernel};
use crate::backend::Buffer;

impl GraphEngine {
    // ========== 常规前向 ==========

    /// 按插入序（即 id 序）逐节点前向；节点自行懒分配或校验批容量。
    /// 不触碰任何梯度状态。
    pub fn forward(&mut self) -> Result<(), GraphError> {
        if self.batch_size == 0 {
            return Err(GraphError::InvalidOperation(
                "请先调用 update_kernel 设置批大小".to_string(),
            ));
        }
        for i in 0..self.nodes.len() {
            let (before, rest) = self.nodes.split_at_mut(i);
            let node = &mut rest[0];
            node.ensure_capacity()?;
            let views: Vec<ForwardView> = node
                .predecessors()
                .iter()
                .map(|pid| before[pid.0 as usize].forward_view())
                .collect();
            node.run_forward(&views)?;
        }
        Ok(())
    }

    // ========== 梯度检查前向 ==========

    /// 同一遍历，但走 forward_gc 钩子：每个节点对每个扰动槽位各算一份
    /// what-if 输出。须在 forward 之后调用（槽位布局依赖常规输出就绪）。
    pub fn forward_gradient_check(&mut self, epsilon: f64) -> Result<(), GraphError> {
        if epsilon <= 0.0 {
            return Err(GraphError::Numeric(format!(
                "扰动步长 epsilon 必须为正，得到{epsilon}"
            )));
        }
        self.prepare_gradient_check()?;
        for i in 0..self.nodes.len() {
            let (before, rest) = self.nodes.split_at_mut(i);
            let node = &mut rest[0];
            if node.state.gc_layout.is_empty() {
                continue;
            }
            let views: Vec<GcPredView> = node
                .predecessors()
                .iter()
                .map(|pid| before[pid.0 as usize].gc_view())
                .collect();
            node.run_forward_gc(&views, epsilon)?;
        }
        Ok(())
    }

    /// 逐节点推算扰动槽位布局并分配 what-if 缓冲
    ///
    /// 布局 = 前驱可见标量（归并节点：共享祖先前缀 + 各分支私有段）+ 自身标量。
    fn prepare_gradient_check(&mut self) -> Result<(), GraphError> {
        for i in 0..self.nodes.len() {
            let (before, rest) = self.nodes.split_at_mut(i);
            let node = &mut rest[0];
            if node.state.allocated_batch == 0 {
                return Err(GraphError::ComputationError(format!(
                    "{node}没有值，请先执行 forward"
                )));
            }

            let (mut layout, mut resolver) = match node.predecessors().len() {
                0 => (Vec::new(), GcResolver::default()),
                1 => {
                    let pred = &before[node.predecessors()[0].0 as usize];
                    let inherited = pred.state.gc_layout.clone();
                    let len = inherited.len();
                    (
                        inherited,
                        GcResolver {
                            shared: 0,
                            blocks: vec![(0, len)],
                            own_start: len,
                        },
                    )
                }
                _ => {
                    let plan = resolve_merge_inner(before, node.predecessors());
                    let shared = plan.nb_same_elems;
                    let mut layout: Vec<GcScalar> = match plan.common_ancestor {
                        Some(aid) => before[aid.0 as usize].state.gc_layout.clone(),
                        None => Vec::new(),
                    };
                    let mut blocks = Vec::with_capacity(node.predecessors().len());
                    let mut cursor = shared;
                    for pid in node.predecessors() {
                        let pl = &before[pid.0 as usize].state.gc_layout;
                        let private = pl.len() - shared;
                        blocks.push((cursor, cursor + private));
                        layout.extend_from_slice(&pl[shared..]);
                        cursor += private;
                    }
                    (
                        layout,
                        GcResolver {
                            shared,
                            blocks,
                            own_start: cursor,
                        },
                    )
                }
            };

            resolver.own_start = layout.len();
            let own_id = node.id();
            layout.extend(
                (0..node.param_count()).map(|index| GcScalar {
                    owner: own_id,
                    index,
                }),
            );

            let nb_slots = 2 * layout.len();
            node.state.out_gc = Buffer::alloc(node.batch_size * nb_slots * node.out_size());
            node.state.gc_layout = layout;
            node.state.gc_resolver = resolver;
        }
        Ok(())
    }

    /// 损失节点的扰动槽位布局（槽位 2k / 2k+1 即第 k 个标量的 ±ε）
    pub fn gc_layout(&self, id: NodeId) -> Result<&[GcScalar], GraphError> {
        Ok(&self.get_node(id)?.state.gc_layout)
    }

    /// 各槽位的 what-if 损失（批均值）；配合 gc_layout 做有限差分
    pub fn gc_losses(&self, loss_id: NodeId) -> Result<Vec<f64>, GraphError> {
        let node = self.get_node(loss_id)?;
        if !node.kernel.is_loss() {
            return Err(GraphError::InvalidOperation(format!(
                "{node}不是损失节点"
            )));
        }
        let batch = node.batch_size;
        let nb_slots = 2 * node.state.gc_layout.len();
        let gc = node.state.out_gc.as_slice();
        Ok((0..nb_slots)
            .map(|slot| {
                (0..batch).map(|b| gc[b * nb_slots + slot]).sum::<f64>() / batch as f64
            })
            .collect())
    }
}
