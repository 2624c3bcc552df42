/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : GraphEngine 反向遍历（dirty 协议）与优化器更新入口
 */

use super::engine::GraphEngine;
use super::error::GraphError;
use crate::nn::nodes::{Node, NodeId, PredGrad, TraitKernel};
use crate::nn::optimizer::{Algorithm, HyperValues, Optimizer, TraitAlgorithm};
use std::collections::HashMap;

impl GraphEngine {
    /// 损失求导：反向周期的种子，写损失节点自身 delta 并清掉其 dirty
    pub fn loss_derivative(&mut self, loss_id: NodeId) -> Result<(), GraphError> {
        self.get_node_mut(loss_id)?.seed_loss_derivative()
    }

    /// 按逆插入序逐节点反向
    ///
    /// dirty 的节点本周期尚未收到任何有效梯度贡献，整体跳过——提前终止的
    /// 分支（脱离子图）由此自然被略过，无需特判。非 dirty 节点执行反向钩子
    /// （写前驱梯度：前驱 dirty 则覆盖、否则累加），随后若 must_compute_backward
    /// 则 propagate_dirty：把每个直接前驱标记为非 dirty。
    pub fn backward(&mut self) -> Result<(), GraphError> {
        for i in (0..self.nodes.len()).rev() {
            let (before, rest) = self.nodes.split_at_mut(i);
            let node = &mut rest[0];
            if node.is_dirty() {
                continue;
            }
            let mut preds = collect_preds_mut(before, node.predecessors())?;
            {
                let mut views: Vec<PredGrad> =
                    preds.iter_mut().map(|p| p.grad_view()).collect();
                node.run_backward(&mut views)?;
            }
            if node.must_compute_backward() {
                // propagate_dirty：向所有直接前驱宣告"本周期已写入有效梯度，
                // 后续贡献须累加而非覆盖"
                for p in &mut preds {
                    p.dirty = false;
                }
            }
        }
        Ok(())
    }

    /// 对每个可训练节点执行优化器步
    pub fn update(&mut self, optimizer: &mut Optimizer) -> Result<(), GraphError> {
        optimizer.step(self)
    }

    pub(in crate::nn) fn update_weights(
        &mut self,
        algorithm: &Algorithm,
        hyper: &HyperValues,
    ) -> Result<(), GraphError> {
        for node in &mut self.nodes {
            // dirty 节点本周期没跑反向，梯度是陈旧的，不得消费
            if node.is_dirty() {
                continue;
            }
            for store in node.kernel.weight_stores_mut() {
                algorithm.step(store, hyper)?;
            }
        }
        Ok(())
    }
}

/// 从前缀切片中按前驱顺序取出互不重叠的可变引用
fn collect_preds_mut<'a>(
    before: &'a mut [Node],
    ids: &[NodeId],
) -> Result<Vec<&'a mut Node>, GraphError> {
    let mut found: HashMap<u64, &'a mut Node> = HashMap::with_capacity(ids.len());
    for (j, node) in before.iter_mut().enumerate() {
        if ids.contains(&NodeId(j as u64)) {
            found.insert(j as u64, node);
        }
    }
    ids.iter()
        .map(|id| found.remove(&id.0).ok_or(GraphError::NodeNotFound(*id)))
        .collect()
}
