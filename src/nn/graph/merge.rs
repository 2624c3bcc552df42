/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 归并推算（MergeReconciler）：多前驱节点的分支回溯
 *
 * 服务两个消费者：梯度检查的槽位记账（叉点前的权重占共享槽位，叉点后的
 * 权重只属于所在分支），以及归并节点的 dirty 传播语义（所有直接前驱都要
 * 标记，而非只标记一个——反向遍历里对全部前驱统一处理即是）。
 */

use super::engine::GraphEngine;
use super::error::GraphError;
use crate::nn::nodes::{Node, NodeId};

/// 归并图中的一个节点：按 id 降序排列，并标注归属分支
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEntry {
    pub id: NodeId,
    /// 直接前驱的序号（分支号）
    pub branch: usize,
    /// 该节点自身引入的可训练标量个数
    pub new_elems: usize,
}

/// 归并推算结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// 归并节点与公共祖先之间（不含两端）的全部节点，id 降序
    pub merged: Vec<MergeEntry>,
    /// 各分支祖先链不相交时为 None（合法情形，如参数无关的源分支）
    pub common_ancestor: Option<NodeId>,
    /// 公共祖先处可见的可训练标量数（分支共享的槽位数）
    pub nb_same_elems: usize,
    /// 各分支私有的可训练标量数（按前驱顺序）
    pub branch_elems: Vec<usize>,
}

impl GraphEngine {
    /// 对归并节点（≥ 2 个前驱）做分支回溯推算
    pub fn merge_plan(&self, id: NodeId) -> Result<MergePlan, GraphError> {
        let node = self.get_node(id)?;
        if node.predecessors().len() < 2 {
            return Err(GraphError::InvalidOperation(format!(
                "{node}只有{}个前驱，无需归并推算",
                node.predecessors().len()
            )));
        }
        Ok(resolve_merge_inner(
            &self.nodes[..id.0 as usize],
            node.predecessors(),
        ))
    }
}

/// k 路回溯：每个分支一个游标，初始为各直接前驱；每轮推进全局 id 最大的
/// 游标（"总是推进最新创建的节点"），把它计入归并列表并前移到它的前驱。
/// 所有游标指向同一节点（公共祖先）或某游标耗尽（祖先链不相交）时终止——
/// 后者是显式的边界检查，不是错误。
pub(in crate::nn) fn resolve_merge_inner(nodes: &[Node], pred_ids: &[NodeId]) -> MergePlan {
    let mut cursors: Vec<Option<NodeId>> = pred_ids.iter().map(|p| Some(*p)).collect();
    let mut merged = Vec::new();
    let mut branch_elems = vec![0usize; pred_ids.len()];

    loop {
        // 终止条件 1：全部游标指向同一节点，即公共祖先
        if let Some(first) = cursors[0] {
            if cursors.iter().all(|c| *c == Some(first)) {
                let nb_same_elems = visible_scalars(nodes, first.0 as usize);
                return MergePlan {
                    merged,
                    common_ancestor: Some(first),
                    nb_same_elems,
                    branch_elems,
                };
            }
        }
        // 终止条件 2：某游标已耗尽（到达图根），祖先链不相交
        if cursors.iter().any(Option::is_none) {
            return MergePlan {
                merged,
                common_ancestor: None,
                nb_same_elems: 0,
                branch_elems,
            };
        }
        // 推进：取 id 最大的游标，保证即便分支长短不一也按真实依赖序展开
        let Some((branch, cur)) = cursors
            .iter()
            .enumerate()
            .filter_map(|(j, c)| c.map(|id| (j, id)))
            .max_by_key(|(_, id)| *id)
        else {
            unreachable!("上方已排除空游标");
        };
        let cnode = &nodes[cur.0 as usize];
        let new_elems = cnode.param_count();
        merged.push(MergeEntry {
            id: cur,
            branch,
            new_elems,
        });
        branch_elems[branch] += new_elems;
        cursors[branch] = cnode.predecessors().first().copied();
    }
}

/// 节点祖先链上可见的可训练标量总数（含自身）
pub(in crate::nn) fn visible_scalars(nodes: &[Node], idx: usize) -> usize {
    let node = &nodes[idx];
    let own = node.param_count();
    match node.predecessors().len() {
        0 => own,
        1 => own + visible_scalars(nodes, node.predecessors()[0].0 as usize),
        _ => {
            let plan = resolve_merge_inner(nodes, node.predecessors());
            let shared = plan.nb_same_elems;
            own + shared
                + node
                    .predecessors()
                    .iter()
                    .map(|p| visible_scalars(nodes, p.0 as usize) - shared)
                    .sum::<usize>()
        }
    }
}
