/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : GraphEngine 核心：arena、构图、访问器、生命周期广播
 */

use super::error::GraphError;
use crate::backend::ExecutionContext;
use crate::nn::nodes::{
    Input, KernelType, Linear, MseLoss, Node, NodeId, Sum, Tanh, TraitKernel,
};
use crate::nn::weights::WeightStore;
use log::debug;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;

/// 层图引擎：有序节点 arena 的所有者，驱动前向/反向遍历
///
/// 节点列表构图期只增不删，拓扑此后不可变（改拓扑 = 按 id 重映射重建新图）。
/// dirty 与批大小都是广播量：每个前向/反向周期前由 `update_kernel` 统一设置。
#[derive(Debug, Clone)]
pub struct GraphEngine {
    name: String,
    pub(in crate::nn) nodes: Vec<Node>,
    ctx: ExecutionContext,
    /// None 表示用默认的 thread_rng（非确定性）
    rng: Option<StdRng>,
    pub(in crate::nn) batch_size: usize,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new(ExecutionContext::default())
    }
}

impl GraphEngine {
    // ========== 创建 ==========

    pub fn new(ctx: ExecutionContext) -> Self {
        Self::with_name("default_graph", ctx)
    }

    pub fn with_name(name: &str, ctx: ExecutionContext) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            ctx,
            rng: None,
            batch_size: 0,
        }
    }

    /// 创建一个带固定种子的图（参数初始化可重复）
    pub fn with_seed(ctx: ExecutionContext, seed: u64) -> Self {
        let mut graph = Self::new(ctx);
        graph.rng = Some(StdRng::seed_from_u64(seed));
        graph
    }

    /// 在新执行上下文下克隆本图：权重整组转移，批相关状态作废
    pub fn clone_with_context(&self, ctx: ExecutionContext) -> Self {
        let mut cloned = self.clone();
        cloned.set_context(ctx);
        cloned
    }

    // ========== 基础访问器 ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    pub(in crate::nn) fn get_node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(GraphError::NodeNotFound(id))
    }

    pub(in crate::nn) fn get_node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or(GraphError::NodeNotFound(id))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.get_node(id)
    }

    pub fn get_node_name(&self, id: NodeId) -> Result<&str, GraphError> {
        Ok(self.get_node(id)?.name())
    }

    pub fn get_node_parents(&self, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        Ok(self.get_node(id)?.predecessors().to_vec())
    }

    /// 获取所有可训练节点（weight_stores 非空的内核）
    pub fn get_trainable_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_trainable())
            .map(Node::id)
            .collect()
    }

    // ========== 名称生成 ==========

    pub(super) fn check_duplicate_node_name(&self, name: &str) -> Result<(), GraphError> {
        if self.nodes.iter().any(|node| node.name() == name) {
            return Err(GraphError::DuplicateNodeName(format!(
                "节点{}在图{}中重复",
                name,
                self.name()
            )));
        }
        Ok(())
    }

    fn generate_valid_new_node_name(
        &self,
        base_name: Option<&str>,
        node_type: &str,
    ) -> Result<String, GraphError> {
        if let Some(base_name) = base_name {
            self.check_duplicate_node_name(base_name)?;
            return Ok(base_name.to_string());
        }

        let mut counter = 1;
        loop {
            let name = format!("{node_type}_{counter}");
            if self.check_duplicate_node_name(&name).is_ok() {
                return Ok(name);
            }
            counter += 1;
        }
    }

    // ========== 构图 ==========

    pub(in crate::nn) fn add_node(
        &mut self,
        kernel: KernelType,
        predecessor_ids: Vec<NodeId>,
        name: Option<&str>,
        kind: &str,
    ) -> Result<NodeId, GraphError> {
        // 前驱必须已存在（追加式构图天然无环）且互不重复
        let mut seen = HashSet::new();
        for pid in &predecessor_ids {
            let _ = self.get_node(*pid)?;
            if !seen.insert(*pid) {
                return Err(GraphError::InvalidOperation(format!(
                    "前驱(id={pid})重复"
                )));
            }
        }
        let pred_sizes: Vec<usize> = predecessor_ids
            .iter()
            .map(|pid| self.nodes[pid.0 as usize].out_size())
            .collect();
        kernel.validate_links(&pred_sizes)?;

        let name = self.generate_valid_new_node_name(name, kind)?;
        let id = NodeId(self.nodes.len() as u64);
        let mut node = Node::new(id, name, kernel, predecessor_ids);
        node.must_compute_backward = node
            .predecessor_ids
            .iter()
            .any(|p| self.nodes[p.0 as usize].compute_delta);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn new_input_node(&mut self, size: usize, name: Option<&str>) -> Result<NodeId, GraphError> {
        self.add_node(Input::new(size)?.into(), Vec::new(), name, "input")
    }

    pub fn new_linear_node(
        &mut self,
        input: NodeId,
        out_size: usize,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let in_size = self.get_node(input)?.out_size();
        self.add_node(
            Linear::new(in_size, out_size)?.into(),
            vec![input],
            name,
            "linear",
        )
    }

    pub fn new_tanh_node(&mut self, input: NodeId, name: Option<&str>) -> Result<NodeId, GraphError> {
        let size = self.get_node(input)?.out_size();
        self.add_node(Tanh::new(size)?.into(), vec![input], name, "tanh")
    }

    pub fn new_sum_node(
        &mut self,
        inputs: &[NodeId],
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        if inputs.is_empty() {
            return Err(GraphError::InvalidOperation(
                "Sum节点至少需要2个前驱".to_string(),
            ));
        }
        let size = self.get_node(inputs[0])?.out_size();
        self.add_node(Sum::new(size)?.into(), inputs.to_vec(), name, "sum")
    }

    pub fn new_mse_loss_node(
        &mut self,
        input: NodeId,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let size = self.get_node(input)?.out_size();
        self.add_node(MseLoss::new(size)?.into(), vec![input], name, "mse_loss")
    }

    // ========== 链接解析（两阶段加载的第二阶段） ==========

    /// 按 id 解析全部前驱链接并派生 must_compute_backward
    ///
    /// 给定完整的 id→节点映射后幂等且与调用顺序无关，可重复调用。
    pub fn init_links(&mut self) -> Result<(), GraphError> {
        for i in 0..self.nodes.len() {
            let ids = self.nodes[i].predecessor_ids.clone();
            let mut seen = HashSet::new();
            for pid in &ids {
                // 前驱 id 严格小于自身 id 即无环
                if pid.0 >= i as u64 {
                    return Err(GraphError::InvalidOperation(format!(
                        "{}的前驱(id={pid})必须先于其创建（无环约束）",
                        self.nodes[i]
                    )));
                }
                if !seen.insert(*pid) {
                    return Err(GraphError::InvalidOperation(format!(
                        "{}的前驱(id={pid})重复",
                        self.nodes[i]
                    )));
                }
            }
            let sizes: Vec<usize> = ids
                .iter()
                .map(|p| self.nodes[p.0 as usize].out_size())
                .collect();
            self.nodes[i].kernel.validate_links(&sizes)?;
            let must = ids
                .iter()
                .any(|p| self.nodes[p.0 as usize].compute_delta());
            self.nodes[i].must_compute_backward = must;
        }
        Ok(())
    }

    // ========== 生命周期广播 ==========

    /// 每个前向/反向周期前调用：广播批大小并把所有节点标记为 dirty，
    /// 保证上一批的陈旧梯度累积不会泄漏到新批
    pub fn update_kernel(&mut self, batch_size: usize) -> Result<(), GraphError> {
        if batch_size == 0 {
            return Err(GraphError::BatchSize {
                requested: 0,
                allocated: 0,
            });
        }
        debug!(
            "图{}：广播批大小{batch_size}，全部节点标记为 dirty",
            self.name
        );
        self.batch_size = batch_size;
        for node in &mut self.nodes {
            node.batch_size = batch_size;
            node.dirty = true;
        }
        Ok(())
    }

    /// 分配批无关的硬资源；每个节点在当前执行上下文下至多初始化一次
    pub fn init_kernel(&mut self) -> Result<(), GraphError> {
        let ctx = self.ctx;
        let mut fallback;
        let rng: &mut dyn RngCore = match self.rng.as_mut() {
            Some(rng) => rng,
            None => {
                fallback = rand::thread_rng();
                &mut fallback
            }
        };
        for node in &mut self.nodes {
            node.run_init(&ctx, rng)?;
        }
        Ok(())
    }

    /// 清空所有节点的批相关状态；此阶段节点相互独立，可跨节点并行
    pub fn reset_kernel(&mut self) {
        self.nodes.par_iter_mut().for_each(Node::reset_kernel);
    }

    /// 切换执行上下文并重新武装 init_kernel；权重值随 WeightStore 保留
    pub fn set_context(&mut self, ctx: ExecutionContext) {
        debug!(
            "图{}：切换执行上下文至{:?}，批相关状态作废",
            self.name,
            ctx.device()
        );
        self.ctx = ctx;
        for node in &mut self.nodes {
            node.inited = false;
            node.reset_kernel();
        }
    }

    /// 冻结/解冻：改变节点是否物化梯度状态，并重新派生消费者的
    /// must_compute_backward
    pub fn set_compute_delta(&mut self, id: NodeId, compute: bool) -> Result<(), GraphError> {
        self.get_node_mut(id)?.compute_delta = compute;
        self.init_links()
    }

    // ========== 数据置入与读出 ==========

    pub fn set_input(&mut self, id: NodeId, data: &[f64]) -> Result<(), GraphError> {
        if self.batch_size == 0 {
            return Err(GraphError::InvalidOperation(
                "请先调用 update_kernel 设置批大小".to_string(),
            ));
        }
        let node = self.get_node_mut(id)?;
        if !node.kernel.accepts_external_value() {
            return Err(GraphError::InvalidOperation(format!(
                "{node}不是输入节点，其值由前驱计算"
            )));
        }
        node.ensure_capacity()?;
        let n = node.batch_size * node.out_size();
        if data.len() != n {
            return Err(GraphError::SizeMismatch {
                expected: n,
                got: data.len(),
            });
        }
        node.state.out.as_mut_slice()[..n].copy_from_slice(data);
        Ok(())
    }

    pub fn set_ground_truth(&mut self, id: NodeId, truth: &[f64]) -> Result<(), GraphError> {
        if self.batch_size == 0 {
            return Err(GraphError::InvalidOperation(
                "请先调用 update_kernel 设置批大小".to_string(),
            ));
        }
        let batch = self.batch_size;
        self.get_node_mut(id)?.kernel.set_ground_truth(truth, batch)
    }

    pub fn get_node_out(&self, id: NodeId) -> Result<&[f64], GraphError> {
        let node = self.get_node(id)?;
        if node.state.allocated_batch == 0 {
            return Err(GraphError::ComputationError(format!(
                "{node}没有值，请先执行 forward"
            )));
        }
        let n = node.batch_size * node.out_size();
        Ok(&node.state.out.as_slice()[..n])
    }

    /// 读取节点的反向梯度状态；本周期尚未写入（dirty）时是 Dirty 错误
    pub fn get_node_delta(&self, id: NodeId) -> Result<&[f64], GraphError> {
        let node = self.get_node(id)?;
        if !node.compute_delta() {
            return Err(GraphError::InvalidOperation(format!(
                "{node}不物化梯度状态"
            )));
        }
        if node.is_dirty() {
            return Err(GraphError::Dirty(id));
        }
        if node.state.allocated_batch == 0 {
            return Err(GraphError::ComputationError(format!(
                "{node}没有值，请先执行 forward"
            )));
        }
        let n = node.batch_size * node.out_size();
        Ok(&node.state.delta.as_slice()[..n])
    }

    /// 图级损失：损失节点逐样本输出的批均值
    pub fn get_loss(&self, id: NodeId) -> Result<f64, GraphError> {
        let node = self.get_node(id)?;
        if !node.kernel.is_loss() {
            return Err(GraphError::InvalidOperation(format!(
                "{node}不是损失节点"
            )));
        }
        let out = self.get_node_out(id)?;
        Ok(out.iter().sum::<f64>() / out.len() as f64)
    }

    // ========== 权重访问 ==========

    pub fn weight_store(&self, id: NodeId, grid: usize) -> Result<&WeightStore, GraphError> {
        let node = self.get_node(id)?;
        let stores = node.kernel.weight_stores();
        stores.into_iter().nth(grid).ok_or_else(|| {
            GraphError::InvalidOperation(format!("{node}没有第{grid}组权重"))
        })
    }

    /// 整组赋值节点权重（按网格顺序），长度不符报 SizeMismatch
    pub fn set_weight_values(&mut self, id: NodeId, grids: &[&[f64]]) -> Result<(), GraphError> {
        let node = self.get_node_mut(id)?;
        let stores = node.kernel.weight_stores_mut();
        if stores.len() != grids.len() {
            return Err(GraphError::InvalidOperation(format!(
                "权重网格数不匹配：节点有{}组，赋值{}组",
                stores.len(),
                grids.len()
            )));
        }
        for (store, grid) in stores.into_iter().zip(grids.iter()) {
            store.set_value(grid)?;
        }
        node.kernel.mark_params_loaded();
        Ok(())
    }

    /// 按节点内标量下标（网格拼接序）读解析梯度
    pub fn weight_gradient_scalar(&self, id: NodeId, index: usize) -> Result<f64, GraphError> {
        let node = self.get_node(id)?;
        let mut offset = index;
        for store in node.kernel.weight_stores() {
            if offset < store.len() {
                return Ok(store.gradient()[offset]);
            }
            offset -= store.len();
        }
        Err(GraphError::InvalidOperation(format!(
            "{node}没有第{index}个可训练标量"
        )))
    }
}
