/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 节点（层）与内核：图顶点的组合式实现
 *
 * 节点 = 通用骨架（id、前驱链接、dirty 标志、批状态缓冲）+ 内核（具体层
 * 行为，enum_dispatch 标签变体）。可训练性是内核自愿提供的能力
 * （weight_stores 非空），不做运行时向下转型。
 */

mod activation;
mod input;
mod io;
mod linear;
mod mse_loss;
mod node;
mod sum;

pub(in crate::nn) use activation::Tanh;
pub(in crate::nn) use input::Input;
pub(in crate::nn) use io::{ForwardView, GcPredView, GcResolver, PredGrad};
pub use io::GcScalar;
pub(in crate::nn) use linear::Linear;
pub(in crate::nn) use mse_loss::MseLoss;
pub use node::Node;
pub(in crate::nn) use sum::Sum;

use crate::backend::ExecutionContext;
use crate::nn::graph::{GraphError, NodeKindDescriptor};
use io::{BackwardIo, ForwardIo, GcIo};
use crate::nn::weights::WeightStore;
use enum_dispatch::enum_dispatch;
use rand::RngCore;
use std::fmt;

/// 节点 id：构图时单调递增分配，同时是节点在图 arena 中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[enum_dispatch]
#[derive(Debug, Clone)]
pub(in crate::nn) enum KernelType {
    Input(Input),
    Linear(Linear),
    Tanh(Tanh),
    Sum(Sum),
    MseLoss(MseLoss),
}

#[enum_dispatch(KernelType)]
pub(in crate::nn) trait TraitKernel {
    fn kind_name(&self) -> &'static str;

    /// 单个批元素的输出宽度
    fn out_size(&self) -> usize;

    /// 自身可训练标量个数
    fn param_count(&self) -> usize {
        0
    }

    /// 校验前驱连接（个数与宽度），initLinks 与节点构建时都会调用
    fn validate_links(&self, pred_sizes: &[usize]) -> Result<(), GraphError>;

    /// 分配批无关的"硬"资源（权重等）；每次执行模式切换后至多执行一次，
    /// 已有权重值（含从文件加载的）不得被覆盖
    fn init_kernel(
        &mut self,
        _ctx: &ExecutionContext,
        _rng: &mut dyn RngCore,
    ) -> Result<(), GraphError> {
        Ok(())
    }

    /// 前向：读前驱输出，写自身输出；不得触碰任何梯度状态
    fn forward(&self, io: ForwardIo<'_>) -> Result<(), GraphError>;

    /// 梯度检查前向：对每个批元素、每个扰动槽位计算 what-if 输出
    fn forward_gc(&self, io: GcIo<'_>) -> Result<(), GraphError>;

    /// 反向：读自身 delta，向前驱的梯度缓冲写贡献（覆盖/累加由 DeltaSink 决定），
    /// 并把整批权重梯度写入自身 WeightStore
    fn backward(&mut self, io: BackwardIo<'_, '_>) -> Result<(), GraphError>;

    /// 可训练能力：非空即参与 update 与梯度检查
    fn weight_stores(&self) -> Vec<&WeightStore> {
        Vec::new()
    }

    fn weight_stores_mut(&mut self) -> Vec<&mut WeightStore> {
        Vec::new()
    }

    /// 权重已从外部装载（反序列化/手工赋值），init_kernel 不得再随机初始化
    fn mark_params_loaded(&mut self) {}

    /// 是否为真输入边界节点（值由外部置入，不产生梯度状态）
    fn accepts_external_value(&self) -> bool {
        false
    }

    /// 是否为损失节点（反向周期的种子）
    fn is_loss(&self) -> bool {
        false
    }

    fn set_ground_truth(&mut self, _truth: &[f64], _batch: usize) -> Result<(), GraphError> {
        Err(GraphError::InvalidOperation(
            "该类型节点不接受标签数据".to_string(),
        ))
    }

    fn descriptor(&self) -> NodeKindDescriptor;
}
