/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : GraphEngine 计算图引擎
 *
 * 各 impl 块分散在子模块中：
 * - engine.rs: 结构定义、构图、访问器、生命周期广播
 * - forward.rs: 前向遍历 + 梯度检查前向
 * - backward.rs: 反向遍历（dirty 协议）+ 优化器更新入口
 * - merge.rs: 多前驱节点的归并推算（MergeReconciler）
 * - descriptor.rs: 可序列化的图描述 IR
 * - serialization.rs: 模型/参数的保存与加载（两阶段加载）
 */

mod backward;
mod descriptor;
mod engine;
mod error;
mod forward;
mod merge;
mod serialization;

pub use descriptor::{GraphDescriptor, NodeDescriptor, NodeKindDescriptor};
pub use engine::GraphEngine;
pub use error::GraphError;
pub use merge::{MergeEntry, MergePlan};
