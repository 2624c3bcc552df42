//! # Layer Graph
//!
//! `layer_graph`是一个层图（layer graph）数值计算引擎的执行核心：
//! 节点（层）构成的有向无环图，支持前向求值、基于"dirty"协议的反向梯度传播、
//! 可插拔的权重优化算法族（SGD/动量/Adam 系），以及用有限差分验证解析梯度的
//! 梯度检查（gradient checking）流程。
//!
//! 具体层的数学内核（卷积、池化等）、模型训练编排（Trainer）不在本 crate 范围内，
//! 这里只提供它们赖以运转的图执行协议。

pub mod backend;
pub mod nn;
pub mod utils;
