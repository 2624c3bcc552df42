/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 图模块的错误类型
 */

use crate::backend::BackendError;
use crate::nn::nodes::NodeId;
use thiserror::Error;

/// 图操作错误类型
///
/// 所有错误都同步上抛给遍历入口（forward/backward/update/forward_gradient_check）
/// 的直接调用者，遍历内部不吞错误；任一节点钩子出错即视为整个周期失败，
/// 该周期的中间结果不可复用。
#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("节点(id={0})不存在")]
    NodeNotFound(NodeId),
    /// 状态缓冲按别的批大小分配过；不会悄悄重分配，否则会掩盖调用方的 bug
    #[error("批大小无效：请求{requested}，已分配容量{allocated}")]
    BatchSize { requested: usize, allocated: usize },
    /// 本周期尚未有任何有效的反向梯度贡献写入该节点
    #[error("节点(id={0})的梯度在本周期尚未写入（dirty），不可读取")]
    Dirty(NodeId),
    /// 赋值数组与节点声明的参数个数不一致，属结构性/版本性错误
    #[error("数组长度不匹配：预期{expected}，实际{got}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("未注册的节点类型：{0}")]
    TypeNotFound(String),
    /// 梯度检查不通过或其配置非法
    #[error("数值校验失败：{0}")]
    Numeric(String),
    #[error("无效操作：{0}")]
    InvalidOperation(String),
    #[error("计算错误：{0}")]
    ComputationError(String),
    #[error("{0}")]
    DuplicateNodeName(String),
}

impl From<BackendError> for GraphError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::SizeMismatch { expected, got } => Self::SizeMismatch { expected, got },
        }
    }
}
