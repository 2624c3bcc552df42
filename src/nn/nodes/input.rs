/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : Input 内核：真输入边界节点
 */

use super::io::{BackwardIo, ForwardIo, GcIo};
use super::TraitKernel;
use crate::nn::graph::{GraphError, NodeKindDescriptor};

/// 输入节点：值由外部通过 `GraphEngine::set_input` 置入，不产生梯度状态
#[derive(Debug, Clone)]
pub(in crate::nn) struct Input {
    size: usize,
}

impl Input {
    pub fn new(size: usize) -> Result<Self, GraphError> {
        if size == 0 {
            return Err(GraphError::InvalidOperation(
                "Input节点的宽度必须为正".to_string(),
            ));
        }
        Ok(Self { size })
    }
}

impl TraitKernel for Input {
    fn kind_name(&self) -> &'static str {
        "Input"
    }

    fn out_size(&self) -> usize {
        self.size
    }

    fn validate_links(&self, pred_sizes: &[usize]) -> Result<(), GraphError> {
        if !pred_sizes.is_empty() {
            return Err(GraphError::InvalidOperation(
                "Input节点不接受前驱".to_string(),
            ));
        }
        Ok(())
    }

    // 值已由外部写入输出缓冲，这里无事可做
    fn forward(&self, _io: ForwardIo<'_>) -> Result<(), GraphError> {
        Ok(())
    }

    fn forward_gc(&self, _io: GcIo<'_>) -> Result<(), GraphError> {
        Ok(())
    }

    fn backward(&mut self, _io: BackwardIo<'_, '_>) -> Result<(), GraphError> {
        Ok(())
    }

    fn accepts_external_value(&self) -> bool {
        true
    }

    fn descriptor(&self) -> NodeKindDescriptor {
        NodeKindDescriptor::Input { size: self.size }
    }
}
