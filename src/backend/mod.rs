/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 执行后端边界：执行上下文（ExecutionContext）与数值缓冲（Buffer）
 *
 * 本 crate 不拥有具体的设备实现，只约定两类缓冲（宿主数组、加速器驻留缓冲）
 * 共同的最小接口：分配、全量读、全量写、元素个数。执行模式不放在进程级
 * 全局状态里，而是作为 ExecutionContext 显式传入 GraphEngine 的构造函数，
 * 由各生命周期钩子从上下文读取。
 */

use thiserror::Error;

/// 后端缓冲操作错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BackendError {
    #[error("缓冲长度不匹配：预期{expected}，实际{got}")]
    SizeMismatch { expected: usize, got: usize },
}

/// 执行设备
///
/// 目前只内置宿主（CPU）实现；加速器后端通过同样的四个生命周期钩子接入，
/// 对核心而言除了分配位置没有差别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
}

/// 执行上下文：一次前向/反向周期内不可变
///
/// 切换上下文必须通过 `GraphEngine::set_context`，它会重新武装各节点的
/// `init_kernel`（权重值保留，批相关缓冲作废）。
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionContext {
    device: Device,
}

impl ExecutionContext {
    pub const fn new(device: Device) -> Self {
        Self { device }
    }

    pub const fn device(&self) -> Device {
        self.device
    }
}

/// 数值缓冲：行主序（row-major）、批主序（batch-major）的 f64 数组
///
/// 宿主实现即为内存数组；`read_all`/`write_all` 是同步的"完成即返回"调用，
/// 加速端实现在此处完成设备同步，核心不感知。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buffer {
    data: Vec<f64>,
}

impl Buffer {
    /// 分配指定元素数的缓冲，初值为零
    pub fn alloc(count: usize) -> Self {
        Self {
            data: vec![0.0; count],
        }
    }

    pub const fn empty() -> Self {
        Self { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// 全量读出（宿主实现为拷贝）
    pub fn read_all(&self) -> Vec<f64> {
        self.data.clone()
    }

    /// 全量写入，长度必须与已分配元素数一致
    pub fn write_all(&mut self, data: &[f64]) -> Result<(), BackendError> {
        if data.len() != self.data.len() {
            return Err(BackendError::SizeMismatch {
                expected: self.data.len(),
                got: data.len(),
            });
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    pub fn fill_zero(&mut self) {
        self.data.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_alloc_and_rw() {
        let mut buf = Buffer::alloc(3);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.read_all(), vec![0.0, 0.0, 0.0]);

        buf.write_all(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(buf.as_slice(), &[1.0, 2.0, 3.0]);

        // 长度不匹配的写入必须报错，而不是悄悄重分配
        let result = buf.write_all(&[1.0]);
        assert_eq!(
            result,
            Err(BackendError::SizeMismatch {
                expected: 3,
                got: 1
            })
        );
    }

    #[test]
    fn test_context_default_is_cpu() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.device(), Device::Cpu);
    }
}
