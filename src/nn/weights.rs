/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : WeightStore：单个可训练节点的权重数组组
 */

use crate::backend::Buffer;
use crate::nn::graph::GraphError;

/// 权重存储：value / gradient / momentum / velocity / velocity_hat 五个等长数组
///
/// `value` 是训练得到的权重本体，跨 `reset` 保留；其余四个是优化器的
/// 草稿状态（动量、二阶矩及其单调上界），`reset` 时重新置零分配。
/// 五个数组由所属节点独占，活跃周期内不与其他节点共享；克隆图时整组转移。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightStore {
    value: Buffer,
    gradient: Buffer,
    momentum: Buffer,
    velocity: Buffer,
    velocity_hat: Buffer,
}

/// 算法内循环用的可变视图（一次借出全部五个数组）
pub(in crate::nn) struct WeightViews<'a> {
    pub value: &'a mut [f64],
    pub gradient: &'a mut [f64],
    pub momentum: &'a mut [f64],
    pub velocity: &'a mut [f64],
    pub velocity_hat: &'a mut [f64],
}

impl WeightStore {
    /// 按参数个数分配，五个数组全部置零
    pub fn new(count: usize) -> Self {
        Self {
            value: Buffer::alloc(count),
            gradient: Buffer::alloc(count),
            momentum: Buffer::alloc(count),
            velocity: Buffer::alloc(count),
            velocity_hat: Buffer::alloc(count),
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// 重置优化器草稿状态：value 逐位保留，其余四个重新置零分配
    pub fn reset(&mut self) {
        let count = self.len();
        self.gradient = Buffer::alloc(count);
        self.momentum = Buffer::alloc(count);
        self.velocity = Buffer::alloc(count);
        self.velocity_hat = Buffer::alloc(count);
    }

    pub fn value(&self) -> &[f64] {
        self.value.as_slice()
    }

    pub fn gradient(&self) -> &[f64] {
        self.gradient.as_slice()
    }

    pub fn momentum(&self) -> &[f64] {
        self.momentum.as_slice()
    }

    pub fn velocity(&self) -> &[f64] {
        self.velocity.as_slice()
    }

    pub fn velocity_hat(&self) -> &[f64] {
        self.velocity_hat.as_slice()
    }

    /// 整组赋值权重，长度不一致报 `SizeMismatch`
    pub fn set_value(&mut self, data: &[f64]) -> Result<(), GraphError> {
        self.value.write_all(data)?;
        Ok(())
    }

    pub(in crate::nn) fn gradient_mut(&mut self) -> &mut [f64] {
        self.gradient.as_mut_slice()
    }

    pub(in crate::nn) fn value_mut(&mut self) -> &mut [f64] {
        self.value.as_mut_slice()
    }

    pub(in crate::nn) fn views_mut(&mut self) -> WeightViews<'_> {
        WeightViews {
            value: self.value.as_mut_slice(),
            gradient: self.gradient.as_mut_slice(),
            momentum: self.momentum.as_mut_slice(),
            velocity: self.velocity.as_mut_slice(),
            velocity_hat: self.velocity_hat.as_mut_slice(),
        }
    }
}
