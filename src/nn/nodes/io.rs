/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 内核钩子的借用视图：前向/反向/梯度检查的输入输出打包
 */

use super::NodeId;

// ========== 前向 ==========

/// 前驱的只读前向视图
#[derive(Clone, Copy)]
pub(in crate::nn) struct ForwardView<'a> {
    pub out: &'a [f64],
    pub size: usize,
}

impl ForwardView<'_> {
    pub fn row(&self, b: usize) -> &[f64] {
        &self.out[b * self.size..(b + 1) * self.size]
    }
}

pub(in crate::nn) struct ForwardIo<'a> {
    /// 本节点输出，已截取到 batch * out_size
    pub out: &'a mut [f64],
    pub preds: &'a [ForwardView<'a>],
    pub batch: usize,
}

// ========== 反向 ==========

/// 向某前驱梯度缓冲写贡献的去向
///
/// 前驱 dirty（本周期尚无有效内容）则首写覆盖清掉陈旧数据；否则累加，
/// 因为兄弟分支已经写过有效数据。访问顺序由此变得无关紧要。
pub(in crate::nn) struct DeltaSink<'a> {
    dest: &'a mut [f64],
    overwrite: bool,
}

impl<'a> DeltaSink<'a> {
    pub fn new(dest: &'a mut [f64], overwrite: bool) -> Self {
        Self { dest, overwrite }
    }

    /// 写入第 i 个元素的贡献（每个元素本次调用只应写一次）
    pub fn contribute(&mut self, i: usize, v: f64) {
        if self.overwrite {
            self.dest[i] = v;
        } else {
            self.dest[i] += v;
        }
    }
}

/// 前驱的反向视图：读它的输出，（若它需要梯度）写它的梯度缓冲
pub(in crate::nn) struct PredGrad<'a> {
    pub out: &'a [f64],
    pub size: usize,
    /// None 表示该前驱不物化梯度状态（真输入边界）
    pub delta: Option<DeltaSink<'a>>,
}

pub(in crate::nn) struct BackwardIo<'a, 'b> {
    /// 本节点输出（激活、损失等反向需要）
    pub out: &'a [f64],
    /// 本节点 delta（下游消费者本周期已写入的有效梯度）
    pub delta: &'a [f64],
    pub preds: &'a mut [PredGrad<'b>],
    pub batch: usize,
}

// ========== 梯度检查 ==========

/// 梯度检查槽位布局里的一个可训练标量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcScalar {
    pub owner: NodeId,
    pub index: usize,
}

/// 槽位解析：某扰动槽位下，各前驱该用哪一行输入、自身哪个标量被扰动
///
/// 标量布局 = [共享祖先前缀][分支 0 私有段][分支 1 私有段]…[自身标量]。
/// 叉点之前的权重占共享槽位，所有分支看到同一份 what-if 输出；叉点之后
/// 某分支上的权重只扰动该分支的下游计算，其余分支用常规输出。
#[derive(Debug, Clone, Default)]
pub(in crate::nn) struct GcResolver {
    /// 共享前缀标量数（归并节点为公共祖先的可见标量数，单前驱节点为 0）
    pub shared: usize,
    /// 各分支私有段在本节点标量布局中的 [start, end)
    pub blocks: Vec<(usize, usize)>,
    /// 自身标量的起始布局下标
    pub own_start: usize,
}

pub(in crate::nn) enum PredRow {
    /// 用前驱的 what-if 输出（前驱本地槽位号）
    Gc(usize),
    /// 该槽位的扰动不影响此前驱，用常规输出
    Regular,
}

impl GcResolver {
    pub fn pred_row(&self, branch: usize, slot: usize) -> PredRow {
        let k = slot / 2;
        let sign_bit = slot % 2;
        if k < self.shared {
            return PredRow::Gc(slot);
        }
        let (start, end) = self.blocks[branch];
        if k >= start && k < end {
            return PredRow::Gc((self.shared + (k - start)) * 2 + sign_bit);
        }
        PredRow::Regular
    }

    /// 该槽位若扰动自身标量，返回 (标量下标, 符号 ±1)
    pub fn own_perturbation(&self, slot: usize) -> Option<(usize, f64)> {
        let k = slot / 2;
        (k >= self.own_start).then(|| {
            let sign = if slot % 2 == 0 { 1.0 } else { -1.0 };
            (k - self.own_start, sign)
        })
    }
}

/// 前驱的梯度检查视图
#[derive(Clone, Copy)]
pub(in crate::nn) struct GcPredView<'a> {
    pub out: &'a [f64],
    pub out_gc: &'a [f64],
    pub size: usize,
    pub nb_slots: usize,
}

impl GcPredView<'_> {
    /// 批元素 b、槽位 slot 下该前驱的输入行
    pub fn row(&self, b: usize, resolver: &GcResolver, branch: usize, slot: usize) -> &[f64] {
        match resolver.pred_row(branch, slot) {
            PredRow::Gc(local) => {
                let base = (b * self.nb_slots + local) * self.size;
                &self.out_gc[base..base + self.size]
            }
            PredRow::Regular => &self.out[b * self.size..(b + 1) * self.size],
        }
    }
}

pub(in crate::nn) struct GcIo<'a> {
    /// 本节点 what-if 输出，batch * nb_slots * out_size
    pub out_gc: &'a mut [f64],
    pub preds: &'a [GcPredView<'a>],
    pub batch: usize,
    pub nb_slots: usize,
    pub resolver: &'a GcResolver,
    pub epsilon: f64,
}
