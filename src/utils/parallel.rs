/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 工作切分（work splitter）：把 [0, n) 切成连续块并发执行
 *
 * 节点间的前向/反向遍历是严格串行的（后一个节点要读前驱刚写的状态），
 * 并行只发生在单个节点钩子内部：按批元素或空间位置切分。块之间不共享
 * 可变状态，每个块独占自己的输出下标区间。
 */

use rayon::prelude::*;
use std::thread::available_parallelism;

fn worker_count() -> usize {
    available_parallelism().map_or(1, |n| n.get())
}

/// 对 [0, n) 的每个下标执行 body，按可用并发度切成连续块并发调度
///
/// n == 0 时是空操作；n == 1 时退化为顺序调用（不进线程池）。
pub fn parallel_for<F>(n: usize, body: F)
where
    F: Fn(usize) + Sync,
{
    match n {
        0 => {}
        1 => body(0),
        _ => {
            let chunk = n.div_ceil(worker_count());
            (0..n)
                .into_par_iter()
                .with_min_len(chunk)
                .for_each(|i| body(i));
        }
    }
}

/// 把 data 按 width 切成行，对每行执行 body(行号, 行切片)
///
/// 行之间互不重叠，因此 body 可以安全地独占写自己的行。行数 <= 1 时顺序执行。
pub fn parallel_for_slices<T, F>(data: &mut [T], width: usize, body: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    if width == 0 || data.is_empty() {
        return;
    }
    let rows = data.len() / width;
    if rows <= 1 {
        for (i, chunk) in data.chunks_mut(width).enumerate() {
            body(i, chunk);
        }
        return;
    }
    data.par_chunks_mut(width)
        .enumerate()
        .for_each(|(i, chunk)| body(i, chunk));
}
