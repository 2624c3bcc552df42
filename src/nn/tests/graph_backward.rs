/*
 * @Author       : 老董
 * @Description  : 反向遍历（dirty 协议）单元测试
 *
 * 测试策略：
 * 1. 链式图的 dirty 标志迁移
 * 2. 共享前驱的覆盖/累加语义（分叉-汇合）
 * 3. 跨周期不串账（新周期覆盖旧梯度）
 * 4. 脱离分支与冻结子图的跳过
 */

use crate::assert_err;
use crate::nn::{GraphEngine, GraphError, NodeId};
use approx::assert_abs_diff_eq;

/// input(1) → linear(1→1, w=2, b=0) → mse
fn build_chain() -> (GraphEngine, NodeId, NodeId, NodeId) {
    let mut graph = GraphEngine::default();
    let input = graph.new_input_node(1, Some("x")).unwrap();
    let linear = graph.new_linear_node(input, 1, Some("fc")).unwrap();
    let loss = graph.new_mse_loss_node(linear, Some("loss")).unwrap();
    graph.set_weight_values(linear, &[&[2.0], &[0.0]]).unwrap();
    (graph, input, linear, loss)
}

/// 分叉-汇合图：input → A；A → B；A → C；sum(B, C) → mse
/// 权重都是 1x1：A=1，B=3，C=5，偏置全 0
fn build_fork() -> (GraphEngine, [NodeId; 6]) {
    let mut graph = GraphEngine::default();
    let input = graph.new_input_node(1, Some("x")).unwrap();
    let a = graph.new_linear_node(input, 1, Some("a")).unwrap();
    let b = graph.new_linear_node(a, 1, Some("b")).unwrap();
    let c = graph.new_linear_node(a, 1, Some("c")).unwrap();
    let sum = graph.new_sum_node(&[b, c], Some("merge")).unwrap();
    let loss = graph.new_mse_loss_node(sum, Some("loss")).unwrap();
    graph.set_weight_values(a, &[&[1.0], &[0.0]]).unwrap();
    graph.set_weight_values(b, &[&[3.0], &[0.0]]).unwrap();
    graph.set_weight_values(c, &[&[5.0], &[0.0]]).unwrap();
    (graph, [input, a, b, c, sum, loss])
}

fn run_cycle(graph: &mut GraphEngine, input: NodeId, loss: NodeId, x: &[f64], truth: &[f64]) {
    graph.update_kernel(x.len()).unwrap();
    graph.set_input(input, x).unwrap();
    graph.set_ground_truth(loss, truth).unwrap();
    graph.forward().unwrap();
    graph.loss_derivative(loss).unwrap();
    graph.backward().unwrap();
}

// ==================== dirty 标志迁移 ====================

/// 测试 update_kernel 把所有节点标记为 dirty
#[test]
fn test_update_kernel_marks_all_dirty() {
    let (mut graph, input, linear, loss) = build_chain();
    graph.update_kernel(2).unwrap();
    for id in [input, linear, loss] {
        assert!(graph.node(id).unwrap().is_dirty());
    }
}

/// 测试链式图一个周期后的 dirty 终态：除首节点外全部非 dirty
#[test]
fn test_chain_dirty_flags_after_cycle() {
    let (mut graph, input, linear, loss) = build_chain();
    run_cycle(&mut graph, input, loss, &[1.0, 2.0], &[0.0, 0.0]);

    // 首节点（输入）从未收到反向贡献，保持 dirty
    assert!(graph.node(input).unwrap().is_dirty());
    assert!(!graph.node(linear).unwrap().is_dirty());
    assert!(!graph.node(loss).unwrap().is_dirty());
}

/// 测试 dirty 期间读梯度报 Dirty 错误
#[test]
fn test_get_delta_while_dirty() {
    let (mut graph, input, linear, loss) = build_chain();
    graph.update_kernel(2).unwrap();
    graph.set_input(input, &[1.0, 2.0]).unwrap();
    graph.set_ground_truth(loss, &[0.0, 0.0]).unwrap();
    graph.forward().unwrap();

    // 反向尚未运行，梯度是陈旧/未写入的
    let result = graph.get_node_delta(linear);
    assert_err!(result, GraphError::Dirty(NodeId(1)));

    graph.loss_derivative(loss).unwrap();
    graph.backward().unwrap();
    // MSE 对线性输出的梯度：2·out/batch = [2, 4]
    assert_eq!(graph.get_node_delta(linear).unwrap(), &[2.0, 4.0]);
}

/// 测试链式图的解析权重梯度
#[test]
fn test_chain_weight_gradients() {
    let (mut graph, input, linear, loss) = build_chain();
    run_cycle(&mut graph, input, loss, &[1.0, 2.0], &[0.0, 0.0]);

    // dL/dw = Σ_b delta_b·x_b = 2*1 + 4*2 = 10；dL/db = Σ_b delta_b = 6
    assert_abs_diff_eq!(graph.weight_gradient_scalar(linear, 0).unwrap(), 10.0);
    assert_abs_diff_eq!(graph.weight_gradient_scalar(linear, 1).unwrap(), 6.0);
}

/// 测试损失求导只对损失节点可用
#[test]
fn test_loss_derivative_on_non_loss() {
    let (mut graph, input, linear, loss) = build_chain();
    graph.update_kernel(1).unwrap();
    graph.set_input(input, &[1.0]).unwrap();
    graph.set_ground_truth(loss, &[0.0]).unwrap();
    graph.forward().unwrap();
    let result = graph.loss_derivative(linear);
    assert_err!(result, GraphError::InvalidOperation { .. });
}

// ==================== 覆盖/累加语义 ====================

/// 测试共享前驱正确累加两个分支的贡献（与访问顺序无关的求和）
#[test]
fn test_fork_contributions_accumulate() {
    let (mut graph, [input, a, b, c, sum, loss]) = build_fork();
    run_cycle(&mut graph, input, loss, &[1.0], &[0.0]);

    // 前向：A=1，B=3，C=5，S=8，loss=64
    assert_abs_diff_eq!(graph.get_loss(loss).unwrap(), 64.0);
    // 反向：mse→S 16；S→B 16、S→C 16；
    // C 先写 A（dirty 覆盖）：16*5=80；B 再写 A（累加）：80+16*3=128
    assert_eq!(graph.get_node_delta(sum).unwrap(), &[16.0]);
    assert_eq!(graph.get_node_delta(b).unwrap(), &[16.0]);
    assert_eq!(graph.get_node_delta(c).unwrap(), &[16.0]);
    assert_eq!(graph.get_node_delta(a).unwrap(), &[128.0]);

    // 权重梯度：dL/dwA = 128*1；dL/dwB = 16*1；dL/dwC = 16*1
    assert_abs_diff_eq!(graph.weight_gradient_scalar(a, 0).unwrap(), 128.0);
    assert_abs_diff_eq!(graph.weight_gradient_scalar(b, 0).unwrap(), 16.0);
    assert_abs_diff_eq!(graph.weight_gradient_scalar(c, 0).unwrap(), 16.0);
}

/// 测试新周期覆盖旧梯度：update_kernel 重新标 dirty 后首写覆盖，不跨周期累加
#[test]
fn test_new_cycle_overwrites_stale_delta() {
    let (mut graph, [input, a, _, _, _, loss]) = build_fork();
    run_cycle(&mut graph, input, loss, &[1.0], &[0.0]);
    assert_eq!(graph.get_node_delta(a).unwrap(), &[128.0]);

    // 第二个周期换输入：若跨周期累加会得到 256+128=384
    run_cycle(&mut graph, input, loss, &[2.0], &[0.0]);
    assert_eq!(graph.get_node_delta(a).unwrap(), &[256.0]);
}

// ==================== 脱离分支与冻结 ====================

/// 测试不汇入损失的分支整周期保持 dirty 并被跳过
#[test]
fn test_detached_branch_is_skipped() {
    let (mut graph, [input, a, _, _, _, loss]) = build_fork();
    // 追加一个消费 A 但不汇入损失的节点
    let dangling = graph.new_tanh_node(a, Some("dangling")).unwrap();
    run_cycle(&mut graph, input, loss, &[1.0], &[0.0]);

    assert!(graph.node(dangling).unwrap().is_dirty());
    // A 的梯度不受脱离分支影响
    assert_eq!(graph.get_node_delta(a).unwrap(), &[128.0]);
}

/// 测试冻结节点：compute_delta=false 后不再收梯度、不再跑反向、不被更新
#[test]
fn test_frozen_node_skips_backward_and_update() {
    let (mut graph, [input, a, b, c, _, loss]) = build_fork();
    graph.set_compute_delta(a, false).unwrap();
    run_cycle(&mut graph, input, loss, &[1.0], &[0.0]);

    // A 没人写、自己也没跑反向
    assert!(graph.node(a).unwrap().is_dirty());
    assert_abs_diff_eq!(graph.weight_gradient_scalar(a, 0).unwrap(), 0.0);
    // 下游分支不受影响
    assert_abs_diff_eq!(graph.weight_gradient_scalar(b, 0).unwrap(), 16.0);
    assert_abs_diff_eq!(graph.weight_gradient_scalar(c, 0).unwrap(), 16.0);

    // 更新只作用于本周期跑过反向的节点
    let mut optimizer = crate::nn::optimizer::Optimizer::new(
        crate::nn::optimizer::PlainDescent,
        crate::nn::ScheduleSet::with_alpha(0.1),
    );
    graph.update(&mut optimizer).unwrap();
    assert_abs_diff_eq!(graph.weight_store(a, 0).unwrap().value()[0], 1.0);
    // B 被更新：w = 3 - 0.1*16 = 1.4
    assert_abs_diff_eq!(graph.weight_store(b, 0).unwrap().value()[0], 1.4, epsilon = 1e-12);
}

/// 测试朴素下降端到端：一步更新恰好减去 α·解析梯度
#[test]
fn test_plain_descent_step_matches_gradient() {
    let (mut graph, input, linear, loss) = build_chain();
    run_cycle(&mut graph, input, loss, &[1.0, 2.0], &[0.0, 0.0]);

    let mut optimizer = crate::nn::optimizer::Optimizer::new(
        crate::nn::optimizer::PlainDescent,
        crate::nn::ScheduleSet::with_alpha(0.1),
    );
    graph.update(&mut optimizer).unwrap();
    // w = 2.0 - 0.1*10 = 1.0；b = 0.0 - 0.1*6 = -0.6
    assert_abs_diff_eq!(graph.weight_store(linear, 0).unwrap().value()[0], 1.0);
    assert_abs_diff_eq!(
        graph.weight_store(linear, 1).unwrap().value()[0],
        -0.6,
        epsilon = 1e-12
    );
    assert_eq!(optimizer.t(), 1);
}
