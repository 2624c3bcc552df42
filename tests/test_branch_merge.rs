/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 分叉-汇合图集成测试
 *
 * 覆盖归并节点的两条关键语义：
 * 1. 共享前驱的梯度在任意访问顺序下正确求和（dirty 协议）
 * 2. 梯度检查的槽位记账：叉点前的权重占共享槽位，叉点后的权重只扰动本分支
 */

use approx::assert_abs_diff_eq;
use layer_graph::nn::optimizer::{MomentumDescent, Optimizer};
use layer_graph::nn::{GradientChecker, GraphEngine, NodeId, ScheduleSet};

/// 两分支汇合图：
/// input(2) → A(2→2) → tanh → B(2→2) ┐
///                └───── C(2→2) ─────┴→ sum → mse
fn build_fork_merge() -> (GraphEngine, [NodeId; 7]) {
    let mut graph = GraphEngine::default();
    let input = graph.new_input_node(2, Some("x")).unwrap();
    let a = graph.new_linear_node(input, 2, Some("a")).unwrap();
    let t = graph.new_tanh_node(a, Some("act")).unwrap();
    let b = graph.new_linear_node(t, 2, Some("b")).unwrap();
    let c = graph.new_linear_node(a, 2, Some("c")).unwrap();
    let sum = graph.new_sum_node(&[b, c], Some("merge")).unwrap();
    let loss = graph.new_mse_loss_node(sum, Some("loss")).unwrap();

    // 非对称的手工权重，避免梯度意外抵消
    graph
        .set_weight_values(a, &[&[0.6, -0.4, 0.3, 0.5], &[0.1, -0.2]])
        .unwrap();
    graph
        .set_weight_values(b, &[&[0.7, 0.2, -0.5, 0.4], &[0.05, 0.1]])
        .unwrap();
    graph
        .set_weight_values(c, &[&[-0.3, 0.6, 0.2, -0.7], &[0.0, 0.15]])
        .unwrap();
    (graph, [input, a, t, b, c, sum, loss])
}

/// 汇合图全量梯度检查：解析反向与有限差分逐标量一致
#[test]
fn test_fork_merge_gradient_check() {
    let (mut graph, [input, a, _, b, c, _, loss]) = build_fork_merge();
    graph.update_kernel(2).unwrap();
    graph
        .set_input(input, &[0.5, -0.3, 0.8, 0.2])
        .unwrap();
    graph
        .set_ground_truth(loss, &[0.2, -0.1, -0.3, 0.4])
        .unwrap();

    let checker = GradientChecker::new(1e-5, 1e-3, 1e-9).unwrap();
    let report = checker.check(&mut graph, loss).unwrap();

    // 槽位布局：A 的 6 个标量共享在前，随后分支 0（B）、分支 1（C）各 6 个
    let layout = graph.gc_layout(loss).unwrap();
    assert_eq!(layout.len(), 18);
    assert!(layout[..6].iter().all(|s| s.owner == a));
    assert!(layout[6..12].iter().all(|s| s.owner == b));
    assert!(layout[12..18].iter().all(|s| s.owner == c));

    assert_eq!(report.entries.len(), 18);
    assert!(
        report.passed(),
        "最差相对差: {:?}",
        report.worst()
    );
}

/// 祖先链不相交的汇合：共享槽位为零，检查同样成立
#[test]
fn test_disjoint_merge_gradient_check() {
    let mut graph = GraphEngine::default();
    let x = graph.new_input_node(1, Some("x")).unwrap();
    let lx = graph.new_linear_node(x, 1, Some("lx")).unwrap();
    let y = graph.new_input_node(1, Some("y")).unwrap();
    let ly = graph.new_linear_node(y, 1, Some("ly")).unwrap();
    let sum = graph.new_sum_node(&[lx, ly], Some("merge")).unwrap();
    let loss = graph.new_mse_loss_node(sum, Some("loss")).unwrap();
    graph.set_weight_values(lx, &[&[1.5], &[0.2]]).unwrap();
    graph.set_weight_values(ly, &[&[-0.8], &[0.1]]).unwrap();

    let plan = graph.merge_plan(sum).unwrap();
    assert_eq!(plan.common_ancestor, None);
    assert_eq!(plan.nb_same_elems, 0);

    graph.update_kernel(2).unwrap();
    graph.set_input(x, &[0.7, -0.4]).unwrap();
    graph.set_input(y, &[0.3, 0.9]).unwrap();
    graph.set_ground_truth(loss, &[0.5, -0.2]).unwrap();

    let checker = GradientChecker::new(1e-3, 1e-4, 1e-9).unwrap();
    let report = checker.check(&mut graph, loss).unwrap();
    assert_eq!(report.entries.len(), 4);
    assert!(report.passed(), "最差相对差: {:?}", report.worst());
}

/// 汇合图的 dirty 终态与训练冒烟：动量下降若干步损失下降
#[test]
fn test_fork_merge_training_smoke() {
    let (mut graph, [input, a, t, b, c, sum, loss]) = build_fork_merge();
    let mut optimizer = Optimizer::new(MomentumDescent, ScheduleSet::with_alpha(0.01));

    let x = [0.5, -0.3, 0.8, 0.2];
    let truth = [0.2, -0.1, -0.3, 0.4];

    let mut first_loss = 0.0;
    let mut last_loss = 0.0;
    for step in 0..50 {
        graph.update_kernel(2).unwrap();
        graph.set_input(input, &x).unwrap();
        graph.set_ground_truth(loss, &truth).unwrap();
        graph.forward().unwrap();
        let value = graph.get_loss(loss).unwrap();
        if step == 0 {
            first_loss = value;
        }
        last_loss = value;
        graph.loss_derivative(loss).unwrap();
        graph.backward().unwrap();
        graph.update(&mut optimizer).unwrap();
    }

    println!("汇合图训练：初始损失 {first_loss:.6}，最终损失 {last_loss:.6}");
    assert!(last_loss < first_loss);

    // dirty 终态：只有输入保持 dirty
    assert!(graph.node(input).unwrap().is_dirty());
    for id in [a, t, b, c, sum, loss] {
        assert!(!graph.node(id).unwrap().is_dirty());
    }
}
