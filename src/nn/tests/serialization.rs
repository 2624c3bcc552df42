/*
 * @Author       : 老董
 * @Description  : 描述符 IR 与模型/参数序列化单元测试
 */

use crate::assert_err;
use crate::backend::ExecutionContext;
use crate::nn::{GraphDescriptor, GraphEngine, GraphError, NodeId, NodeKindDescriptor};
use approx::assert_abs_diff_eq;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("layer_graph_{name}_{}", std::process::id()))
}

/// input(2) → linear(2→2) → tanh → mse
fn build_graph() -> (GraphEngine, [NodeId; 4]) {
    let mut graph = GraphEngine::default();
    let input = graph.new_input_node(2, Some("x")).unwrap();
    let linear = graph.new_linear_node(input, 2, Some("fc")).unwrap();
    let act = graph.new_tanh_node(linear, Some("act")).unwrap();
    let loss = graph.new_mse_loss_node(act, Some("loss")).unwrap();
    graph
        .set_weight_values(linear, &[&[0.5, -0.25, 0.125, 0.75], &[0.1, -0.2]])
        .unwrap();
    (graph, [input, linear, act, loss])
}

fn run_forward(graph: &mut GraphEngine, input: NodeId, loss: NodeId) -> f64 {
    graph.update_kernel(1).unwrap();
    graph.set_input(input, &[0.3, -0.7]).unwrap();
    graph.set_ground_truth(loss, &[0.0, 0.0]).unwrap();
    graph.forward().unwrap();
    graph.get_loss(loss).unwrap()
}

/// 测试描述符 JSON 往返保持拓扑
#[test]
fn test_descriptor_round_trip() {
    let (graph, [_, linear, ..]) = build_graph();
    let desc = graph.to_descriptor();
    let json = desc.to_json().unwrap();
    let parsed = GraphDescriptor::from_json(&json).unwrap();

    assert_eq!(parsed.nodes.len(), 4);
    assert_eq!(parsed.nodes[1].name, "fc");
    assert_eq!(
        parsed.nodes[1].kind,
        NodeKindDescriptor::Linear {
            in_size: 2,
            out_size: 2
        }
    );
    assert_eq!(parsed.nodes[2].predecessors, vec![linear.0]);

    let rebuilt = GraphEngine::from_descriptor(&parsed, ExecutionContext::default()).unwrap();
    assert_eq!(rebuilt.nodes_count(), 4);
    assert_eq!(rebuilt.get_node_parents(NodeId(3)).unwrap(), vec![NodeId(2)]);
}

/// 测试 init_links 幂等：重复调用不改变派生状态
#[test]
fn test_init_links_idempotent() {
    let (mut graph, ids) = build_graph();
    graph.init_links().unwrap();
    let musts_first: Vec<bool> = ids
        .iter()
        .map(|id| graph.node(*id).unwrap().must_compute_backward())
        .collect();
    graph.init_links().unwrap();
    let musts_second: Vec<bool> = ids
        .iter()
        .map(|id| graph.node(*id).unwrap().must_compute_backward())
        .collect();
    assert_eq!(musts_first, musts_second);
    // 输入无前驱、linear 的前驱是输入边界，都不需要回传
    assert_eq!(musts_first, vec![false, false, true, true]);
}

/// 测试未注册的节点类型在解析时报 TypeNotFound
#[test]
fn test_unknown_node_type() {
    let json = r#"{
        "version": "0.1.0",
        "name": "g",
        "nodes": [
            {"id": 0, "name": "x", "kind": {"type": "Conv9000", "size": 1}, "predecessors": []}
        ]
    }"#;
    let result = GraphDescriptor::from_json(json);
    assert_err!(result, GraphError::TypeNotFound { .. });
}

/// 测试描述符的 id 致密性校验
#[test]
fn test_descriptor_requires_dense_ids() {
    let (graph, _) = build_graph();
    let mut desc = graph.to_descriptor();
    desc.nodes[2].id = 7;
    let result = GraphEngine::from_descriptor(&desc, ExecutionContext::default());
    assert_err!(result, GraphError::InvalidOperation { .. });
}

/// 测试参数二进制往返：值逐位一致
#[test]
fn test_params_round_trip() {
    let (graph, _) = build_graph();
    let path = temp_path("params_round_trip.bin");
    graph.save_params(&path).unwrap();

    let desc = graph.to_descriptor();
    let mut rebuilt = GraphEngine::from_descriptor(&desc, ExecutionContext::default()).unwrap();
    rebuilt.load_params(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let original = graph.weight_store(NodeId(1), 0).unwrap();
    let loaded = rebuilt.weight_store(NodeId(1), 0).unwrap();
    assert_eq!(original.value(), loaded.value());
    let loaded_bias = rebuilt.weight_store(NodeId(1), 1).unwrap();
    assert_eq!(loaded_bias.value(), &[0.1, -0.2]);
}

/// 测试参数长度不匹配报 SizeMismatch
#[test]
fn test_load_params_size_mismatch() {
    let (graph, _) = build_graph();
    let path = temp_path("params_size_mismatch.bin");
    graph.save_params(&path).unwrap();

    // 同名节点但形状不同的图
    let mut other = GraphEngine::default();
    let input = other.new_input_node(3, Some("x")).unwrap();
    other.new_linear_node(input, 3, Some("fc")).unwrap();
    let result = other.load_params(&path);
    std::fs::remove_file(&path).ok();
    assert_err!(result, GraphError::SizeMismatch { .. });
}

/// 测试完整模型往返：重建图的前向与原图一致
#[test]
fn test_model_round_trip() {
    let (mut graph, [input, _, _, loss]) = build_graph();
    let loss_before = run_forward(&mut graph, input, loss);

    let path =
        std::env::temp_dir().join(format!("layer_graph_model_{}.json", std::process::id()));
    graph.save_model(&path).unwrap();
    let mut rebuilt = GraphEngine::load_model(&path, ExecutionContext::default()).unwrap();
    std::fs::remove_file(&path).ok();
    std::fs::remove_file(path.with_extension("params")).ok();

    let loss_after = run_forward(&mut rebuilt, input, loss);
    assert_abs_diff_eq!(loss_before, loss_after, epsilon = 1e-15);
}

/// 测试加载后 init_kernel 不会覆盖已装载的权重
#[test]
fn test_init_kernel_preserves_loaded_params() {
    let (mut graph, _) = build_graph();
    graph.init_kernel().unwrap();
    let value = graph.weight_store(NodeId(1), 0).unwrap().value().to_vec();
    assert_eq!(value, vec![0.5, -0.25, 0.125, 0.75]);
}
