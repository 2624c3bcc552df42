/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 图描述符（Graph Descriptor）
 *                 可序列化的中间表示（IR），节点以原始 id 列表描述拓扑，
 *                 加载时再由 init_links 统一解析（两阶段加载）
 */

use super::error::GraphError;
use serde::{Deserialize, Serialize};

/// 图的可序列化描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDescriptor {
    /// 格式版本（用于向后兼容）
    pub version: String,
    /// 图名称
    pub name: String,
    /// 所有节点描述，按 id 升序且致密
    pub nodes: Vec<NodeDescriptor>,
    /// 参数文件路径（相对于 JSON 文件），仅在保存完整模型时使用
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_file: Option<String>,
}

/// 节点描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// 节点 id
    pub id: u64,
    /// 节点名称
    pub name: String,
    /// 节点类型及其形状参数
    pub kind: NodeKindDescriptor,
    /// 前驱 id 列表（定义拓扑）
    pub predecessors: Vec<u64>,
}

/// 节点类型描述（包含类型特定参数）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKindDescriptor {
    Input { size: usize },
    Linear { in_size: usize, out_size: usize },
    Tanh { size: usize },
    Sum { size: usize },
    MseLoss { size: usize },
}

impl GraphDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: name.to_string(),
            nodes: Vec::new(),
            params_file: None,
        }
    }

    /// 转换为 JSON 字符串
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GraphError::ComputationError(format!("图描述序列化失败: {e}")))
    }

    /// 从 JSON 字符串解析；未注册的节点类型报 TypeNotFound
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("unknown variant") {
                GraphError::TypeNotFound(msg)
            } else {
                GraphError::ComputationError(format!("图描述解析失败: {msg}"))
            }
        })
    }
}
