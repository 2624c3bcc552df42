/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 模型与参数的保存/加载
 *
 * 职责分两层：
 * - 描述符层：GraphDescriptor（JSON），记录节点身份、前驱 id 列表与形状参数
 * - 参数层：纯二进制参数文件（按节点名索引的权重值数组）
 * 加载是显式的两阶段：先按原始 id 列表解码全部节点，再 init_links 统一解析。
 */

use super::descriptor::{GraphDescriptor, NodeDescriptor, NodeKindDescriptor};
use super::engine::GraphEngine;
use super::error::GraphError;
use crate::backend::ExecutionContext;
use crate::nn::nodes::{
    Input, KernelType, Linear, MseLoss, Node, NodeId, Sum, Tanh, TraitKernel,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

impl GraphEngine {
    /// 参数文件魔数
    const PARAMS_MAGIC: &'static [u8; 4] = b"LGPR";
    /// 参数文件版本
    const PARAMS_VERSION: u32 = 1;

    // ========== 描述符 ==========

    pub fn to_descriptor(&self) -> GraphDescriptor {
        let mut desc = GraphDescriptor::new(self.name());
        for node in &self.nodes {
            desc.nodes.push(NodeDescriptor {
                id: node.id().0,
                name: node.name().to_string(),
                kind: node.kernel.descriptor(),
                predecessors: node.predecessors().iter().map(|p| p.0).collect(),
            });
        }
        desc
    }

    /// 两阶段加载的第一阶段：按原始 id 列表建出全部节点，随后 init_links
    pub fn from_descriptor(
        desc: &GraphDescriptor,
        ctx: ExecutionContext,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::with_name(&desc.name, ctx);
        for (i, nd) in desc.nodes.iter().enumerate() {
            if nd.id != i as u64 {
                return Err(GraphError::InvalidOperation(format!(
                    "图描述的节点 id 必须致密且升序：第{}个节点的 id 是{}",
                    i, nd.id
                )));
            }
            graph.check_duplicate_node_name(&nd.name)?;
            let kernel = build_kernel(&nd.kind)?;
            let predecessor_ids = nd.predecessors.iter().map(|&p| NodeId(p)).collect();
            graph.nodes.push(Node::new(
                NodeId(nd.id),
                nd.name.clone(),
                kernel,
                predecessor_ids,
            ));
        }
        graph.init_links()?;
        Ok(graph)
    }

    // ========== 参数二进制 ==========

    /// 保存所有可训练参数（仅 value 数组）到二进制文件
    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> Result<(), GraphError> {
        let file = File::create(path.as_ref())
            .map_err(|e| GraphError::ComputationError(format!("无法创建参数文件: {e}")))?;
        let mut writer = BufWriter::new(file);

        let trainable: Vec<&Node> = self.nodes.iter().filter(|n| n.is_trainable()).collect();

        writer
            .write_all(Self::PARAMS_MAGIC)
            .map_err(|e| GraphError::ComputationError(format!("写入魔数失败: {e}")))?;
        writer
            .write_all(&Self::PARAMS_VERSION.to_le_bytes())
            .map_err(|e| GraphError::ComputationError(format!("写入版本失败: {e}")))?;
        writer
            .write_all(&(trainable.len() as u32).to_le_bytes())
            .map_err(|e| GraphError::ComputationError(format!("写入参数节点数失败: {e}")))?;

        for node in trainable {
            let name_bytes = node.name().as_bytes();
            writer
                .write_all(&(name_bytes.len() as u32).to_le_bytes())
                .map_err(|e| GraphError::ComputationError(format!("写入名称长度失败: {e}")))?;
            writer
                .write_all(name_bytes)
                .map_err(|e| GraphError::ComputationError(format!("写入名称失败: {e}")))?;

            let stores = node.kernel.weight_stores();
            writer
                .write_all(&(stores.len() as u32).to_le_bytes())
                .map_err(|e| GraphError::ComputationError(format!("写入网格数失败: {e}")))?;
            for store in stores {
                writer
                    .write_all(&(store.len() as u32).to_le_bytes())
                    .map_err(|e| GraphError::ComputationError(format!("写入网格长度失败: {e}")))?;
                for &v in store.value() {
                    writer
                        .write_all(&v.to_le_bytes())
                        .map_err(|e| GraphError::ComputationError(format!("写入数据失败: {e}")))?;
                }
            }
        }

        writer
            .flush()
            .map_err(|e| GraphError::ComputationError(format!("刷新缓冲区失败: {e}")))?;
        Ok(())
    }

    /// 从二进制文件加载参数（按节点名匹配；长度不符报 SizeMismatch）
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<(), GraphError> {
        let file = File::open(path.as_ref())
            .map_err(|e| GraphError::ComputationError(format!("无法打开参数文件: {e}")))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        read_exact(&mut reader, &mut magic, "魔数")?;
        if &magic != Self::PARAMS_MAGIC {
            return Err(GraphError::ComputationError(
                "参数文件魔数不匹配".to_string(),
            ));
        }
        let version = read_u32(&mut reader, "版本")?;
        if version != Self::PARAMS_VERSION {
            return Err(GraphError::ComputationError(format!(
                "不支持的参数文件版本: {version}"
            )));
        }

        let node_count = read_u32(&mut reader, "参数节点数")? as usize;
        for _ in 0..node_count {
            let name_len = read_u32(&mut reader, "名称长度")? as usize;
            let mut name_bytes = vec![0u8; name_len];
            read_exact(&mut reader, &mut name_bytes, "名称")?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| GraphError::ComputationError(format!("名称不是合法 UTF-8: {e}")))?;

            let store_count = read_u32(&mut reader, "网格数")? as usize;
            let mut grids = Vec::with_capacity(store_count);
            for _ in 0..store_count {
                let len = read_u32(&mut reader, "网格长度")? as usize;
                let mut grid = vec![0.0f64; len];
                for v in &mut grid {
                    let mut bytes = [0u8; 8];
                    read_exact(&mut reader, &mut bytes, "数据")?;
                    *v = f64::from_le_bytes(bytes);
                }
                grids.push(grid);
            }

            let node = self
                .nodes
                .iter_mut()
                .find(|n| n.name() == name)
                .ok_or_else(|| {
                    GraphError::InvalidOperation(format!("参数文件中的节点{name}在图中不存在"))
                })?;
            let stores = node.kernel.weight_stores_mut();
            if stores.len() != grids.len() {
                return Err(GraphError::InvalidOperation(format!(
                    "节点{name}的权重网格数不匹配：图中{}组，文件{}组",
                    stores.len(),
                    grids.len()
                )));
            }
            for (store, grid) in stores.into_iter().zip(grids.iter()) {
                store.set_value(grid)?;
            }
            node.kernel.mark_params_loaded();
        }
        Ok(())
    }

    // ========== 完整模型 ==========

    /// 保存完整模型：JSON 描述 + 同名 .params 参数文件
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), GraphError> {
        let path = path.as_ref();
        let params_name = params_file_name(path)?;
        let mut desc = self.to_descriptor();
        desc.params_file = Some(params_name.clone());

        let json = desc.to_json()?;
        std::fs::write(path, json)
            .map_err(|e| GraphError::ComputationError(format!("无法写入模型文件: {e}")))?;

        let params_path = path.with_file_name(params_name);
        self.save_params(params_path)
    }

    /// 加载完整模型：解析 JSON、两阶段建图，再按描述加载参数
    pub fn load_model<P: AsRef<Path>>(
        path: P,
        ctx: ExecutionContext,
    ) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| GraphError::ComputationError(format!("无法读取模型文件: {e}")))?;
        let desc = GraphDescriptor::from_json(&json)?;
        let mut graph = Self::from_descriptor(&desc, ctx)?;
        if let Some(params_name) = &desc.params_file {
            graph.load_params(path.with_file_name(params_name))?;
        }
        Ok(graph)
    }
}

fn build_kernel(kind: &NodeKindDescriptor) -> Result<KernelType, GraphError> {
    Ok(match kind {
        NodeKindDescriptor::Input { size } => Input::new(*size)?.into(),
        NodeKindDescriptor::Linear { in_size, out_size } => {
            Linear::new(*in_size, *out_size)?.into()
        }
        NodeKindDescriptor::Tanh { size } => Tanh::new(*size)?.into(),
        NodeKindDescriptor::Sum { size } => Sum::new(*size)?.into(),
        NodeKindDescriptor::MseLoss { size } => MseLoss::new(*size)?.into(),
    })
}

fn params_file_name(path: &Path) -> Result<String, GraphError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GraphError::InvalidOperation("模型文件路径无效".to_string()))?;
    Ok(format!("{stem}.params"))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<(), GraphError> {
    reader
        .read_exact(buf)
        .map_err(|e| GraphError::ComputationError(format!("读取{what}失败: {e}")))
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32, GraphError> {
    let mut bytes = [0u8; 4];
    read_exact(reader, &mut bytes, what)?;
    Ok(u32::from_le_bytes(bytes))
}
