/*
 * @Author       : 老董
 * @Date         : 2026-02-10
 * @Description  : 层图执行核心：节点、图引擎、优化器、梯度检查
 */

mod gradient_check;
mod graph;
mod nodes;
pub mod optimizer;
pub mod schedule;
mod weights;

pub use gradient_check::{
    GradientCheckEntry, GradientCheckReport, GradientChecker, relative_difference,
};
pub use graph::{
    GraphDescriptor, GraphEngine, GraphError, MergeEntry, MergePlan, NodeDescriptor,
    NodeKindDescriptor,
};
pub use nodes::{GcScalar, Node, NodeId};
pub use schedule::{Constant, Exponential, Schedule, ScheduleSet, StepDecay, TraitSchedule};
pub use weights::WeightStore;

#[cfg(test)]
mod tests;
