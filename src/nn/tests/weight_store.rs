/*
 * @Author       : 老董
 * @Description  : WeightStore 单元测试
 */

use crate::assert_err;
use crate::nn::{GraphError, WeightStore};

/// 测试五个数组等长分配
#[test]
fn test_weight_store_creation() {
    let store = WeightStore::new(4);
    assert_eq!(store.len(), 4);
    assert_eq!(store.value().len(), 4);
    assert_eq!(store.gradient().len(), 4);
    assert_eq!(store.momentum().len(), 4);
    assert_eq!(store.velocity().len(), 4);
    assert_eq!(store.velocity_hat().len(), 4);
    assert!(store.value().iter().all(|&v| v == 0.0));
}

/// 测试 reset：value 逐位保留，其余四个归零
#[test]
fn test_reset_preserves_value_and_zeroes_scratch() {
    let mut store = WeightStore::new(3);
    store.set_value(&[1.5, -2.25, 0.125]).unwrap();
    store.gradient_mut().copy_from_slice(&[0.1, 0.2, 0.3]);
    {
        let views = store.views_mut();
        views.momentum.copy_from_slice(&[1.0, 1.0, 1.0]);
        views.velocity.copy_from_slice(&[2.0, 2.0, 2.0]);
        views.velocity_hat.copy_from_slice(&[3.0, 3.0, 3.0]);
    }

    store.reset();

    // value 逐位不变
    assert_eq!(store.value(), &[1.5, -2.25, 0.125]);
    // 草稿状态归零，长度不变
    assert_eq!(store.gradient(), &[0.0, 0.0, 0.0]);
    assert_eq!(store.momentum(), &[0.0, 0.0, 0.0]);
    assert_eq!(store.velocity(), &[0.0, 0.0, 0.0]);
    assert_eq!(store.velocity_hat(), &[0.0, 0.0, 0.0]);
}

/// 测试长度不匹配的赋值报 SizeMismatch
#[test]
fn test_set_value_size_mismatch() {
    let mut store = WeightStore::new(3);
    let result = store.set_value(&[1.0, 2.0]);
    assert_err!(result, GraphError::SizeMismatch(3, 2));

    let result = store.set_value(&[1.0, 2.0, 3.0, 4.0]);
    assert_err!(result, GraphError::SizeMismatch(3, 4));
}
