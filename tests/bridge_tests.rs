use std::sync::Arc;

use ragbox::array::Array;
use ragbox::bridge::{
    handle_ufunc, ForeignOutput, ForeignResult, ForeignView, UfuncArg, UfuncEngine, UfuncMethod,
};
use ragbox::container::TypeHints;
use ragbox::error::{Error, Result};
use ragbox::value::Value;

fn array(v: Value) -> Array {
    Array::new(&v, TypeHints::none(), None).unwrap()
}

/// A stand-in engine over f64 blocks: "double" multiplies by two, "split"
/// returns (x, 2x) as a tuple. With `out` it writes through the shared
/// block instead of allocating.
struct DoublingEngine;

fn read_f64s(view: &ForeignView) -> Vec<f64> {
    view.with_bytes(|b| {
        b.chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    })
}

fn to_bytes(lanes: &[f64]) -> Vec<u8> {
    lanes.iter().flat_map(|v| v.to_le_bytes()).collect()
}

impl UfuncEngine for DoublingEngine {
    fn apply(
        &self,
        op: &str,
        _method: UfuncMethod,
        inputs: &[ForeignView],
        out: Option<&[ForeignView]>,
    ) -> Result<ForeignOutput> {
        let lanes = read_f64s(&inputs[0]);
        let doubled: Vec<f64> = lanes.iter().map(|&v| v * 2.0).collect();
        let ty = inputs[0].type_str().to_string();

        match (op, out) {
            ("double", Some(outs)) => {
                outs[0].with_bytes_mut(|dst| dst.copy_from_slice(&to_bytes(&doubled)))?;
                Ok(ForeignOutput::Single(ForeignResult {
                    data: Arc::new(Vec::new()),
                    ty: ty.clone(),
                }))
            }
            ("double", None) => Ok(ForeignOutput::Single(ForeignResult {
                data: Arc::new(to_bytes(&doubled)),
                ty,
            })),
            ("split", None) => Ok(ForeignOutput::Tuple(vec![
                ForeignResult {
                    data: Arc::new(to_bytes(&lanes)),
                    ty: ty.clone(),
                },
                ForeignResult {
                    data: Arc::new(to_bytes(&doubled)),
                    ty,
                },
            ])),
            _ => Err(Error::UnsupportedOperation {
                op: "ufunc",
                reason: "unknown op in test engine",
            }),
        }
    }
}

#[test]
fn test_results_wrap_zero_copy() {
    let a = array(Value::from(vec![1.0, 2.0, 3.0]));
    let results = handle_ufunc(
        &DoublingEngine,
        "double",
        UfuncMethod::Call,
        &[a.into()],
        None,
    )
    .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ty().to_string(), "3 * float64");
    assert_eq!(
        results[0].to_value().unwrap(),
        Value::from(vec![2.0, 4.0, 6.0])
    );
}

#[test]
fn test_tuple_results_wrap_independently() {
    let a = array(Value::from(vec![1.0, 2.0]));
    let results = handle_ufunc(
        &DoublingEngine,
        "split",
        UfuncMethod::Call,
        &[a.into()],
        None,
    )
    .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].to_value().unwrap(), Value::from(vec![1.0, 2.0]));
    assert_eq!(results[1].to_value().unwrap(), Value::from(vec![2.0, 4.0]));
    assert!(!results[0].memory_eq(results[1].container()));
}

#[test]
fn test_out_is_returned_unchanged() {
    let a = array(Value::from(vec![1.0, 2.0]));
    let out = array(Value::from(vec![0.0, 0.0]));
    let results = handle_ufunc(
        &DoublingEngine,
        "double",
        UfuncMethod::Call,
        &[a.into()],
        Some(&[out.clone().into()]),
    )
    .unwrap();
    // The engine wrote through the shared block; the returned array is the
    // out operand itself.
    assert!(results[0].memory_eq(out.container()));
    assert_eq!(out.to_value().unwrap(), Value::from(vec![2.0, 4.0]));
}

#[test]
fn test_non_array_inputs_are_rejected() {
    let a = array(Value::from(vec![1.0]));
    let err = handle_ufunc(
        &DoublingEngine,
        "double",
        UfuncMethod::Call,
        &[a.into(), UfuncArg::Value(Value::Int(3))],
        None,
    )
    .unwrap_err();
    match err {
        Error::OperandType { found, .. } => assert_eq!(found, "integer"),
        other => panic!("expected OperandType, got {other:?}"),
    }
}

#[test]
fn test_non_array_outputs_are_rejected() {
    let a = array(Value::from(vec![1.0]));
    let err = handle_ufunc(
        &DoublingEngine,
        "double",
        UfuncMethod::Call,
        &[a.into()],
        Some(&[UfuncArg::Value(Value::from("nope"))]),
    )
    .unwrap_err();
    assert!(matches!(err, Error::OperandType { .. }));
}

#[test]
fn test_empty_inputs_are_rejected() {
    assert!(matches!(
        handle_ufunc(&DoublingEngine, "double", UfuncMethod::Call, &[], None),
        Err(Error::OperandType { .. })
    ));
}
